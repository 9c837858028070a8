//! The real encoder child: ffmpeg spawned with inherited output streams,
//! stopped with SIGTERM and escalated to SIGKILL.

use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

use super::{EncoderProcess, Spawn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct FfmpegSpawner;

impl Spawn for FfmpegSpawner {
    type Process = FfmpegProcess;

    fn spawn(&self, program: &str, args: &[String]) -> io::Result<FfmpegProcess> {
        // stdout/stderr stay inherited so encoder output lands on our
        // terminal; stdin is closed so ffmpeg cannot block on console input.
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .inspect_err(|err| warn!(program, %err, "failed to start encoder"))?;
        info!(program, args = %args.join(" "), "started encoder");
        Ok(FfmpegProcess { child })
    }
}

pub struct FfmpegProcess {
    child: Child,
}

impl EncoderProcess for FfmpegProcess {
    fn terminate(&mut self) {
        let pid = Pid::from_raw(self.child.id() as i32);
        if let Err(err) = signal::kill(pid, Signal::SIGTERM) {
            warn!(%err, "failed to send SIGTERM to encoder");
        }
    }

    fn kill(&mut self) {
        if let Err(err) = self.child.kill() {
            warn!(%err, "failed to kill encoder");
        }
    }

    fn wait_exited(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    info!(code = ?status.code(), "encoder exited");
                    return true;
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "failed to poll encoder state"),
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}
