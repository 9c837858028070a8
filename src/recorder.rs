//! Turns track boundaries into exactly one encoder process per track.
//!
//! The recorder owns the single encoder slot. On every `TrackChanged` it
//! silences the watcher, pauses the player, stops the in-flight encoder,
//! computes the destination path and metadata arguments for the new track
//! and starts a fresh encoder before resuming playback. A stop that outlives
//! both the terminate and the kill timeout is fatal: two encoders writing
//! the same sink is a correctness violation, so the caller must take the
//! whole process down rather than continue.

mod overrides;
mod paths;
mod process;

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::RecorderSettings;
use crate::watcher::{PlayerBus, PlayerWatcher};

pub use process::FfmpegSpawner;

/// Handle to one running encoder child.
pub trait EncoderProcess {
    /// Ask the process to exit gracefully.
    fn terminate(&mut self);
    /// Forcibly end the process.
    fn kill(&mut self);
    /// Block until the process has exited or the timeout elapsed; true when
    /// it exited.
    fn wait_exited(&mut self, timeout: Duration) -> bool;
    fn running(&mut self) -> bool;
}

/// Spawns encoder children. Split out as a trait so tests can substitute a
/// scripted process for the real ffmpeg child.
pub trait Spawn {
    type Process: EncoderProcess;

    fn spawn(&self, program: &str, args: &[String]) -> io::Result<Self::Process>;
}

/// The encoder survived both terminate and kill. Continuing would risk two
/// encoders writing the same sink, so the caller must exit the program.
#[derive(Debug, Error)]
#[error("encoder process survived terminate and kill; refusing to risk a second writer")]
pub struct FatalEncoderError;

/// One encoder invocation, scoped to exactly one track.
struct RecordingJob<P> {
    process: P,
    target: PathBuf,
    started_at: Instant,
}

pub struct Recorder<S: Spawn> {
    spawner: S,
    settings: RecorderSettings,
    job: Option<RecordingJob<S::Process>>,
}

impl<S: Spawn> Recorder<S> {
    pub fn new(spawner: S, mut settings: RecorderSettings) -> Self {
        if !settings.extension.starts_with('.') {
            settings.extension.insert(0, '.');
        }
        Self {
            spawner,
            settings,
            job: None,
        }
    }

    /// Replace the running encoder with one recording the watcher's current
    /// track. Recoverable failures (directory creation, spawn) abandon this
    /// track and leave the recorder ready for the next boundary; only an
    /// unstoppable previous encoder is fatal.
    pub fn on_track_changed<B: PlayerBus>(
        &mut self,
        watcher: &mut PlayerWatcher<B>,
    ) -> Result<(), FatalEncoderError> {
        if watcher.is_ad() {
            if self.settings.stop_on_ad {
                info!("ad started, stopping encoder");
                return self.stop_job();
            }
            info!("ad playing, leaving encoder untouched");
            return Ok(());
        }

        // Hold the player still while the encoder is swapped out, and keep
        // the watcher from re-triggering on our own pause/resume calls.
        watcher.set_silent(true);
        if watcher.is_playing() {
            watcher.pause();
        }
        let result = self.stop_job().and_then(|()| {
            if let Err(err) = self.start_job(watcher) {
                error!(%err, "skipping this track");
            }
            Ok(())
        });
        watcher.play();
        watcher.set_silent(false);
        result
    }

    /// Playback stopped: stop the encoder, do not start a new one.
    pub fn on_playback_stopped(&mut self) -> Result<(), FatalEncoderError> {
        self.stop_job()
    }

    fn start_job<B: PlayerBus>(&mut self, watcher: &PlayerWatcher<B>) -> Result<(), StartError> {
        let target_dir = self
            .settings
            .target_dir
            .join(paths::category(watcher.artist()))
            .join(paths::category(watcher.album()));
        std::fs::create_dir_all(&target_dir).map_err(|source| StartError::CreateDir {
            path: target_dir.clone(),
            source,
        })?;

        // Re-read per track: an operator may edit the file between tracks.
        let overrides =
            overrides::load(&target_dir, &self.settings.override_file, watcher.track_number());

        let stem = format!(
            "{}{}",
            paths::track_prefix(watcher.track_number(), watcher.disk_number()),
            if watcher.title().is_empty() {
                "unknown track".to_string()
            } else {
                paths::valid_file_name(watcher.title())
            }
        );
        let target = paths::unique_target(&target_dir, &stem, &self.settings.extension);
        let args = self.encoder_args(watcher, &overrides, &target);

        match self.spawner.spawn(&self.settings.ffmpeg_bin, &args) {
            Ok(process) => {
                self.job = Some(RecordingJob {
                    process,
                    target,
                    started_at: Instant::now(),
                });
                Ok(())
            }
            Err(source) => Err(StartError::Spawn {
                program: self.settings.ffmpeg_bin.clone(),
                source,
            }),
        }
    }

    /// Argument order matters to ffmpeg: input selection, then duration,
    /// then general options and metadata, output path last.
    fn encoder_args<B: PlayerBus>(
        &self,
        watcher: &PlayerWatcher<B>,
        overrides: &overrides::TrackOverrides,
        target: &Path,
    ) -> Vec<String> {
        let mut args = vec!["-f".to_string(), self.settings.input_format.clone()];
        args.extend(self.settings.input_options.iter().cloned());
        args.push("-i".to_string());
        args.push(self.settings.sink.clone());

        let length = overrides.length.clone().or_else(|| {
            let length = watcher.length();
            (!length.is_zero()).then(|| length.as_secs().to_string())
        });
        if let Some(length) = length {
            args.push("-t".to_string());
            args.push(length);
        }

        args.extend(self.settings.options.iter().cloned());

        add_metadata(&mut args, "title", watcher.title());
        add_metadata(&mut args, "album", watcher.album());
        add_metadata(&mut args, "artist", watcher.artist());
        add_metadata(
            &mut args,
            "genre",
            overrides.genre.as_deref().unwrap_or(watcher.genre()),
        );
        add_metadata(
            &mut args,
            "year",
            overrides.year.as_deref().unwrap_or(watcher.year()),
        );
        if watcher.track_number() != 0 {
            let track = match &overrides.total_tracks {
                Some(total) => format!("{}/{total}", watcher.track_number()),
                None => watcher.track_number().to_string(),
            };
            add_metadata(&mut args, "track", &track);
        }
        if watcher.disk_number() != 0 {
            let disk = match &overrides.total_disks {
                Some(total) => format!("{}/{total}", watcher.disk_number()),
                None => watcher.disk_number().to_string(),
            };
            add_metadata(&mut args, "disk", &disk);
        }

        args.push(target.to_string_lossy().into_owned());
        args
    }

    /// Stop the current encoder: terminate, bounded wait, escalate to kill,
    /// bounded wait, fatal. Returns immediately when no job is running.
    pub fn stop_job(&mut self) -> Result<(), FatalEncoderError> {
        let Some(mut job) = self.job.take() else {
            return Ok(());
        };
        if !job.process.running() {
            return Ok(());
        }

        info!(
            target = %job.target.display(),
            elapsed = ?job.started_at.elapsed(),
            "stopping encoder"
        );
        job.process.terminate();
        if job
            .process
            .wait_exited(Duration::from_millis(self.settings.terminate_timeout_ms))
        {
            return Ok(());
        }

        warn!("encoder ignored terminate, killing it");
        job.process.kill();
        if job
            .process
            .wait_exited(Duration::from_millis(self.settings.kill_timeout_ms))
        {
            return Ok(());
        }

        Err(FatalEncoderError)
    }
}

fn add_metadata(args: &mut Vec<String>, field: &str, value: &str) {
    if !value.is_empty() {
        args.push("-metadata".to_string());
        args.push(format!("{field}={value}"));
    }
}

#[derive(Debug, Error)]
enum StartError {
    #[error("cannot create target directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: io::Error,
    },
}

#[cfg(test)]
mod tests;
