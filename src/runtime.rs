//! Wires the pieces together: settings, bus connection, watcher, recorder
//! and the dispatch loop.

use std::sync::mpsc;

use tracing::info;
use zbus::blocking::Connection;

use crate::cli::RecordArgs;
use crate::config;
use crate::mpris::{self, MprisPlayer};
use crate::recorder::{FfmpegSpawner, Recorder};
use crate::watcher::PlayerWatcher;

mod event_loop;

pub fn run(args: RecordArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = load_settings();
    apply_cli_overrides(&mut settings, &args);

    info!(
        service = %mpris::service_name(&args.application),
        target_dir = %settings.recorder.target_dir.display(),
        "watching player"
    );

    let connection = Connection::session()?;
    let player = MprisPlayer::connect(&connection, &args.application)?;

    let (tx, rx) = mpsc::channel();
    mpris::spawn_signal_forwarder(&connection, &args.application, tx)?;

    let mut watcher = PlayerWatcher::new(
        player,
        settings.player.ignore_playback_status,
        settings.player.ad_marker.clone(),
    );
    let mut recorder = Recorder::new(FfmpegSpawner, settings.recorder);

    event_loop::run(&mut watcher, &mut recorder, &rx)?;
    Ok(())
}

fn load_settings() -> config::Settings {
    match config::Settings::load() {
        Ok(s) => {
            if let Err(msg) = s.validate() {
                eprintln!("tapedeck: invalid config, using defaults: {msg}");
                config::Settings::default()
            } else {
                s
            }
        }
        Err(e) => {
            // Config is optional; failures should not prevent the app from starting.
            eprintln!("tapedeck: failed to load config, using defaults: {e}");
            config::Settings::default()
        }
    }
}

/// Command-line flags win over everything loaded from file or environment.
fn apply_cli_overrides(settings: &mut config::Settings, args: &RecordArgs) {
    if let Some(sink) = &args.sink {
        settings.recorder.sink = sink.clone();
    }
    if let Some(options) = &args.ffmpeg_input_options {
        settings.recorder.input_options =
            options.split_whitespace().map(str::to_string).collect();
    }
    if let Some(options) = &args.ffmpeg_options {
        settings.recorder.options = options.split_whitespace().map(str::to_string).collect();
    }
    if let Some(dir) = &args.target_dir {
        settings.recorder.target_dir = dir.clone();
    }
    if let Some(extension) = &args.target_extension {
        settings.recorder.extension = extension.clone();
    }
    if let Some(bin) = &args.ffmpeg_bin {
        settings.recorder.ffmpeg_bin = bin.clone();
    }
    if args.stop_on_ad {
        settings.recorder.stop_on_ad = true;
    }
    if args.ignore_playback_status {
        settings.player.ignore_playback_status = true;
    }
}
