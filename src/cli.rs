//! Command-line interface definitions.
//!
//! Flags mirror the configuration schema; anything given on the command line
//! overrides the config file and environment.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Records whatever an MPRIS media player is playing, track by track.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Watch a player on the session bus and record each track it plays
    Record(RecordArgs),
}

#[derive(Args)]
pub struct RecordArgs {
    /// Player to watch, as the suffix of its well-known bus name
    /// (e.g. "spotify" for org.mpris.MediaPlayer2.spotify)
    #[arg(short, long)]
    pub application: String,

    /// Capture source handed to ffmpeg via -i
    #[arg(short, long)]
    pub sink: Option<String>,

    /// Extra ffmpeg arguments inserted before -i, whitespace-separated
    #[arg(short = 'i', long)]
    pub ffmpeg_input_options: Option<String>,

    /// Root directory recordings are written under
    #[arg(short, long)]
    pub target_dir: Option<PathBuf>,

    /// File extension for recordings
    #[arg(short = 'e', long)]
    pub target_extension: Option<String>,

    /// Treat a non-empty title as "playing" instead of trusting the
    /// player's PlaybackStatus property
    #[arg(long)]
    pub ignore_playback_status: bool,

    /// Encoder binary to launch
    #[arg(short, long)]
    pub ffmpeg_bin: Option<String>,

    /// Extra ffmpeg arguments inserted before the output path,
    /// whitespace-separated
    #[arg(short = 'o', long)]
    pub ffmpeg_options: Option<String>,

    /// Stop the encoder when an advertisement starts instead of recording
    /// through it
    #[arg(long)]
    pub stop_on_ad: bool,
}
