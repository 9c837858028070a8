use std::path::PathBuf;

use serde::Deserialize;

/// Top-level application settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/tapedeck/config.toml` or `~/.config/tapedeck/config.toml`
///
/// Precedence (highest wins):
/// 1) Command-line arguments
/// 2) Environment variables (prefix `TAPEDECK__`, `__` as nested separator)
/// 3) Config file (if present)
/// 4) Struct defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub recorder: RecorderSettings,
    pub player: PlayerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recorder: RecorderSettings::default(),
            player: PlayerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Encoder binary to launch for each track.
    pub ffmpeg_bin: String,
    /// Capture source passed to the encoder via `-i`, e.g. a PulseAudio
    /// monitor device.
    pub sink: String,
    /// Input container/device format passed via `-f`.
    pub input_format: String,
    /// Extra arguments inserted before `-i`.
    pub input_options: Vec<String>,
    /// Extra arguments inserted before the metadata and output path, such as
    /// codec and bitrate selection.
    pub options: Vec<String>,
    /// Root directory recordings are written under, as
    /// `<target_dir>/<artist>/<album>/<track>`.
    pub target_dir: PathBuf,
    /// File extension for recordings, with or without the leading dot.
    pub extension: String,
    /// How long a stopping encoder may take to exit after SIGTERM before it
    /// is killed (milliseconds).
    pub terminate_timeout_ms: u64,
    /// How long a killed encoder may take to exit before the program gives
    /// up and aborts (milliseconds).
    pub kill_timeout_ms: u64,
    /// Whether an advertisement stops the running encoder. When false, ads
    /// are recorded into the current track's file.
    pub stop_on_ad: bool,
    /// Name of the per-album override file looked up in the destination
    /// directory.
    pub override_file: String,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            sink: "default".to_string(),
            input_format: "pulse".to_string(),
            input_options: Vec::new(),
            options: Vec::new(),
            target_dir: PathBuf::from("."),
            extension: ".m4a".to_string(),
            terminate_timeout_ms: 10_000,
            kill_timeout_ms: 5_000,
            stop_on_ad: false,
            override_file: "info.ini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Derive the playing flag from a non-empty title instead of the
    /// player's `PlaybackStatus` property. For players that report the
    /// property unreliably.
    pub ignore_playback_status: bool,
    /// Substring of `mpris:trackid` that marks a track as an advertisement.
    /// Empty disables ad detection.
    pub ad_marker: String,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            ignore_playback_status: false,
            ad_marker: "spotify:ad".to_string(),
        }
    }
}
