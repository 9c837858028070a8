//! Per-album override file, read from the destination directory on every
//! track change.
//!
//! The file is plain INI. `[length]` maps track numbers to explicit encode
//! durations (useful to cut trailing advertisements), `[general]` may set
//! `year`, `genre`, `total_tracks` and `total_disks`. Everything about this
//! file is best-effort: unknown keys and parse failures produce warnings and
//! the recording proceeds with player-reported metadata.

use std::collections::HashMap;
use std::path::Path;

use config::{Config, File, FileFormat};
use tracing::warn;

/// Manual corrections that take precedence over player-reported metadata.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TrackOverrides {
    pub length: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    pub total_tracks: Option<String>,
    pub total_disks: Option<String>,
}

pub fn load(dir: &Path, file_name: &str, track_number: u32) -> TrackOverrides {
    let mut overrides = TrackOverrides::default();
    let path = dir.join(file_name);
    if !path.exists() {
        return overrides;
    }

    let parsed = Config::builder()
        .add_source(File::from(path.as_path()).format(FileFormat::Ini))
        .build()
        .and_then(|cfg| cfg.try_deserialize::<HashMap<String, HashMap<String, String>>>());
    let sections = match parsed {
        Ok(sections) => sections,
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot read override file, proceeding without overrides");
            return overrides;
        }
    };

    for (section, entries) in &sections {
        match section.as_str() {
            "length" => {
                // Length entries are keyed by track number, so they can only
                // apply when the player reported one.
                for (key, value) in entries {
                    match key.parse::<u32>() {
                        Ok(number) if track_number != 0 && number == track_number => {
                            overrides.length = Some(value.clone());
                        }
                        Ok(_) => {}
                        Err(_) => {
                            warn!(key = %key, "ignoring non-numeric key in [length] section");
                        }
                    }
                }
            }
            "general" => {
                for (key, value) in entries {
                    match key.as_str() {
                        "year" => overrides.year = Some(value.clone()),
                        "genre" => overrides.genre = Some(value.clone()),
                        "total_tracks" => overrides.total_tracks = Some(value.clone()),
                        "total_disks" => overrides.total_disks = Some(value.clone()),
                        other => {
                            warn!(key = %other, "ignoring unknown property in [general] section");
                        }
                    }
                }
            }
            other => warn!(section = %other, "ignoring unknown section in override file"),
        }
    }
    overrides
}
