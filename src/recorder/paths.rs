//! Destination-path helpers: tag sanitization, track prefixes and
//! collision-free target names.

use std::path::{Path, PathBuf};

/// Makes a tag value safe to use as a path component. Path separators and
/// `": "` / `":"` become dashes, other filesystem-hostile characters are
/// dropped.
pub fn valid_file_name(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' | '/' => out.push_str(" - "),
            '\n' | '\r' | '\x0c' | '<' | '>' | '?' | '*' | '!' | '|' => {}
            ':' => {
                if chars.peek() == Some(&' ') {
                    chars.next();
                    out.push_str(" - ");
                } else {
                    out.push('-');
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Directory name for an artist or album tag; empty tags land in "misc".
pub fn category(text: &str) -> String {
    if text.is_empty() {
        "misc".to_string()
    } else {
        valid_file_name(text)
    }
}

/// `"NN - "`, `"D-NN - "` when a disk number is present, empty without a
/// track number.
pub fn track_prefix(track_number: u32, disk_number: u32) -> String {
    if track_number == 0 {
        String::new()
    } else if disk_number != 0 {
        format!("{disk_number}-{track_number:02} - ")
    } else {
        format!("{track_number:02} - ")
    }
}

/// First free path `<stem><ext>`, `<stem> (2)<ext>`, `<stem> (3)<ext>`, ...
/// Existing recordings are never overwritten.
pub fn unique_target(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}{extension}"));
    let mut count = 1u32;
    while candidate.exists() {
        count += 1;
        candidate = dir.join(format!("{stem} ({count}){extension}"));
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn valid_file_name_maps_separators_and_colons() {
        assert_eq!(valid_file_name("AC/DC"), "AC - DC");
        assert_eq!(valid_file_name("a\\b"), "a - b");
        assert_eq!(valid_file_name("Live: Berlin"), "Live - Berlin");
        assert_eq!(valid_file_name("12:34"), "12-34");
    }

    #[test]
    fn valid_file_name_strips_hostile_characters() {
        assert_eq!(valid_file_name("a<b>c?d*e!f|g"), "abcdefg");
        assert_eq!(valid_file_name("line\nbreak\rform\x0cfeed"), "linebreakformfeed");
        assert_eq!(valid_file_name("plain title"), "plain title");
    }

    #[test]
    fn category_falls_back_to_misc() {
        assert_eq!(category(""), "misc");
        assert_eq!(category("Artist A"), "Artist A");
    }

    #[test]
    fn track_prefix_pads_and_includes_disk() {
        assert_eq!(track_prefix(0, 0), "");
        assert_eq!(track_prefix(0, 2), "");
        assert_eq!(track_prefix(3, 0), "03 - ");
        assert_eq!(track_prefix(12, 0), "12 - ");
        assert_eq!(track_prefix(3, 2), "2-03 - ");
    }

    #[test]
    fn unique_target_counts_past_existing_files() {
        let dir = tempdir().unwrap();
        assert_eq!(
            unique_target(dir.path(), "track", ".m4a"),
            dir.path().join("track.m4a")
        );

        fs::write(dir.path().join("track.m4a"), b"x").unwrap();
        assert_eq!(
            unique_target(dir.path(), "track", ".m4a"),
            dir.path().join("track (2).m4a")
        );

        fs::write(dir.path().join("track (2).m4a"), b"x").unwrap();
        fs::write(dir.path().join("track (3).m4a"), b"x").unwrap();
        assert_eq!(
            unique_target(dir.path(), "track", ".m4a"),
            dir.path().join("track (4).m4a")
        );
    }
}
