// Fetchline - Media Transfer Core
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Filename generation for saved media
//!
//! # Naming
//! `{title}_{platform}_{quality}.{extension}` where the title is reduced to
//! `[A-Za-z0-9\s\-_]`, whitespace runs become a single `_`, and the result is
//! cut to 50 characters. Platform and quality labels are trimmed and their
//! words joined with `_`.
//!
//! # Saving
//! - Keep generated names inside the output directory
//! - Avoid filename collisions (append ` (1)`, ` (2)`, ...)

use std::path::{Path, PathBuf};

/// Maximum number of characters kept from the title
pub const MAX_TITLE_CHARS: usize = 50;

/// Title used when nothing survives sanitization
const FALLBACK_TITLE: &str = "download";

/// Reduce a free-text title to filesystem-safe characters
///
/// Drops everything outside `[A-Za-z0-9\s\-_]`, collapses whitespace runs
/// into `_` and truncates to [`MAX_TITLE_CHARS`].
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();

    let mut result = String::with_capacity(kept.len());
    let mut in_whitespace = false;
    for c in kept.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                result.push('_');
            }
            in_whitespace = true;
        } else {
            result.push(c);
            in_whitespace = false;
        }
    }

    result.chars().take(MAX_TITLE_CHARS).collect()
}

/// Trim a platform or quality label and join its words with `_`
pub fn sanitize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Build the suggested filename for a transfer
pub fn safe_filename(title: &str, platform: &str, quality: &str, extension: &str) -> String {
    let mut clean_title = sanitize_title(title);
    if clean_title.is_empty() {
        clean_title = FALLBACK_TITLE.to_string();
    }

    format!(
        "{}_{}_{}.{}",
        clean_title,
        sanitize_label(platform),
        sanitize_label(quality),
        extension.trim().trim_start_matches('.')
    )
}

/// Make a suggested filename safe to join onto a directory
///
/// Path separators and parent references are replaced so the result is
/// always a single component.
pub fn confine_to_directory(filename: &str) -> String {
    let replaced: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_start_matches('.').to_string();
    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed
    }
}

/// Highest ` (n)` suffix tried before giving up on a name
pub const MAX_COLLISION_SUFFIX: u32 = 9999;

/// Candidate paths for a save: `path` itself, then ` (1)`, ` (2)`, etc.
///
/// Callers claim a candidate with `create_new` and move on when it exists.
pub fn collision_candidates(path: &Path) -> impl Iterator<Item = PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(FALLBACK_TITLE)
        .to_string();
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();
    let first = path.to_path_buf();

    std::iter::once(first).chain((1..=MAX_COLLISION_SUFFIX).map(move |counter| {
        let new_name = if extension.is_empty() {
            format!("{} ({})", stem, counter)
        } else {
            format!("{} ({}).{}", stem, counter, extension)
        };
        parent.join(new_name)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename() {
        assert_eq!(
            safe_filename("Amazing Video! #1", "tiktok", "HD", "mp4"),
            "Amazing_Video_1_tiktok_HD.mp4"
        );
    }

    #[test]
    fn test_labels_are_underscore_joined() {
        assert_eq!(
            safe_filename("clip", " tiktok ", "No  Watermark", "mp4"),
            "clip_tiktok_No_Watermark.mp4"
        );
        assert_eq!(sanitize_label("HD 720p"), "HD_720p");
    }

    #[test]
    fn test_sanitize_title_collapses_whitespace() {
        assert_eq!(sanitize_title("a  \t b - c_d"), "a_b_-_c_d");
        assert_eq!(sanitize_title("日本語 title"), "_title");
    }

    #[test]
    fn test_sanitize_title_truncates() {
        let long = "x".repeat(80);
        assert_eq!(sanitize_title(&long).len(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_empty_title_falls_back() {
        assert_eq!(safe_filename("!!!", "x", "720p", ".webm"), "download_x_720p.webm");
    }

    #[test]
    fn test_confine_to_directory() {
        assert_eq!(confine_to_directory("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(confine_to_directory("clip.mp4"), "clip.mp4");
        assert_eq!(confine_to_directory(".."), "download");
    }

    #[test]
    fn test_collision_candidates() {
        let dir = Path::new("/tmp/out");
        let names: Vec<PathBuf> = collision_candidates(&dir.join("clip.mp4")).take(3).collect();
        assert_eq!(
            names,
            vec![dir.join("clip.mp4"), dir.join("clip (1).mp4"), dir.join("clip (2).mp4")]
        );

        let bare = collision_candidates(&dir.join("notes")).nth(1).unwrap();
        assert_eq!(bare, dir.join("notes (1)"));
        assert_eq!(
            collision_candidates(&dir.join("clip.mp4")).count(),
            MAX_COLLISION_SUFFIX as usize + 1
        );
    }
}
