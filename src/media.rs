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


//! Media kinds, known container formats and platform tags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const VIDEO_FORMATS: &[&str] = &["mp4", "webm", "avi", "mov", "mkv", "3gp"];
pub const AUDIO_FORMATS: &[&str] = &["mp3", "aac", "m4a", "wav", "ogg"];

/// Kind of media a transfer carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Classify a file extension; anything that is not a known audio format is video
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if AUDIO_FORMATS.contains(&ext.as_str()) {
            MediaKind::Audio
        } else {
            MediaKind::Video
        }
    }

    /// Classify by the extension of the URL path
    pub fn from_url(url: &str) -> Self {
        extension_from_url(url)
            .map(|ext| Self::from_extension(&ext))
            .unwrap_or(MediaKind::Video)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            other => Err(format!("Invalid media kind: {}", other)),
        }
    }
}

/// Extension of the last path segment of a URL, lowercased
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?.to_string();
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// File stem of the last path segment of a URL
pub fn stem_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?.to_string();
    let stem = segment
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| segment.clone());
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Short platform tag for the host a link points at
///
/// Known social platforms map to a fixed tag, anything else to the
/// registrable-looking part of the host (`cdn.example.com` -> `example`).
pub fn platform_tag_from_url(url: &str) -> String {
    let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) {
        Some(host) => host,
        None => return "web".to_string(),
    };

    const KNOWN: &[(&str, &str)] = &[
        ("youtube.com", "youtube"),
        ("youtu.be", "youtube"),
        ("tiktok.com", "tiktok"),
        ("instagram.com", "instagram"),
        ("cdninstagram.com", "instagram"),
        ("facebook.com", "facebook"),
        ("fb.watch", "facebook"),
        ("fbcdn.net", "facebook"),
        ("twitter.com", "x"),
        ("x.com", "x"),
        ("twimg.com", "x"),
    ];

    for (domain, tag) in KNOWN {
        if host == *domain || host.ends_with(&format!(".{}", domain)) {
            return tag.to_string();
        }
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2].to_string()
    } else {
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_url() {
        assert_eq!(MediaKind::from_url("https://cdn.example/track.MP3"), MediaKind::Audio);
        assert_eq!(MediaKind::from_url("https://cdn.example/video1.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_url("https://cdn.example/stream"), MediaKind::Video);
        assert_eq!(MediaKind::from_url("not a url"), MediaKind::Video);
    }

    #[test]
    fn test_extension_and_stem() {
        let url = "https://cdn.example/media/clip.final.webm?sig=abc";
        assert_eq!(extension_from_url(url).as_deref(), Some("webm"));
        assert_eq!(stem_from_url(url).as_deref(), Some("clip.final"));
        assert_eq!(extension_from_url("https://cdn.example/"), None);
    }

    #[test]
    fn test_platform_tag() {
        assert_eq!(platform_tag_from_url("https://www.tiktok.com/@a/video/1"), "tiktok");
        assert_eq!(platform_tag_from_url("https://youtu.be/xyz"), "youtube");
        assert_eq!(platform_tag_from_url("https://x.com/a/status/1"), "x");
        assert_eq!(platform_tag_from_url("https://cdn.example.com/v.mp4"), "example");
        assert_eq!(platform_tag_from_url("garbage"), "web");
    }
}
