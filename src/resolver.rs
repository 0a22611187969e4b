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


//! Link resolution
//!
//! Turning a social-media page link into direct media URLs is done by an
//! external service. The engine only sees the [`MediaResolver`] contract:
//! a page URL goes in, quality variants plus descriptive metadata come out.
//!
//! [`DirectUrlResolver`] is the trivial resolver for links that already point
//! at a media file.

use crate::error::ResolveError;
use crate::media::{extension_from_url, platform_tag_from_url, stem_from_url, MediaKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// One downloadable rendition of a resolved link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaVariant {
    pub url: String,
    pub media_kind: MediaKind,
    pub quality_label: String,
    pub file_extension: String,
    pub byte_size: Option<u64>,
}

/// Descriptive metadata for a resolved link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,
    pub author: Option<String>,
    pub duration_seconds: Option<u64>,
    pub thumbnail_url: Option<String>,
    /// Short platform name used in filenames ("tiktok", "youtube")
    pub platform_tag: String,
}

/// Resolver answer for one page URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved {
    pub variants: Vec<MediaVariant>,
    pub metadata: MediaMetadata,
}

/// External link resolver
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, page_url: &str) -> Result<Resolved, ResolveError>;
}

/// Which variant of a resolved link to transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantSelector {
    /// Case-insensitive substring of the quality label
    pub quality: Option<String>,
    pub kind: Option<MediaKind>,
}

impl VariantSelector {
    /// Pick a variant
    ///
    /// With no quality given, prefers a video variant labelled HD or
    /// "no watermark" (or plain mp4), then the first variant of the
    /// requested kind.
    pub fn select<'a>(&self, variants: &'a [MediaVariant]) -> Option<&'a MediaVariant> {
        let mut candidates = variants
            .iter()
            .filter(|v| self.kind.map_or(true, |k| v.media_kind == k));

        match &self.quality {
            Some(quality) => {
                let wanted = quality.to_lowercase();
                candidates.find(|v| v.quality_label.to_lowercase().contains(&wanted))
            }
            None => {
                let candidates: Vec<&MediaVariant> = candidates.collect();
                candidates
                    .iter()
                    .find(|v| {
                        let label = v.quality_label.to_lowercase();
                        v.media_kind == MediaKind::Video
                            && (label.contains("no watermark")
                                || label.contains("hd")
                                || v.file_extension == "mp4")
                    })
                    .or_else(|| candidates.first())
                    .copied()
            }
        }
    }
}

/// Resolver for links that already point at a media file
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectUrlResolver;

#[async_trait]
impl MediaResolver for DirectUrlResolver {
    async fn resolve(&self, page_url: &str) -> Result<Resolved, ResolveError> {
        let parsed = Url::parse(page_url)
            .map_err(|e| ResolveError::UnsupportedLink(format!("{}: {}", page_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ResolveError::UnsupportedLink(page_url.to_string()));
        }

        let media_kind = MediaKind::from_url(page_url);
        let file_extension = extension_from_url(page_url).unwrap_or_else(|| match media_kind {
            MediaKind::Video => "mp4".to_string(),
            MediaKind::Audio => "mp3".to_string(),
        });

        Ok(Resolved {
            variants: vec![MediaVariant {
                url: page_url.to_string(),
                media_kind,
                quality_label: "original".to_string(),
                file_extension,
                byte_size: None,
            }],
            metadata: MediaMetadata {
                title: stem_from_url(page_url).unwrap_or_else(|| "download".to_string()),
                platform_tag: platform_tag_from_url(page_url),
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(url: &str, kind: MediaKind, quality: &str, ext: &str) -> MediaVariant {
        MediaVariant {
            url: url.to_string(),
            media_kind: kind,
            quality_label: quality.to_string(),
            file_extension: ext.to_string(),
            byte_size: None,
        }
    }

    fn sample() -> Vec<MediaVariant> {
        vec![
            variant("https://cdn.example/a.mp3", MediaKind::Audio, "128kbps", "mp3"),
            variant("https://cdn.example/sd.webm", MediaKind::Video, "SD", "webm"),
            variant("https://cdn.example/hd.webm", MediaKind::Video, "No Watermark HD", "webm"),
        ]
    }

    #[test]
    fn test_select_prefers_hd_video() {
        let variants = sample();
        let chosen = VariantSelector::default().select(&variants).unwrap();
        assert_eq!(chosen.url, "https://cdn.example/hd.webm");
    }

    #[test]
    fn test_select_by_quality_and_kind() {
        let variants = sample();

        let sd = VariantSelector {
            quality: Some("sd".into()),
            kind: None,
        };
        assert_eq!(sd.select(&variants).unwrap().quality_label, "SD");

        let audio = VariantSelector {
            quality: None,
            kind: Some(MediaKind::Audio),
        };
        assert_eq!(audio.select(&variants).unwrap().file_extension, "mp3");

        let missing = VariantSelector {
            quality: Some("4k".into()),
            kind: None,
        };
        assert!(missing.select(&variants).is_none());
    }

    #[tokio::test]
    async fn test_direct_resolver() {
        let resolved = DirectUrlResolver
            .resolve("https://www.tiktok.com/media/clip.mp4?sig=1")
            .await
            .unwrap();

        assert_eq!(resolved.variants.len(), 1);
        assert_eq!(resolved.variants[0].file_extension, "mp4");
        assert_eq!(resolved.variants[0].media_kind, MediaKind::Video);
        assert_eq!(resolved.metadata.title, "clip");
        assert_eq!(resolved.metadata.platform_tag, "tiktok");
    }

    #[tokio::test]
    async fn test_direct_resolver_rejects_other_schemes() {
        let err = DirectUrlResolver.resolve("ftp://example.com/a.mp4").await.unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedLink(_)));

        let err = DirectUrlResolver.resolve("not a url").await.unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedLink(_)));
    }
}
