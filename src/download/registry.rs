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


//! Transfer registry
//!
//! The ledger of every requested transfer. All record mutation goes through
//! the operations here so the invariants hold in one place:
//!
//! - ids are unique (UUID v4)
//! - state only moves `pending -> active -> {completed, failed}` or
//!   `pending -> failed`
//! - progress is applied only while `active`, and never moves backwards
//! - at most one pending/active/completed record per
//!   `(source or original url, quality, media kind)`
//!
//! Operations on an id that is no longer present are no-ops, so a transfer
//! that keeps running after its record was removed cannot resurrect it.

use crate::download::progress::ProgressSnapshot;
use crate::download::strategy::{Delivered, StrategyKind};
use crate::error::{Result, TransferError};
use crate::file::paths::safe_filename;
use crate::media::{extension_from_url, platform_tag_from_url, stem_from_url, MediaKind};
use crate::resolver::{MediaMetadata, MediaVariant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Pending,
    Active,
    Completed,
    Failed,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "pending",
            TransferState::Active => "active",
            TransferState::Completed => "completed",
            TransferState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }

    /// Whether this state blocks a new request for the same media
    pub fn blocks_duplicates(&self) -> bool {
        !matches!(self, TransferState::Failed)
    }

    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Pending, Active) | (Pending, Failed) | (Active, Completed) | (Active, Failed)
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied description of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMeta {
    /// Resolved direct media URL
    pub source_url: String,
    /// Page link the user submitted
    pub original_url: Option<String>,
    pub display_name: String,
    pub platform_tag: String,
    pub quality_label: String,
    pub media_kind: MediaKind,
    pub file_extension: String,
    /// Size reported by the resolver
    pub expected_bytes: Option<u64>,
    pub author: Option<String>,
    pub duration_seconds: Option<u64>,
    pub thumbnail_url: Option<String>,
}

impl TransferMeta {
    /// Describe a direct media URL, inferring what the URL tells us
    pub fn for_url<S: Into<String>>(source_url: S) -> Self {
        let source_url = source_url.into();
        let media_kind = MediaKind::from_url(&source_url);
        let file_extension = extension_from_url(&source_url).unwrap_or_else(|| match media_kind {
            MediaKind::Video => "mp4".to_string(),
            MediaKind::Audio => "mp3".to_string(),
        });

        Self {
            display_name: stem_from_url(&source_url).unwrap_or_else(|| "download".to_string()),
            platform_tag: platform_tag_from_url(&source_url),
            quality_label: "original".to_string(),
            media_kind,
            file_extension,
            original_url: None,
            expected_bytes: None,
            author: None,
            duration_seconds: None,
            thumbnail_url: None,
            source_url,
        }
    }

    /// Describe one variant of a resolved page link
    pub fn from_variant(variant: &MediaVariant, metadata: &MediaMetadata, page_url: &str) -> Self {
        let display_name = if metadata.title.trim().is_empty() {
            "download".to_string()
        } else {
            metadata.title.clone()
        };

        Self {
            source_url: variant.url.clone(),
            original_url: Some(page_url.to_string()),
            display_name,
            platform_tag: metadata.platform_tag.clone(),
            quality_label: variant.quality_label.clone(),
            media_kind: variant.media_kind,
            file_extension: variant.file_extension.clone(),
            expected_bytes: variant.byte_size,
            author: metadata.author.clone(),
            duration_seconds: metadata.duration_seconds,
            thumbnail_url: metadata.thumbnail_url.clone(),
        }
    }

    pub fn with_original_url<S: Into<String>>(mut self, original_url: S) -> Self {
        self.original_url = Some(original_url.into());
        self
    }

    pub fn with_quality<S: Into<String>>(mut self, quality_label: S) -> Self {
        self.quality_label = quality_label.into();
        self
    }

    pub fn with_display_name<S: Into<String>>(mut self, display_name: S) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_expected_bytes(mut self, expected_bytes: u64) -> Self {
        self.expected_bytes = Some(expected_bytes);
        self
    }

    /// URLs this request is identified by for de-duplication
    fn dedup_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.source_url.as_str()).chain(self.original_url.as_deref())
    }
}

/// One requested transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    pub source_url: String,
    pub original_url: Option<String>,
    pub display_name: String,
    pub platform_tag: String,
    pub quality_label: String,
    pub media_kind: MediaKind,
    pub file_extension: String,
    pub expected_bytes: Option<u64>,
    pub author: Option<String>,
    pub duration_seconds: Option<u64>,
    pub thumbnail_url: Option<String>,

    pub state: TransferState,

    // Progress, written only while active
    pub bytes_transferred: u64,
    /// 0 if unknown
    pub bytes_total: u64,
    pub throughput_bytes_per_sec: f64,
    pub eta_seconds: Option<u64>,
    pub progress_percent: u8,

    pub error_message: Option<String>,
    pub delivered_by: Option<StrategyKind>,
    pub saved_path: Option<PathBuf>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransferRecord {
    fn new(meta: TransferMeta) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bytes_total: meta.expected_bytes.unwrap_or(0),
            source_url: meta.source_url,
            original_url: meta.original_url,
            display_name: meta.display_name,
            platform_tag: meta.platform_tag,
            quality_label: meta.quality_label,
            media_kind: meta.media_kind,
            file_extension: meta.file_extension,
            expected_bytes: meta.expected_bytes,
            author: meta.author,
            duration_seconds: meta.duration_seconds,
            thumbnail_url: meta.thumbnail_url,
            state: TransferState::Pending,
            bytes_transferred: 0,
            throughput_bytes_per_sec: 0.0,
            eta_seconds: None,
            progress_percent: 0,
            error_message: None,
            delivered_by: None,
            saved_path: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Filesystem-safe name `{title}_{platform}_{quality}.{ext}`
    pub fn suggested_filename(&self) -> String {
        safe_filename(
            &self.display_name,
            &self.platform_tag,
            &self.quality_label,
            &self.file_extension,
        )
    }

    fn matches(&self, meta: &TransferMeta) -> bool {
        if self.quality_label != meta.quality_label || self.media_kind != meta.media_kind {
            return false;
        }
        let own = [Some(self.source_url.as_str()), self.original_url.as_deref()];
        meta.dedup_urls().any(|url| own.contains(&Some(url)))
    }
}

/// Result of asking the registry for a new transfer
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Created(TransferRecord),
    /// Same media is already pending, active or completed
    DuplicateRejected { existing_id: String },
}

/// Record counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TransferSummary {
    pub fn total(&self) -> usize {
        self.pending + self.active + self.completed + self.failed
    }

    /// Transfers that have not reached a terminal state
    pub fn in_flight(&self) -> usize {
        self.pending + self.active
    }
}

/// Registry shared between the manager and running coordinators
pub type SharedRegistry = Arc<RwLock<TransferRegistry>>;

/// Ledger of all transfers, newest first
#[derive(Debug, Default)]
pub struct TransferRegistry {
    records: Vec<TransferRecord>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Create a pending record unless the same media is already tracked
    pub fn request(&mut self, meta: TransferMeta) -> RequestOutcome {
        if let Some(existing) = self.find_duplicate(&meta) {
            return RequestOutcome::DuplicateRejected {
                existing_id: existing.id.clone(),
            };
        }

        let record = TransferRecord::new(meta);
        self.records.insert(0, record.clone());
        RequestOutcome::Created(record)
    }

    /// Pending, active or completed record for the same media, if any
    pub fn find_duplicate(&self, meta: &TransferMeta) -> Option<&TransferRecord> {
        self.records
            .iter()
            .filter(|r| r.state.blocks_duplicates())
            .find(|r| r.matches(meta))
    }

    pub fn get(&self, id: &str) -> Option<&TransferRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut TransferRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Snapshot of all records, newest first
    pub fn list(&self) -> Vec<TransferRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop a record; returns it if it existed
    pub fn remove(&mut self, id: &str) -> Option<TransferRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    /// Drop every completed record; returns how many were removed
    pub fn clear_completed(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.state != TransferState::Completed);
        before - self.records.len()
    }

    /// Apply a progress snapshot to an active record
    ///
    /// Returns `false` (and changes nothing) if the record is gone or not
    /// active. Byte count and percent never decrease.
    pub fn apply_progress(&mut self, id: &str, snapshot: &ProgressSnapshot) -> bool {
        let record = match self.get_mut(id) {
            Some(record) if record.state == TransferState::Active => record,
            _ => return false,
        };

        record.bytes_transferred = record.bytes_transferred.max(snapshot.bytes_transferred);
        if let Some(total) = snapshot.bytes_total {
            record.bytes_total = total;
        }
        record.throughput_bytes_per_sec = snapshot.throughput_bytes_per_sec;
        record.eta_seconds = snapshot.eta_seconds;
        if let Some(percent) = snapshot.percent {
            record.progress_percent = record.progress_percent.max(percent.min(100));
        }

        true
    }

    /// Move a record to a new state
    ///
    /// `Ok(false)` if the record no longer exists; `InvalidTransition` if the
    /// move is not allowed by the lifecycle.
    pub fn mark_state(&mut self, id: &str, next: TransferState) -> Result<bool> {
        let record = match self.get_mut(id) {
            Some(record) => record,
            None => return Ok(false),
        };

        if !record.state.can_transition_to(next) {
            return Err(TransferError::InvalidTransition {
                id: id.to_string(),
                from: record.state,
                to: next,
            });
        }

        record.state = next;
        match next {
            TransferState::Active => record.started_at = Some(Utc::now()),
            TransferState::Completed => {
                record.progress_percent = 100;
                record.eta_seconds = Some(0);
                record.finished_at = Some(Utc::now());
            }
            TransferState::Failed => record.finished_at = Some(Utc::now()),
            TransferState::Pending => {}
        }

        Ok(true)
    }

    /// Mark an active record completed and note how it was delivered
    pub fn complete(&mut self, id: &str, strategy: StrategyKind, delivered: &Delivered) -> Result<bool> {
        if !self.mark_state(id, TransferState::Completed)? {
            return Ok(false);
        }

        if let Some(record) = self.get_mut(id) {
            record.delivered_by = Some(strategy);
            if let Delivered::Saved { path, bytes } = delivered {
                record.saved_path = path.clone();
                if let Some(bytes) = bytes {
                    record.bytes_transferred = record.bytes_transferred.max(*bytes);
                    if record.bytes_total == 0 {
                        record.bytes_total = *bytes;
                    }
                }
            }
        }
        Ok(true)
    }

    /// Mark a record failed with a message
    pub fn fail(&mut self, id: &str, message: &str) -> Result<bool> {
        if !self.mark_state(id, TransferState::Failed)? {
            return Ok(false);
        }

        if let Some(record) = self.get_mut(id) {
            record.error_message = Some(message.to_string());
        }
        Ok(true)
    }

    pub fn summary(&self) -> TransferSummary {
        let mut summary = TransferSummary::default();
        for record in &self.records {
            match record.state {
                TransferState::Pending => summary.pending += 1,
                TransferState::Active => summary.active += 1,
                TransferState::Completed => summary.completed += 1,
                TransferState::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(url: &str) -> TransferMeta {
        TransferMeta::for_url(url).with_quality("HD")
    }

    fn created(outcome: RequestOutcome) -> TransferRecord {
        match outcome {
            RequestOutcome::Created(record) => record,
            other => panic!("expected a new record, got {:?}", other),
        }
    }

    fn snapshot(transferred: u64, total: Option<u64>, percent: Option<u8>) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_transferred: transferred,
            bytes_total: total,
            throughput_bytes_per_sec: 1000.0,
            eta_seconds: None,
            percent,
            is_final: false,
        }
    }

    #[test]
    fn test_duplicate_rejected_without_mutation() {
        let mut registry = TransferRegistry::new();
        let first = created(registry.request(meta("https://cdn.example/video1.mp4")));

        let outcome = registry.request(meta("https://cdn.example/video1.mp4"));
        assert_eq!(
            outcome,
            RequestOutcome::DuplicateRejected {
                existing_id: first.id.clone()
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_by_original_url() {
        let mut registry = TransferRegistry::new();
        created(registry.request(
            meta("https://cdn.example/a.mp4").with_original_url("https://www.tiktok.com/@u/video/1"),
        ));

        // Resolver handed out a fresh signed URL for the same page
        let again = meta("https://cdn.example/a.mp4?sig=2").with_original_url("https://www.tiktok.com/@u/video/1");
        assert!(matches!(
            registry.request(again),
            RequestOutcome::DuplicateRejected { .. }
        ));

        // The page URL submitted as a source also matches
        assert!(registry
            .find_duplicate(&meta("https://www.tiktok.com/@u/video/1"))
            .is_some());
    }

    #[test]
    fn test_different_quality_or_kind_is_not_duplicate() {
        let mut registry = TransferRegistry::new();
        created(registry.request(meta("https://cdn.example/video1.mp4")));

        let sd = TransferMeta::for_url("https://cdn.example/video1.mp4").with_quality("SD");
        created(registry.request(sd));

        let mut audio = meta("https://cdn.example/video1.mp4");
        audio.media_kind = MediaKind::Audio;
        created(registry.request(audio));

        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_failed_record_allows_retry() {
        let mut registry = TransferRegistry::new();
        let first = created(registry.request(meta("https://cdn.example/video1.mp4")));
        registry.mark_state(&first.id, TransferState::Active).unwrap();
        registry.fail(&first.id, "all strategies failed").unwrap();

        let retry = created(registry.request(meta("https://cdn.example/video1.mp4")));
        assert_ne!(retry.id, first.id);
        assert_eq!(registry.list()[0].id, retry.id);
    }

    #[test]
    fn test_transitions_only_move_forward() {
        let mut registry = TransferRegistry::new();
        let record = created(registry.request(meta("https://cdn.example/video1.mp4")));
        let id = record.id.as_str();

        assert!(registry.mark_state(id, TransferState::Completed).is_err());
        assert!(registry.mark_state(id, TransferState::Active).unwrap());
        assert!(registry.mark_state(id, TransferState::Pending).is_err());
        assert!(registry.mark_state(id, TransferState::Completed).unwrap());

        for next in [
            TransferState::Pending,
            TransferState::Active,
            TransferState::Completed,
            TransferState::Failed,
        ] {
            let err = registry.mark_state(id, next).unwrap_err();
            assert!(matches!(err, TransferError::InvalidTransition { .. }));
        }

        let record = registry.get(id).unwrap();
        assert_eq!(record.state, TransferState::Completed);
        assert_eq!(record.progress_percent, 100);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_pending_can_fail_directly() {
        let mut registry = TransferRegistry::new();
        let record = created(registry.request(meta("https://cdn.example/video1.mp4")));
        assert!(registry.fail(&record.id, "no strategy").unwrap());
        assert_eq!(
            registry.get(&record.id).unwrap().error_message.as_deref(),
            Some("no strategy")
        );
    }

    #[test]
    fn test_progress_only_while_active_and_monotonic() {
        let mut registry = TransferRegistry::new();
        let record = created(registry.request(meta("https://cdn.example/video1.mp4")));
        let id = record.id.as_str();

        assert!(!registry.apply_progress(id, &snapshot(10, Some(100), Some(10))));

        registry.mark_state(id, TransferState::Active).unwrap();
        assert!(registry.apply_progress(id, &snapshot(50, Some(100), Some(50))));
        assert!(registry.apply_progress(id, &snapshot(40, Some(100), Some(40))));

        let record = registry.get(id).unwrap();
        assert_eq!(record.bytes_transferred, 50);
        assert_eq!(record.progress_percent, 50);
        assert_eq!(record.bytes_total, 100);

        registry.mark_state(id, TransferState::Failed).unwrap();
        assert!(!registry.apply_progress(id, &snapshot(90, Some(100), Some(90))));
        assert_eq!(registry.get(id).unwrap().bytes_transferred, 50);
    }

    #[test]
    fn test_removed_record_is_not_resurrected() {
        let mut registry = TransferRegistry::new();
        let record = created(registry.request(meta("https://cdn.example/video1.mp4")));
        registry.mark_state(&record.id, TransferState::Active).unwrap();

        assert!(registry.remove(&record.id).is_some());
        assert!(!registry.apply_progress(&record.id, &snapshot(10, None, None)));
        assert!(!registry.mark_state(&record.id, TransferState::Completed).unwrap());
        assert!(!registry.fail(&record.id, "late").unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear_completed_leaves_others() {
        let mut registry = TransferRegistry::new();
        let ids: Vec<String> = (0..4)
            .map(|i| created(registry.request(meta(&format!("https://cdn.example/v{}.mp4", i)))).id)
            .collect();

        registry.mark_state(&ids[1], TransferState::Active).unwrap();
        registry.mark_state(&ids[2], TransferState::Active).unwrap();
        registry
            .complete(&ids[2], StrategyKind::DirectLinkSave, &Delivered::Saved { path: None, bytes: Some(7) })
            .unwrap();
        registry.fail(&ids[3], "boom").unwrap();

        assert_eq!(registry.clear_completed(), 1);
        assert_eq!(registry.len(), 3);
        assert!(registry.get(&ids[2]).is_none());

        let summary = registry.summary();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn test_complete_records_delivery() {
        let mut registry = TransferRegistry::new();
        let record = created(registry.request(meta("https://cdn.example/video1.mp4")));
        registry.mark_state(&record.id, TransferState::Active).unwrap();
        registry
            .complete(
                &record.id,
                StrategyKind::StreamingBlobSave,
                &Delivered::Saved {
                    path: Some(PathBuf::from("/tmp/video1_example_HD.mp4")),
                    bytes: Some(2048),
                },
            )
            .unwrap();

        let record = registry.get(&record.id).unwrap();
        assert_eq!(record.delivered_by, Some(StrategyKind::StreamingBlobSave));
        assert_eq!(record.bytes_total, 2048);
        assert_eq!(record.bytes_transferred, 2048);
        assert_eq!(record.suggested_filename(), "video1_example_HD.mp4");
    }
}
