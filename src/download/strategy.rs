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


//! Delivery strategies
//!
//! Each strategy moves bytes from a URL into a saved file using only the
//! environment primitives it needs:
//!
//! | Strategy | Primitive | Progress | Failure modes |
//! |---|---|---|---|
//! | `streaming-blob-save` | blob save | yes | network, unsupported |
//! | `direct-link-save` | direct save | no | unsupported |
//! | `new-tab-open` | open URL | no | never fails |
//! | `form-post-open` | form submit | no | never fails |
//! | `legacy-save-or-open` | legacy save | yes | network, unsupported |
//!
//! [`StrategyPlan`] maps a delivery profile to the order strategies are tried in.

use crate::capability::DeliveryProfile;
use crate::config::ProfileOverride;
use crate::download::progress::{track, ProgressSnapshot, TrackerSettings};
use crate::download::source::ByteSource;
use crate::environment::{DeliveryEnvironment, Primitive};
use crate::error::StrategyError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Upper bound on buffer preallocation from an advertised length
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Identifies one delivery technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    StreamingBlobSave,
    DirectLinkSave,
    NewTabOpen,
    FormPostOpen,
    LegacySaveOrOpen,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::StreamingBlobSave => "streaming-blob-save",
            StrategyKind::DirectLinkSave => "direct-link-save",
            StrategyKind::NewTabOpen => "new-tab-open",
            StrategyKind::FormPostOpen => "form-post-open",
            StrategyKind::LegacySaveOrOpen => "legacy-save-or-open",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sender half used by strategies to publish progress
pub type ProgressSender = mpsc::UnboundedSender<ProgressSnapshot>;

/// Everything a strategy needs for one attempt
///
/// Owned by the attempt: dropping it closes the progress channel, which is
/// how the coordinator knows no more snapshots will come.
#[derive(Debug)]
pub struct DeliveryRequest {
    pub transfer_id: String,
    pub source_url: String,
    pub filename: String,
    /// Size known from the resolver, used when the server sends none
    pub expected_bytes: Option<u64>,
    progress: ProgressSender,
}

impl DeliveryRequest {
    pub fn new(
        transfer_id: String,
        source_url: String,
        filename: String,
        expected_bytes: Option<u64>,
        progress: ProgressSender,
    ) -> Self {
        Self {
            transfer_id,
            source_url,
            filename,
            expected_bytes,
            progress,
        }
    }

    /// Publish a snapshot; a closed channel means nobody is listening anymore
    pub fn report(&self, snapshot: ProgressSnapshot) {
        let _ = self.progress.send(snapshot);
    }
}

/// Result of a successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    /// Bytes were saved (by us or by the environment)
    Saved {
        path: Option<PathBuf>,
        bytes: Option<u64>,
    },
    /// URL was handed to the environment; the outcome is not observable
    HandedOff,
}

/// One concrete technique for moving bytes from a URL into a saved file
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn deliver(&self, request: DeliveryRequest) -> Result<Delivered, StrategyError>;
}

/// Read the whole resource into memory, publishing progress as it arrives
async fn fetch_tracked(
    source: &dyn ByteSource,
    request: &DeliveryRequest,
    settings: TrackerSettings,
) -> Result<Bytes, StrategyError> {
    let body = source.open(&request.source_url).await?;
    let total = body.content_length.or(request.expected_bytes);

    let capacity = total.unwrap_or(0).min(MAX_PREALLOCATION) as usize;
    let mut buffer = BytesMut::with_capacity(capacity);

    let tracked = track(body.chunks, total, settings);
    futures_util::pin_mut!(tracked);

    while let Some(item) = tracked.next().await {
        let item = item?;
        buffer.extend_from_slice(&item.data);

        if let Some(snapshot) = item.snapshot {
            if snapshot.is_final {
                if let Some(expected) = body.content_length {
                    if snapshot.bytes_transferred < expected {
                        return Err(StrategyError::network(format!(
                            "Download incomplete: {}/{} bytes",
                            snapshot.bytes_transferred, expected
                        )));
                    }
                }
            }
            request.report(snapshot);
        }
    }

    Ok(buffer.freeze())
}

/// Fetch with progress into memory, then save through the environment
pub struct StreamingBlobSave {
    environment: Arc<dyn DeliveryEnvironment>,
    source: Arc<dyn ByteSource>,
    settings: TrackerSettings,
}

impl StreamingBlobSave {
    pub fn new(
        environment: Arc<dyn DeliveryEnvironment>,
        source: Arc<dyn ByteSource>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            environment,
            source,
            settings,
        }
    }
}

#[async_trait]
impl TransferStrategy for StreamingBlobSave {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StreamingBlobSave
    }

    async fn deliver(&self, request: DeliveryRequest) -> Result<Delivered, StrategyError> {
        if !self.environment.supports(Primitive::BlobSave) {
            return Err(StrategyError::unsupported("blob save is not available"));
        }

        let data = fetch_tracked(self.source.as_ref(), &request, self.settings).await?;
        let bytes = data.len() as u64;
        let path = self.environment.save_blob(&request.filename, data).await?;

        Ok(Delivered::Saved {
            path,
            bytes: Some(bytes),
        })
    }
}

/// Let the environment fetch and save the URL itself
pub struct DirectLinkSave {
    environment: Arc<dyn DeliveryEnvironment>,
}

impl DirectLinkSave {
    pub fn new(environment: Arc<dyn DeliveryEnvironment>) -> Self {
        Self { environment }
    }
}

#[async_trait]
impl TransferStrategy for DirectLinkSave {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectLinkSave
    }

    async fn deliver(&self, request: DeliveryRequest) -> Result<Delivered, StrategyError> {
        if !self.environment.supports(Primitive::DirectSave) {
            return Err(StrategyError::unsupported("direct save is not available"));
        }

        // Only UnsupportedOperation may leave this strategy
        let path = self
            .environment
            .save_from_url(&request.source_url, &request.filename)
            .await
            .map_err(|e| match e {
                StrategyError::UnsupportedOperation(_) => e,
                other => StrategyError::unsupported(format!("direct save failed: {}", other)),
            })?;

        Ok(Delivered::Saved { path, bytes: None })
    }
}

/// Hand the URL to the default open mechanism
pub struct NewTabOpen {
    environment: Arc<dyn DeliveryEnvironment>,
}

impl NewTabOpen {
    pub fn new(environment: Arc<dyn DeliveryEnvironment>) -> Self {
        Self { environment }
    }
}

#[async_trait]
impl TransferStrategy for NewTabOpen {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NewTabOpen
    }

    async fn deliver(&self, request: DeliveryRequest) -> Result<Delivered, StrategyError> {
        if let Err(e) = self.environment.open_url(&request.source_url).await {
            log::warn!("Open for {} reported: {}", request.transfer_id, e);
        }
        Ok(Delivered::HandedOff)
    }
}

/// Navigate to the URL through a form submission
pub struct FormPostOpen {
    environment: Arc<dyn DeliveryEnvironment>,
}

impl FormPostOpen {
    pub fn new(environment: Arc<dyn DeliveryEnvironment>) -> Self {
        Self { environment }
    }
}

#[async_trait]
impl TransferStrategy for FormPostOpen {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FormPostOpen
    }

    async fn deliver(&self, request: DeliveryRequest) -> Result<Delivered, StrategyError> {
        if let Err(e) = self.environment.submit_form(&request.source_url).await {
            log::warn!("Form submit for {} reported: {}", request.transfer_id, e);
        }
        Ok(Delivered::HandedOff)
    }
}

/// Fetch with progress, then use the legacy save-or-open API
pub struct LegacySaveOrOpen {
    environment: Arc<dyn DeliveryEnvironment>,
    source: Arc<dyn ByteSource>,
    settings: TrackerSettings,
}

impl LegacySaveOrOpen {
    pub fn new(
        environment: Arc<dyn DeliveryEnvironment>,
        source: Arc<dyn ByteSource>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            environment,
            source,
            settings,
        }
    }
}

#[async_trait]
impl TransferStrategy for LegacySaveOrOpen {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LegacySaveOrOpen
    }

    async fn deliver(&self, request: DeliveryRequest) -> Result<Delivered, StrategyError> {
        if !self.environment.supports(Primitive::LegacySaveOrOpen) {
            return Err(StrategyError::unsupported("legacy save-or-open is not available"));
        }

        let data = fetch_tracked(self.source.as_ref(), &request, self.settings).await?;
        let bytes = data.len() as u64;
        let path = self
            .environment
            .legacy_save_or_open(&request.filename, data)
            .await?;

        Ok(Delivered::Saved {
            path,
            bytes: Some(bytes),
        })
    }
}

/// Strategy priority per delivery profile, most capable first
#[derive(Debug, Clone, Default)]
pub struct StrategyPlan {
    overrides: HashMap<DeliveryProfile, Vec<StrategyKind>>,
}

impl StrategyPlan {
    /// Plan using only the built-in table
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan with per-profile replacements from configuration
    pub fn with_overrides(overrides: &[ProfileOverride]) -> Self {
        Self {
            overrides: overrides
                .iter()
                .map(|o| (o.profile, o.strategies.clone()))
                .collect(),
        }
    }

    /// Built-in order for a profile
    pub fn default_order(profile: DeliveryProfile) -> &'static [StrategyKind] {
        use StrategyKind::*;
        match profile {
            DeliveryProfile::DesktopStandardBrowser => &[StreamingBlobSave, DirectLinkSave, NewTabOpen],
            DeliveryProfile::DesktopConstrainedBrowser => &[DirectLinkSave, NewTabOpen],
            DeliveryProfile::MobileStandardBrowser => &[DirectLinkSave, StreamingBlobSave, NewTabOpen],
            DeliveryProfile::MobileConstrainedBrowser => &[DirectLinkSave, NewTabOpen],
            DeliveryProfile::LegacyBlobApi => &[LegacySaveOrOpen, NewTabOpen],
            DeliveryProfile::Unknown => &[NewTabOpen],
        }
    }

    /// Strategies to attempt for a profile, each at most once
    pub fn attempts(&self, profile: DeliveryProfile) -> Vec<StrategyKind> {
        let order: &[StrategyKind] = match self.overrides.get(&profile) {
            Some(custom) => custom.as_slice(),
            None => Self::default_order(profile),
        };

        let mut attempts = Vec::with_capacity(order.len());
        for kind in order {
            if !attempts.contains(kind) {
                attempts.push(*kind);
            }
        }
        attempts
    }
}

/// The registered strategy implementations, by kind
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: HashMap<StrategyKind, Arc<dyn TransferStrategy>>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five strategies over one environment and byte source
    pub fn standard(
        environment: Arc<dyn DeliveryEnvironment>,
        source: Arc<dyn ByteSource>,
        settings: TrackerSettings,
    ) -> Self {
        Self::new()
            .with(Arc::new(StreamingBlobSave::new(
                Arc::clone(&environment),
                Arc::clone(&source),
                settings,
            )))
            .with(Arc::new(DirectLinkSave::new(Arc::clone(&environment))))
            .with(Arc::new(NewTabOpen::new(Arc::clone(&environment))))
            .with(Arc::new(FormPostOpen::new(Arc::clone(&environment))))
            .with(Arc::new(LegacySaveOrOpen::new(environment, source, settings)))
    }

    /// Register or replace the strategy for its kind
    pub fn with(mut self, strategy: Arc<dyn TransferStrategy>) -> Self {
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn TransferStrategy>> {
        self.strategies.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.strategies.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("StrategySet").field("strategies", &kinds).finish()
    }
}
