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


//! Transfer manager
//!
//! The caller-facing entry point. Requests go through the registry for
//! de-duplication; every new record gets its own coordinator run spawned on
//! the tokio runtime. Runs interleave on the runtime and only meet at the
//! shared registry.
//!
//! # Lifecycle
//! - `request`/`submit` create a pending record and spawn its run
//! - progress and state changes land in the registry as the run proceeds
//! - `remove` and `clear_completed` are the only ways records leave

use crate::capability::{CapabilityDetector, EnvironmentSignals};
use crate::config::EngineConfig;
use crate::download::coordinator::FallbackCoordinator;
use crate::download::registry::{
    RequestOutcome, SharedRegistry, TransferMeta, TransferRecord, TransferRegistry, TransferSummary,
};
use crate::download::source::HttpByteSource;
use crate::download::strategy::{StrategyPlan, StrategySet};
use crate::environment::LocalEnvironment;
use crate::error::{ResolveError, Result, TransferError};
use crate::notify::{LogNotifier, NoticeKind, NotificationSink};
use crate::resolver::{DirectUrlResolver, MediaResolver, VariantSelector};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

/// Request, track and manage media transfers
pub struct TransferManager {
    registry: SharedRegistry,
    coordinator: Arc<FallbackCoordinator>,
    resolver: Arc<dyn MediaResolver>,
    notifier: Arc<dyn NotificationSink>,

    /// Coordinator runs not yet awaited
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TransferManager {
    /// Assemble a manager from its collaborators
    pub fn new(
        detector: Arc<dyn CapabilityDetector>,
        plan: StrategyPlan,
        strategies: StrategySet,
        notifier: Arc<dyn NotificationSink>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Self {
        let registry = TransferRegistry::shared();
        let coordinator = FallbackCoordinator::new(
            Arc::clone(&registry),
            detector,
            plan,
            strategies,
            Arc::clone(&notifier),
        );

        Self {
            registry,
            coordinator: Arc::new(coordinator),
            resolver,
            notifier,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Desktop manager: local environment, HTTP source, log notices
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::from_config_with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn from_config_with_notifier(
        config: &EngineConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate()?;

        let environment = Arc::new(LocalEnvironment::from_config(config));
        let source = Arc::new(HttpByteSource::new(config)?);
        let strategies = StrategySet::standard(environment, source, config.tracker_settings());
        let plan = StrategyPlan::with_overrides(&config.strategy_overrides);

        let detector: Arc<dyn CapabilityDetector> = match config.profile_override {
            Some(profile) => Arc::new(profile),
            None => Arc::new(EnvironmentSignals::native_host()),
        };

        Ok(Self::new(
            detector,
            plan,
            strategies,
            notifier,
            Arc::new(DirectUrlResolver),
        ))
    }

    /// Use a different link resolver for `submit`
    pub fn with_resolver(mut self, resolver: Arc<dyn MediaResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Request a transfer of an already-resolved media URL
    ///
    /// A duplicate is reported through the notifier and returned as
    /// `DuplicateRejected`; it is not an error.
    pub async fn request(&self, meta: TransferMeta) -> Result<RequestOutcome> {
        validate_media_url(&meta.source_url)?;

        let outcome = self.registry.write().await.request(meta.clone());
        match &outcome {
            RequestOutcome::Created(record) => {
                log::info!(
                    "Created transfer {} for {} ({} {})",
                    record.id,
                    record.source_url,
                    record.quality_label,
                    record.media_kind
                );
                self.spawn_run(record.id.clone()).await;
            }
            RequestOutcome::DuplicateRejected { existing_id } => {
                log::info!("Rejected duplicate of {} for {}", existing_id, meta.source_url);
                self.notifier.notify(
                    NoticeKind::DuplicateRejected,
                    &format!("Already in downloads: {} ({})", meta.display_name, meta.quality_label),
                );
            }
        }

        Ok(outcome)
    }

    /// Resolve a page link, pick a variant and request it
    ///
    /// Resolver failures are reported through the notifier and nothing is
    /// created.
    pub async fn submit(&self, page_url: &str, selector: &VariantSelector) -> Result<RequestOutcome> {
        let resolved = match self.resolver.resolve(page_url).await {
            Ok(resolved) if resolved.variants.is_empty() => {
                Err(ResolveError::NoVariants(page_url.to_string()))
            }
            other => other,
        };

        let meta = resolved.and_then(|resolved| {
            selector
                .select(&resolved.variants)
                .map(|variant| TransferMeta::from_variant(variant, &resolved.metadata, page_url))
                .ok_or_else(|| ResolveError::NoVariants(format!("{} (no matching variant)", page_url)))
        });

        match meta {
            Ok(meta) => self.request(meta).await,
            Err(e) => {
                log::warn!("Could not resolve {}: {}", page_url, e);
                let error = TransferError::from(e);
                self.notifier.notify(NoticeKind::ResolveFailed, &error.user_message());
                Err(error)
            }
        }
    }

    async fn spawn_run(&self, id: String) {
        let coordinator = Arc::clone(&self.coordinator);
        let handle = tokio::spawn(async move {
            if let Err(e) = coordinator.run(&id).await {
                log::error!("Transfer {} run aborted: {}", id, e);
            }
        });
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Wait until every spawned run has finished
    pub async fn run_to_completion(&self) {
        loop {
            let handles = std::mem::take(&mut *self.tasks.lock().await);
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    log::error!("Transfer task did not finish: {}", e);
                }
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<TransferRecord> {
        self.registry.read().await.get(id).cloned()
    }

    /// All records, newest first
    pub async fn list(&self) -> Vec<TransferRecord> {
        self.registry.read().await.list()
    }

    /// Remove a record; a run still in flight for it stops touching the registry
    pub async fn remove(&self, id: &str) -> Result<TransferRecord> {
        let removed = self
            .registry
            .write()
            .await
            .remove(id)
            .ok_or_else(|| TransferError::not_found(id))?;
        log::info!("Removed transfer {} ({})", id, removed.state);
        Ok(removed)
    }

    pub async fn clear_completed(&self) -> usize {
        let cleared = self.registry.write().await.clear_completed();
        log::debug!("Cleared {} completed transfers", cleared);
        cleared
    }

    pub async fn summary(&self) -> TransferSummary {
        self.registry.read().await.summary()
    }
}

/// Only absolute http(s) URLs can be transferred
fn validate_media_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|_| TransferError::InvalidDownloadUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(TransferError::InvalidDownloadUrl(url.to_string())),
    }
}
