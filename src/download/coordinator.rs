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


//! Fallback coordinator
//!
//! Drives one transfer from `pending` to a terminal state:
//!
//! 1. Detect the delivery profile and look up its strategy order
//! 2. Mark the record `active` and announce the start
//! 3. Try each strategy once, in order, applying its progress snapshots to
//!    the registry as they arrive
//! 4. First success completes the record; if every strategy fails the record
//!    is marked `failed` and the user is told
//!
//! Strategy failures are logged and never surfaced individually. Every
//! registry write first checks the record still exists, so removing a record
//! mid-transfer just makes the rest of the run a no-op.

use crate::capability::CapabilityDetector;
use crate::download::progress::ProgressSnapshot;
use crate::download::registry::{SharedRegistry, TransferState};
use crate::download::strategy::{DeliveryRequest, StrategyKind, StrategyPlan, StrategySet};
use crate::error::{Result, StrategyError, TransferError};
use crate::notify::{NoticeKind, NotificationSink};
use std::sync::Arc;
use tokio::sync::mpsc;

/// How a coordinator run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A strategy delivered the file
    Completed { strategy: StrategyKind },
    /// Every strategy failed; each attempt with its error, in order
    Failed {
        attempts: Vec<(StrategyKind, StrategyError)>,
    },
    /// The record was removed before the run could finish it
    Removed,
}

/// Tries strategies for a record until one succeeds or all have failed
pub struct FallbackCoordinator {
    registry: SharedRegistry,
    detector: Arc<dyn CapabilityDetector>,
    plan: StrategyPlan,
    strategies: StrategySet,
    notifier: Arc<dyn NotificationSink>,
}

impl FallbackCoordinator {
    pub fn new(
        registry: SharedRegistry,
        detector: Arc<dyn CapabilityDetector>,
        plan: StrategyPlan,
        strategies: StrategySet,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            registry,
            detector,
            plan,
            strategies,
            notifier,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Run the fallback loop for a pending record
    ///
    /// Fails only if the record is not pending (it was already run).
    pub async fn run(&self, id: &str) -> Result<RunOutcome> {
        let (display_name, source_url, filename, expected_bytes) = {
            let registry = self.registry.read().await;
            match registry.get(id) {
                Some(record) => (
                    record.display_name.clone(),
                    record.source_url.clone(),
                    record.suggested_filename(),
                    record.expected_bytes,
                ),
                None => return Ok(RunOutcome::Removed),
            }
        };

        let profile = self.detector.detect();
        let plan = self.plan.attempts(profile);
        log::info!(
            "Transfer {} ({}): profile {}, strategies {:?}",
            id,
            display_name,
            profile,
            plan.iter().map(|k| k.as_str()).collect::<Vec<_>>()
        );

        if plan.is_empty() {
            return self.finish_failed(id, &display_name, Vec::new()).await;
        }

        if !self.registry.write().await.mark_state(id, TransferState::Active)? {
            return Ok(RunOutcome::Removed);
        }
        self.notifier.notify(
            NoticeKind::TransferStarted,
            &format!("Download started: {}", display_name),
        );

        let mut failures = Vec::with_capacity(plan.len());
        for kind in plan {
            if !self.registry.read().await.contains(id) {
                log::debug!("Transfer {} removed, stopping before {}", id, kind);
                return Ok(RunOutcome::Removed);
            }

            let strategy = match self.strategies.get(kind) {
                Some(strategy) => strategy,
                None => {
                    let error = StrategyError::unsupported(format!("{} is not registered", kind));
                    log::warn!("Transfer {}: {}", id, error);
                    failures.push((kind, error));
                    continue;
                }
            };

            log::debug!("Transfer {}: trying {}", id, kind);
            let (tx, rx) = mpsc::unbounded_channel();
            let request = DeliveryRequest::new(
                id.to_string(),
                source_url.clone(),
                filename.clone(),
                expected_bytes,
                tx,
            );

            // The request owns the sender, so the drain ends once deliver returns
            let (result, ()) = tokio::join!(strategy.deliver(request), self.drain_progress(id, rx));

            match result {
                Ok(delivered) => {
                    if !self.registry.write().await.complete(id, kind, &delivered)? {
                        return Ok(RunOutcome::Removed);
                    }
                    log::info!("Transfer {} completed via {}", id, kind);
                    self.notifier.notify(
                        NoticeKind::TransferCompleted,
                        &format!("Download completed: {}", display_name),
                    );
                    return Ok(RunOutcome::Completed { strategy: kind });
                }
                Err(error) => {
                    log::warn!("Transfer {}: {} failed: {}", id, kind, error);
                    failures.push((kind, error));
                }
            }
        }

        self.finish_failed(id, &display_name, failures).await
    }

    /// Apply snapshots in arrival order until the sender is dropped
    async fn drain_progress(&self, id: &str, mut rx: mpsc::UnboundedReceiver<ProgressSnapshot>) {
        while let Some(snapshot) = rx.recv().await {
            // A false return means the record is gone or no longer active
            self.registry.write().await.apply_progress(id, &snapshot);
        }
    }

    async fn finish_failed(
        &self,
        id: &str,
        display_name: &str,
        attempts: Vec<(StrategyKind, StrategyError)>,
    ) -> Result<RunOutcome> {
        let error = TransferError::ExhaustedStrategies {
            id: id.to_string(),
            attempts: attempts.len(),
        };
        let detail = attempts
            .last()
            .map(|(kind, e)| format!("{} (last: {}: {})", error, kind, e))
            .unwrap_or_else(|| error.to_string());

        if !self.registry.write().await.fail(id, &detail)? {
            return Ok(RunOutcome::Removed);
        }

        log::error!("Transfer {} failed: {}", id, detail);
        self.notifier.notify(
            NoticeKind::TransferFailed,
            &format!("Download failed: {}. Please try again.", display_name),
        );
        Ok(RunOutcome::Failed { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::DeliveryProfile;
    use crate::config::ProfileOverride;
    use crate::download::registry::{RequestOutcome, TransferMeta, TransferRegistry};
    use crate::download::strategy::{Delivered, TransferStrategy};
    use crate::notify::{ChannelNotifier, Notice};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        kind: StrategyKind,
        outcome: std::result::Result<Delivered, StrategyError>,
        progress: Vec<u64>,
        calls: AtomicUsize,
        remove_from: Option<SharedRegistry>,
    }

    impl Scripted {
        fn new(kind: StrategyKind, outcome: std::result::Result<Delivered, StrategyError>) -> Self {
            Self {
                kind,
                outcome,
                progress: Vec::new(),
                calls: AtomicUsize::new(0),
                remove_from: None,
            }
        }
    }

    #[async_trait]
    impl TransferStrategy for Scripted {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        async fn deliver(&self, request: DeliveryRequest) -> std::result::Result<Delivered, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(registry) = &self.remove_from {
                registry.write().await.remove(&request.transfer_id);
            }
            for bytes in &self.progress {
                request.report(ProgressSnapshot {
                    bytes_transferred: *bytes,
                    bytes_total: Some(100),
                    throughput_bytes_per_sec: 10.0,
                    eta_seconds: None,
                    percent: Some(*bytes as u8),
                    is_final: *bytes == 100,
                });
                tokio::task::yield_now().await;
            }
            self.outcome.clone()
        }
    }

    async fn pending(registry: &SharedRegistry, url: &str) -> String {
        match registry.write().await.request(TransferMeta::for_url(url)) {
            RequestOutcome::Created(record) => record.id,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<NoticeKind> {
        let mut kinds = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            kinds.push(notice.kind);
        }
        kinds
    }

    fn coordinator(
        registry: &SharedRegistry,
        profile: DeliveryProfile,
        plan: StrategyPlan,
        strategies: Vec<Arc<Scripted>>,
    ) -> (FallbackCoordinator, mpsc::UnboundedReceiver<Notice>) {
        let (notifier, rx) = ChannelNotifier::new();
        let set = strategies
            .into_iter()
            .fold(StrategySet::new(), |set, s| set.with(s as Arc<dyn TransferStrategy>));
        (
            FallbackCoordinator::new(
                Arc::clone(registry),
                Arc::new(profile),
                plan,
                set,
                Arc::new(notifier),
            ),
            rx,
        )
    }

    #[tokio::test]
    async fn test_network_failure_falls_back_silently() {
        let registry = TransferRegistry::shared();
        let id = pending(&registry, "https://cdn.example/video1.mp4").await;

        let streaming = Arc::new(Scripted::new(
            StrategyKind::StreamingBlobSave,
            Err(StrategyError::network("HTTP 503")),
        ));
        let direct = Arc::new(Scripted::new(
            StrategyKind::DirectLinkSave,
            Ok(Delivered::Saved { path: None, bytes: None }),
        ));
        let open = Arc::new(Scripted::new(StrategyKind::NewTabOpen, Ok(Delivered::HandedOff)));

        let (coordinator, mut notices) = coordinator(
            &registry,
            DeliveryProfile::DesktopStandardBrowser,
            StrategyPlan::new(),
            vec![streaming.clone(), direct.clone(), open.clone()],
        );

        let outcome = coordinator.run(&id).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                strategy: StrategyKind::DirectLinkSave
            }
        );
        assert_eq!(streaming.calls.load(Ordering::SeqCst), 1);
        assert_eq!(direct.calls.load(Ordering::SeqCst), 1);
        assert_eq!(open.calls.load(Ordering::SeqCst), 0);

        let record = registry.read().await.get(&id).cloned().unwrap();
        assert_eq!(record.state, TransferState::Completed);
        assert_eq!(record.delivered_by, Some(StrategyKind::DirectLinkSave));

        assert_eq!(
            drain(&mut notices),
            vec![NoticeKind::TransferStarted, NoticeKind::TransferCompleted]
        );
    }

    #[tokio::test]
    async fn test_exhausted_strategies_fail_record() {
        let registry = TransferRegistry::shared();
        let id = pending(&registry, "https://cdn.example/video1.mp4").await;

        let direct = Arc::new(Scripted::new(
            StrategyKind::DirectLinkSave,
            Err(StrategyError::unsupported("no direct save")),
        ));
        let plan = StrategyPlan::with_overrides(&[ProfileOverride {
            profile: DeliveryProfile::DesktopConstrainedBrowser,
            strategies: vec![StrategyKind::DirectLinkSave],
        }]);
        let (coordinator, mut notices) = coordinator(
            &registry,
            DeliveryProfile::DesktopConstrainedBrowser,
            plan,
            vec![direct],
        );

        match coordinator.run(&id).await.unwrap() {
            RunOutcome::Failed { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].0, StrategyKind::DirectLinkSave);
            }
            other => panic!("unexpected {:?}", other),
        }

        let record = registry.read().await.get(&id).cloned().unwrap();
        assert_eq!(record.state, TransferState::Failed);
        assert!(record.error_message.is_some());
        assert_eq!(
            drain(&mut notices),
            vec![NoticeKind::TransferStarted, NoticeKind::TransferFailed]
        );
    }

    #[tokio::test]
    async fn test_unregistered_strategy_counts_as_unsupported() {
        let registry = TransferRegistry::shared();
        let id = pending(&registry, "https://cdn.example/video1.mp4").await;
        let open = Arc::new(Scripted::new(StrategyKind::NewTabOpen, Ok(Delivered::HandedOff)));

        // Only new-tab-open is registered; the streaming and direct attempts are skipped
        let (coordinator, _notices) = coordinator(
            &registry,
            DeliveryProfile::DesktopStandardBrowser,
            StrategyPlan::new(),
            vec![open],
        );

        assert_eq!(
            coordinator.run(&id).await.unwrap(),
            RunOutcome::Completed {
                strategy: StrategyKind::NewTabOpen
            }
        );
    }

    #[tokio::test]
    async fn test_progress_applied_in_order() {
        let registry = TransferRegistry::shared();
        let id = pending(&registry, "https://cdn.example/video1.mp4").await;

        let mut streaming = Scripted::new(
            StrategyKind::StreamingBlobSave,
            Err(StrategyError::network("connection reset")),
        );
        streaming.progress = vec![10, 40, 60];
        let open = Arc::new(Scripted::new(StrategyKind::NewTabOpen, Ok(Delivered::HandedOff)));

        let (coordinator, _notices) = coordinator(
            &registry,
            DeliveryProfile::DesktopStandardBrowser,
            StrategyPlan::new(),
            vec![Arc::new(streaming), open],
        );
        coordinator.run(&id).await.unwrap();

        let record = registry.read().await.get(&id).cloned().unwrap();
        assert_eq!(record.bytes_transferred, 60);
        assert_eq!(record.bytes_total, 100);
        assert_eq!(record.progress_percent, 100);
        assert_eq!(record.state, TransferState::Completed);
    }

    #[tokio::test]
    async fn test_removed_mid_transfer_is_not_resurrected() {
        let registry = TransferRegistry::shared();
        let id = pending(&registry, "https://cdn.example/video1.mp4").await;

        let mut streaming = Scripted::new(
            StrategyKind::StreamingBlobSave,
            Ok(Delivered::Saved { path: None, bytes: Some(100) }),
        );
        streaming.progress = vec![50, 100];
        streaming.remove_from = Some(Arc::clone(&registry));

        let (coordinator, mut notices) = coordinator(
            &registry,
            DeliveryProfile::DesktopStandardBrowser,
            StrategyPlan::new(),
            vec![Arc::new(streaming)],
        );

        assert_eq!(coordinator.run(&id).await.unwrap(), RunOutcome::Removed);
        assert!(registry.read().await.is_empty());
        assert_eq!(drain(&mut notices), vec![NoticeKind::TransferStarted]);
    }

    #[tokio::test]
    async fn test_empty_plan_fails_from_pending() {
        let registry = TransferRegistry::shared();
        let id = pending(&registry, "https://cdn.example/video1.mp4").await;

        let plan = StrategyPlan::with_overrides(&[ProfileOverride {
            profile: DeliveryProfile::Unknown,
            strategies: Vec::new(),
        }]);
        let (coordinator, mut notices) = coordinator(&registry, DeliveryProfile::Unknown, plan, Vec::new());

        assert_eq!(
            coordinator.run(&id).await.unwrap(),
            RunOutcome::Failed { attempts: Vec::new() }
        );
        let record = registry.read().await.get(&id).cloned().unwrap();
        assert_eq!(record.state, TransferState::Failed);
        assert!(record.started_at.is_none());
        assert_eq!(drain(&mut notices), vec![NoticeKind::TransferFailed]);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let registry = TransferRegistry::shared();
        let id = pending(&registry, "https://cdn.example/video1.mp4").await;
        let open = Arc::new(Scripted::new(StrategyKind::NewTabOpen, Ok(Delivered::HandedOff)));
        let (coordinator, _notices) = coordinator(&registry, DeliveryProfile::Unknown, StrategyPlan::new(), vec![open]);

        coordinator.run(&id).await.unwrap();
        assert!(matches!(
            coordinator.run(&id).await,
            Err(TransferError::InvalidTransition { .. })
        ));
    }
}
