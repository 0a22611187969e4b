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


//! Transfer orchestration
//!
//! This module moves resolved media URLs into saved files.
//!
//! - `source` - streaming HTTP reads
//! - `progress` - throughput/ETA accounting over a chunk stream
//! - `strategy` - delivery techniques and their per-profile priority
//! - `registry` - the ledger of transfers and their lifecycle
//! - `coordinator` - the per-transfer fallback loop
//! - `manager` - caller-facing entry point

pub mod coordinator;
pub mod manager;
pub mod progress;
pub mod registry;
pub mod source;
pub mod strategy;

// Re-export commonly used types
pub use coordinator::{FallbackCoordinator, RunOutcome};
pub use manager::TransferManager;
pub use progress::{ProgressSnapshot, ProgressTracker, TrackerSettings};
pub use registry::{RequestOutcome, TransferMeta, TransferRecord, TransferRegistry, TransferState};
pub use source::{ByteSource, HttpByteSource};
pub use strategy::{Delivered, StrategyKind, StrategyPlan, StrategySet, TransferStrategy};
