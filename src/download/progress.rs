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


//! Streaming progress tracking and reporting
//!
//! # Progress Information
//! - Bytes transferred / total bytes (total may be unknown)
//! - Throughput: bytes transferred divided by wall-clock time since the
//!   first read began
//! - ETA: remaining bytes divided by throughput, unknown when either the
//!   total or the throughput is unknown
//! - Percent: `round(transferred / total * 100)`, unreported while the total
//!   is unknown
//!
//! # Emission
//! Snapshots are throttled: one is emitted once `min_interval` has passed or
//! `byte_quantum` bytes have arrived since the previous one. The final
//! snapshot (100%, full byte count) is produced by [`ProgressTracker::finish`],
//! which consumes the tracker so it can only happen once.

use crate::error::StrategyError;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// One point-in-time progress reading for an active transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Bytes received so far
    pub bytes_transferred: u64,

    /// Total bytes if known
    pub bytes_total: Option<u64>,

    /// Average bytes per second since the read began
    pub throughput_bytes_per_sec: f64,

    /// Estimated seconds remaining, `None` while unknown
    pub eta_seconds: Option<u64>,

    /// Percent complete, `None` while the total is unknown
    pub percent: Option<u8>,

    /// Whether this is the last snapshot of the stream
    pub is_final: bool,
}

impl ProgressSnapshot {
    /// Format throughput (e.g., "1.5 MB/s")
    pub fn speed_string(&self) -> String {
        format_speed(self.throughput_bytes_per_sec)
    }

    /// Format ETA (e.g., "2:05")
    pub fn eta_string(&self) -> String {
        format_eta(self.eta_seconds)
    }

    /// Format progress as display string
    pub fn display_string(&self) -> String {
        let amount = match self.bytes_total {
            Some(total) => format!(
                "{} / {}",
                format_bytes(self.bytes_transferred),
                format_bytes(total)
            ),
            None => format_bytes(self.bytes_transferred),
        };

        match self.percent {
            Some(percent) => format!(
                "{}% ({}) - {} - ETA {}",
                percent,
                amount,
                self.speed_string(),
                self.eta_string()
            ),
            None => format!("{} - {}", amount, self.speed_string()),
        }
    }
}

/// Format bytes with 1024-based units (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// Format a throughput in bytes per second
pub fn format_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return format_bytes(0) + "/s";
    }
    format_bytes(bytes_per_sec as u64) + "/s"
}

/// Format ETA as `m:ss`, or `--` while unknown
pub fn format_eta(eta_seconds: Option<u64>) -> String {
    match eta_seconds {
        Some(seconds) if seconds > 0 => format!("{}:{:02}", seconds / 60, seconds % 60),
        _ => "--".to_string(),
    }
}

/// Snapshot throttling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Minimum time between snapshots
    pub min_interval: Duration,

    /// Bytes after which a snapshot is due regardless of time
    pub byte_quantum: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(200),
            byte_quantum: 100 * 1024,
        }
    }
}

/// Progress tracker for one transfer attempt
///
/// Not restartable: a fresh attempt needs a fresh tracker.
#[derive(Debug)]
pub struct ProgressTracker {
    bytes_total: Option<u64>,
    bytes_transferred: u64,
    started: Instant,
    last_emit_time: Instant,
    last_emit_bytes: u64,
    settings: TrackerSettings,
}

impl ProgressTracker {
    /// Create a tracker whose clock starts now
    pub fn new(bytes_total: Option<u64>, settings: TrackerSettings) -> Self {
        Self::starting_at(bytes_total, settings, Instant::now())
    }

    /// Create a tracker whose clock started at `started`
    pub fn starting_at(bytes_total: Option<u64>, settings: TrackerSettings, started: Instant) -> Self {
        Self {
            bytes_total: bytes_total.filter(|t| *t > 0),
            bytes_transferred: 0,
            started,
            last_emit_time: started,
            last_emit_bytes: 0,
            settings,
        }
    }

    /// Total size became known after the stream started
    pub fn set_total(&mut self, bytes_total: u64) {
        if bytes_total > 0 {
            self.bytes_total = Some(bytes_total);
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn bytes_total(&self) -> Option<u64> {
        self.bytes_total
    }

    /// Account for a received chunk
    ///
    /// Returns a snapshot when one is due under the throttling settings.
    pub fn record(&mut self, chunk_len: u64) -> Option<ProgressSnapshot> {
        self.record_at(chunk_len, Instant::now())
    }

    /// Account for a received chunk at an explicit time
    pub fn record_at(&mut self, chunk_len: u64, now: Instant) -> Option<ProgressSnapshot> {
        self.bytes_transferred = self.bytes_transferred.saturating_add(chunk_len);

        let bytes_due = self.bytes_transferred - self.last_emit_bytes >= self.settings.byte_quantum;
        let time_due = now.saturating_duration_since(self.last_emit_time) >= self.settings.min_interval;
        if !(bytes_due || time_due) {
            return None;
        }

        self.last_emit_time = now;
        self.last_emit_bytes = self.bytes_transferred;
        Some(self.snapshot_at(now))
    }

    /// Current reading without affecting throttling
    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let throughput = self.throughput_at(now);
        let eta_seconds = match self.bytes_total {
            Some(total) if throughput > 0.0 => {
                let remaining = total.saturating_sub(self.bytes_transferred);
                Some((remaining as f64 / throughput).round() as u64)
            }
            _ => None,
        };

        ProgressSnapshot {
            bytes_transferred: self.bytes_transferred,
            bytes_total: self.bytes_total,
            throughput_bytes_per_sec: throughput,
            eta_seconds,
            percent: self.bytes_total.map(|total| percent_of(self.bytes_transferred, total)),
            is_final: false,
        }
    }

    /// Final snapshot: full byte count at 100%
    pub fn finish(self) -> ProgressSnapshot {
        self.finish_at(Instant::now())
    }

    /// Final snapshot at an explicit time
    pub fn finish_at(self, now: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_transferred: self.bytes_transferred,
            bytes_total: Some(self.bytes_total.unwrap_or(self.bytes_transferred)),
            throughput_bytes_per_sec: self.throughput_at(now),
            eta_seconds: Some(0),
            percent: Some(100),
            is_final: true,
        }
    }

    fn throughput_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        if elapsed > 0.0 {
            self.bytes_transferred as f64 / elapsed
        } else {
            0.0
        }
    }
}

fn percent_of(transferred: u64, total: u64) -> u8 {
    let percent = (transferred as f64 / total as f64 * 100.0).round();
    percent.min(100.0) as u8
}

/// A chunk read through the tracker, with the snapshot it produced if any
#[derive(Debug, Clone)]
pub struct TrackedChunk {
    pub data: Bytes,
    pub snapshot: Option<ProgressSnapshot>,
}

enum TrackState<S> {
    Reading(S, ProgressTracker),
    Done,
}

/// Wrap a chunk stream so that reading it produces progress snapshots
///
/// The returned stream yields every chunk of the input. When the input ends
/// it yields one more item with empty data carrying the final snapshot. An
/// input error is yielded once and ends the stream without a final snapshot.
pub fn track<S>(
    chunks: S,
    bytes_total: Option<u64>,
    settings: TrackerSettings,
) -> impl Stream<Item = Result<TrackedChunk, StrategyError>>
where
    S: Stream<Item = Result<Bytes, StrategyError>> + Unpin,
{
    let tracker = ProgressTracker::new(bytes_total, settings);

    stream::unfold(TrackState::Reading(chunks, tracker), |state| async move {
        match state {
            TrackState::Done => None,
            TrackState::Reading(mut chunks, mut tracker) => match chunks.next().await {
                Some(Ok(data)) => {
                    let snapshot = tracker.record(data.len() as u64);
                    Some((
                        Ok(TrackedChunk { data, snapshot }),
                        TrackState::Reading(chunks, tracker),
                    ))
                }
                Some(Err(e)) => Some((Err(e), TrackState::Done)),
                None => {
                    let snapshot = tracker.finish();
                    Some((
                        Ok(TrackedChunk {
                            data: Bytes::new(),
                            snapshot: Some(snapshot),
                        }),
                        TrackState::Done,
                    ))
                }
            },
        }
    })
}
