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


//! User-visible notices
//!
//! The engine never renders anything itself. It reports user-facing events to
//! a [`NotificationSink`], which a UI turns into toasts, banners or log lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Kinds of event surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeKind {
    DuplicateRejected,
    TransferStarted,
    TransferCompleted,
    TransferFailed,
    /// Link could not be resolved; no transfer was created
    ResolveFailed,
}

/// How prominently a notice should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl NoticeKind {
    pub fn severity(&self) -> Severity {
        match self {
            NoticeKind::TransferStarted => Severity::Info,
            NoticeKind::TransferCompleted => Severity::Success,
            NoticeKind::DuplicateRejected => Severity::Warning,
            NoticeKind::TransferFailed | NoticeKind::ResolveFailed => Severity::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::DuplicateRejected => "duplicate-rejected",
            NoticeKind::TransferStarted => "transfer-started",
            NoticeKind::TransferCompleted => "transfer-completed",
            NoticeKind::TransferFailed => "transfer-failed",
            NoticeKind::ResolveFailed => "resolve-failed",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of user-visible events
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// Writes notices to the `log` facade at a level matching their severity
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind.severity() {
            Severity::Info | Severity::Success => log::info!("[{}] {}", kind, message),
            Severity::Warning => log::warn!("[{}] {}", kind, message),
            Severity::Error => log::error!("[{}] {}", kind, message),
        }
    }
}

/// A notice as delivered through [`ChannelNotifier`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Forwards notices over a channel, for UIs running their own event loop
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its notices arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        // Receiver gone means the UI shut down
        let _ = self.sender.send(Notice {
            kind,
            message: message.to_string(),
        });
    }
}
