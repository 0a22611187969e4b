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


//! Error types for the transfer engine
//!
//! Errors are split by how far they travel:
//!
//! - [`StrategyError`] never leaves the fallback loop. A strategy that fails
//!   with either variant is logged and the next strategy is tried.
//! - [`ResolveError`] comes from the external link resolver. It stops a
//!   submission before any record is created.
//! - [`TransferError`] is the crate-level error returned from public
//!   operations. Only `Resolve` and `ExhaustedStrategies` are meant to be
//!   shown to the user; everything else is a programming or configuration
//!   problem.
//!
//! A duplicate request is not an error at all: see
//! [`RequestOutcome::DuplicateRejected`](crate::download::registry::RequestOutcome).

use crate::download::registry::TransferState;
use thiserror::Error;

/// Result type alias using our TransferError type
pub type Result<T> = std::result::Result<T, TransferError>;

/// Failure of a single delivery strategy attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// Remote read failed: connection error, non-2xx response, truncated body
    #[error("Network failure: {message}")]
    NetworkFailure {
        message: String,
        /// HTTP status code if the server answered
        status_code: Option<u16>,
    },

    /// The environment lacks a primitive the strategy needs
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl StrategyError {
    /// Create a NetworkFailure without a status code
    pub fn network<S: Into<String>>(message: S) -> Self {
        StrategyError::NetworkFailure {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create an UnsupportedOperation error
    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        StrategyError::UnsupportedOperation(message.into())
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            StrategyError::NetworkFailure { status_code, .. } => *status_code,
            StrategyError::UnsupportedOperation(_) => None,
        }
    }
}

impl From<reqwest::Error> for StrategyError {
    fn from(err: reqwest::Error) -> Self {
        StrategyError::NetworkFailure {
            message: err.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Failure of the external metadata/link resolver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Resolver service could not be reached or answered with an error
    #[error("Resolver request failed: {0}")]
    RequestFailed(String),

    /// Resolver answered but offered nothing to download
    #[error("No downloadable variants for {0}")]
    NoVariants(String),

    /// Link format is not recognised by the resolver
    #[error("Unsupported link: {0}")]
    UnsupportedLink(String),
}

/// Main error type for the transfer engine
#[derive(Error, Debug)]
pub enum TransferError {
    // ===== User-visible =====

    /// Link could not be resolved into a media URL; no transfer was created
    #[error("Could not fetch information: {0}")]
    Resolve(#[from] ResolveError),

    /// Every strategy for the delivery profile failed
    #[error("All {attempts} delivery strategies failed for transfer {id}")]
    ExhaustedStrategies {
        id: String,
        attempts: usize,
    },

    // ===== Registry =====

    /// Record id is not in the registry
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    /// Requested state change would move a record backwards or out of a terminal state
    #[error("Invalid state transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: TransferState,
        to: TransferState,
    },

    // ===== Input/Configuration =====

    /// Invalid download URL format or protocol
    #[error("Invalid download URL: {0}")]
    InvalidDownloadUrl(String),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

impl TransferError {
    /// Create a TransferNotFound error
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        TransferError::TransferNotFound(id.into())
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        TransferError::InvalidInput(message.into())
    }

    /// Create an InvalidConfiguration error with a message
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        TransferError::InvalidConfiguration(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        TransferError::InternalError(message.into())
    }

    /// Whether this error is one the user should see as a notice
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            TransferError::Resolve(_) | TransferError::ExhaustedStrategies { .. }
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            TransferError::Resolve(_) => {
                "Could not fetch information for this link. Please check the URL and try again.".to_string()
            }
            TransferError::ExhaustedStrategies { .. } => {
                "Download failed. Please try again.".to_string()
            }
            TransferError::InvalidDownloadUrl(url) => {
                format!("'{}' is not a valid download link.", url)
            }
            _ => self.to_string(),
        }
    }
}
