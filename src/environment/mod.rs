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


//! Delivery environment primitives
//!
//! Strategies are the only components allowed to cause side effects in the
//! environment, and they do it exclusively through [`DeliveryEnvironment`].
//! A browser host implements this trait over its own save/open mechanisms;
//! [`LocalEnvironment`] implements it for a desktop process.

pub mod local;

pub use local::LocalEnvironment;

use crate::error::StrategyError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single capability a strategy may need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Primitive {
    /// Save in-memory content as a user-visible file
    BlobSave,
    /// Have the environment fetch and save a URL itself
    DirectSave,
    /// Open a URL with the default handler (new tab, system browser)
    OpenUrl,
    /// Navigate to a URL through a form submission
    FormSubmit,
    /// Legacy combined "save or open" for in-memory content
    LegacySaveOrOpen,
}

/// Side-effecting primitives available to strategies
#[async_trait]
pub trait DeliveryEnvironment: Send + Sync {
    /// Whether the primitive can be used at all
    fn supports(&self, primitive: Primitive) -> bool;

    /// Save content held in memory; returns where it landed if known
    async fn save_blob(&self, filename: &str, data: Bytes) -> Result<Option<PathBuf>, StrategyError>;

    /// Ask the environment to download `url` itself, without passing bytes through us
    async fn save_from_url(&self, url: &str, filename: &str) -> Result<Option<PathBuf>, StrategyError>;

    /// Hand the URL to the default open mechanism
    async fn open_url(&self, url: &str) -> Result<(), StrategyError>;

    /// Navigate to the URL via a form submission
    async fn submit_form(&self, url: &str) -> Result<(), StrategyError> {
        self.open_url(url).await
    }

    /// Legacy save-or-open for in-memory content
    async fn legacy_save_or_open(
        &self,
        _filename: &str,
        _data: Bytes,
    ) -> Result<Option<PathBuf>, StrategyError> {
        Err(StrategyError::unsupported("legacy save-or-open is not available"))
    }
}
