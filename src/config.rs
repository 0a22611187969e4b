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


//! Engine configuration
//!
//! Loaded from a JSON file or built in code. Every field has a default, so a
//! config file only needs the keys it changes.

use crate::capability::DeliveryProfile;
use crate::download::progress::TrackerSettings;
use crate::download::strategy::StrategyKind;
use crate::error::{Result, TransferError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Replacement priority list for one delivery profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverride {
    pub profile: DeliveryProfile,
    pub strategies: Vec<StrategyKind>,
}

/// Transfer engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory saved files land in (local environment)
    pub output_directory: PathBuf,

    /// Network timeout applied by the HTTP client, in seconds
    pub request_timeout_secs: u64,

    /// User agent sent with media requests
    pub user_agent: String,

    /// Extra headers sent with media requests
    pub request_headers: HashMap<String, String>,

    /// Minimum time between progress snapshots, in milliseconds
    pub progress_interval_ms: u64,

    /// Bytes after which a snapshot is emitted regardless of time
    pub progress_byte_quantum: u64,

    /// Skip detection and use this profile
    pub profile_override: Option<DeliveryProfile>,

    /// Per-profile replacement strategy orders
    pub strategy_overrides: Vec<ProfileOverride>,

    /// Opener argv template; `None` uses the platform opener
    pub open_command: Option<Vec<String>>,

    /// Direct-save fetcher argv template; `None` disables direct save
    pub direct_save_command: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            request_timeout_secs: 300,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            request_headers: HashMap::new(),
            progress_interval_ms: 200,
            progress_byte_quantum: 100 * 1024,
            profile_override: None,
            strategy_overrides: Vec::new(),
            open_command: None,
            direct_save_command: Some(crate::environment::local::default_direct_save_command()),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(TransferError::invalid_config("request_timeout_secs must be positive"));
        }
        if self.progress_byte_quantum == 0 {
            return Err(TransferError::invalid_config("progress_byte_quantum must be positive"));
        }

        let mut seen_profiles = HashSet::new();
        for entry in &self.strategy_overrides {
            if !seen_profiles.insert(entry.profile) {
                return Err(TransferError::invalid_config(format!(
                    "profile {} is overridden more than once",
                    entry.profile
                )));
            }
            let unique: HashSet<_> = entry.strategies.iter().collect();
            if unique.len() != entry.strategies.len() {
                return Err(TransferError::invalid_config(format!(
                    "strategy list for {} repeats a strategy",
                    entry.profile
                )));
            }
        }

        if let Some(command) = &self.open_command {
            if command.is_empty() {
                return Err(TransferError::invalid_config("open_command must not be empty"));
            }
        }
        if let Some(command) = &self.direct_save_command {
            if command.is_empty() {
                return Err(TransferError::invalid_config("direct_save_command must not be empty"));
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            min_interval: Duration::from_millis(self.progress_interval_ms),
            byte_quantum: self.progress_byte_quantum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracker_settings().byte_quantum, 100 * 1024);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "output_directory": "/tmp/media",
                "profile_override": "mobile-standard-browser",
                "strategy_overrides": [
                    { "profile": "mobile-standard-browser",
                      "strategies": ["direct-link-save", "form-post-open"] }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.output_directory, PathBuf::from("/tmp/media"));
        assert_eq!(config.request_timeout_secs, 300);
        assert_eq!(config.profile_override, Some(DeliveryProfile::MobileStandardBrowser));
        assert_eq!(
            config.strategy_overrides[0].strategies,
            vec![StrategyKind::DirectLinkSave, StrategyKind::FormPostOpen]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_repeated_strategy_rejected() {
        let config = EngineConfig {
            strategy_overrides: vec![ProfileOverride {
                profile: DeliveryProfile::Unknown,
                strategies: vec![StrategyKind::NewTabOpen, StrategyKind::NewTabOpen],
            }],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TransferError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let config = EngineConfig {
            progress_interval_ms: 50,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.progress_interval_ms, 50);
    }
}
