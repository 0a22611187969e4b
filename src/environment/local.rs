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


//! Desktop implementation of the delivery primitives
//!
//! - Blob save writes into the output directory
//! - Direct save runs an external fetcher (`curl` by default)
//! - Open/submit hand the URL to the platform opener
//!
//! Command templates are argv lists; `{url}` and `{output}` are substituted
//! per argument.

use super::{DeliveryEnvironment, Primitive};
use crate::config::EngineConfig;
use crate::error::StrategyError;
use crate::file::paths::{collision_candidates, confine_to_directory};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Platform opener used when no command is configured
pub fn default_open_command() -> Vec<String> {
    #[cfg(target_os = "macos")]
    {
        vec!["open".to_string(), "{url}".to_string()]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            "cmd".to_string(),
            "/C".to_string(),
            "start".to_string(),
            String::new(),
            "{url}".to_string(),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec!["xdg-open".to_string(), "{url}".to_string()]
    }
}

/// Fetcher used for direct saves when no command is configured
pub fn default_direct_save_command() -> Vec<String> {
    ["curl", "-fsSL", "-o", "{output}", "{url}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Delivery environment for a desktop process
#[derive(Debug, Clone)]
pub struct LocalEnvironment {
    output_directory: PathBuf,
    open_command: Vec<String>,
    direct_save_command: Option<Vec<String>>,
}

impl LocalEnvironment {
    /// Environment saving into `output_directory` with platform defaults
    pub fn new(output_directory: PathBuf) -> Self {
        Self {
            output_directory,
            open_command: default_open_command(),
            direct_save_command: Some(default_direct_save_command()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            output_directory: config.output_directory.clone(),
            open_command: config
                .open_command
                .clone()
                .unwrap_or_else(default_open_command),
            direct_save_command: config.direct_save_command.clone(),
        }
    }

    /// Replace the opener; an empty command disables open/submit
    pub fn with_open_command(mut self, command: Vec<String>) -> Self {
        self.open_command = command;
        self
    }

    /// Replace the direct-save fetcher; `None` disables direct save
    pub fn with_direct_save_command(mut self, command: Option<Vec<String>>) -> Self {
        self.direct_save_command = command;
        self
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Create the first free candidate path so no other save can take it
    async fn claim_path(&self, filename: &str) -> Result<(PathBuf, File), StrategyError> {
        tokio::fs::create_dir_all(&self.output_directory)
            .await
            .map_err(|e| {
                StrategyError::unsupported(format!(
                    "cannot create output directory {:?}: {}",
                    self.output_directory, e
                ))
            })?;

        let requested = self.output_directory.join(confine_to_directory(filename));
        for path in collision_candidates(&requested) {
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StrategyError::unsupported(format!(
                        "cannot create {:?}: {}",
                        path, e
                    )))
                }
            }
        }

        Err(StrategyError::unsupported(format!(
            "no free filename for {:?}",
            requested
        )))
    }

    async fn write_file(&self, filename: &str, data: Bytes) -> Result<Option<PathBuf>, StrategyError> {
        let (path, mut file) = self.claim_path(filename).await?;

        let written = async {
            file.write_all(&data).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            discard_partial(&path).await;
            return Err(StrategyError::unsupported(format!("cannot write {:?}: {}", path, e)));
        }

        log::debug!("Saved {} bytes to {:?}", data.len(), path);
        Ok(Some(path))
    }
}

/// Remove a file left by a failed save
async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("Removed partial file {:?}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove partial file {:?}: {}", path, e),
    }
}

/// Substitute placeholders and run a command template to completion
async fn run_template(template: &[String], url: &str, output: Option<&Path>) -> Result<(), StrategyError> {
    let output = output.map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
    let argv: Vec<String> = template
        .iter()
        .map(|arg| arg.replace("{url}", url).replace("{output}", &output))
        .collect();

    let (program, args) = argv
        .split_first()
        .ok_or_else(|| StrategyError::unsupported("no command configured"))?;

    let result = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| StrategyError::unsupported(format!("failed to launch {}: {}", program, e)))?;

    if result.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&result.stderr);
        Err(StrategyError::network(format!(
            "{} exited with {}: {}",
            program,
            result.status,
            stderr.trim()
        )))
    }
}

#[async_trait]
impl DeliveryEnvironment for LocalEnvironment {
    fn supports(&self, primitive: Primitive) -> bool {
        match primitive {
            Primitive::BlobSave => true,
            Primitive::DirectSave => self.direct_save_command.is_some(),
            Primitive::OpenUrl | Primitive::FormSubmit => !self.open_command.is_empty(),
            Primitive::LegacySaveOrOpen => false,
        }
    }

    async fn save_blob(&self, filename: &str, data: Bytes) -> Result<Option<PathBuf>, StrategyError> {
        self.write_file(filename, data).await
    }

    async fn save_from_url(&self, url: &str, filename: &str) -> Result<Option<PathBuf>, StrategyError> {
        let command = self
            .direct_save_command
            .as_ref()
            .ok_or_else(|| StrategyError::unsupported("direct save is not configured"))?;

        let (path, file) = self.claim_path(filename).await?;
        drop(file);

        if let Err(e) = run_template(command, url, Some(&path)).await {
            discard_partial(&path).await;
            return Err(e);
        }
        Ok(Some(path))
    }

    async fn open_url(&self, url: &str) -> Result<(), StrategyError> {
        run_template(&self.open_command, url, None).await
    }
}
