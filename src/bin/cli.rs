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


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use transfer_core::download::progress::{format_bytes, format_eta, format_speed};
use transfer_core::download::RequestOutcome;
use transfer_core::file::safe_filename;
use transfer_core::media::MediaKind;
use transfer_core::resolver::VariantSelector;
use transfer_core::{detect, DeliveryProfile, EngineConfig, EnvironmentSignals, TransferManager, TransferState};

#[derive(Parser)]
#[command(name = "transfer-cli")]
#[command(about = "Fetchline CLI - Desktop media transfer tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a media URL with live progress
    Fetch {
        /// Media or page URL
        url: String,
        /// Preferred quality label (substring match)
        #[arg(short, long)]
        quality: Option<String>,
        /// Media kind: video or audio
        #[arg(short, long)]
        kind: Option<MediaKind>,
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Delivery profile to use instead of detection
        #[arg(short, long)]
        profile: Option<DeliveryProfile>,
        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the delivery profile for this host or a browser user agent
    Profile {
        /// Classify this user agent instead of the local host
        #[arg(short, long)]
        user_agent: Option<String>,
    },
    /// Print the safe filename for a title
    Filename {
        title: String,
        platform: String,
        quality: String,
        extension: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            url,
            quality,
            kind,
            output,
            profile,
            config,
        } => {
            let mut engine_config = match config {
                Some(path) => EngineConfig::load(&path)
                    .with_context(|| format!("Failed to load config {:?}", path))?,
                None => EngineConfig::default(),
            };
            if let Some(output) = output {
                engine_config.output_directory = output;
            }
            if profile.is_some() {
                engine_config.profile_override = profile;
            }

            fetch(&engine_config, &url, VariantSelector { quality, kind }).await?;
        }
        Commands::Profile { user_agent } => {
            let signals = match user_agent {
                Some(ua) => EnvironmentSignals::browser(ua),
                None => EnvironmentSignals::native_host(),
            };
            println!("{}", detect(&signals));
        }
        Commands::Filename {
            title,
            platform,
            quality,
            extension,
        } => {
            println!("{}", safe_filename(&title, &platform, &quality, &extension));
        }
    }

    Ok(())
}

async fn fetch(config: &EngineConfig, url: &str, selector: VariantSelector) -> anyhow::Result<()> {
    let manager = TransferManager::from_config(config).context("Failed to set up transfer engine")?;

    let id = match manager.submit(url, &selector).await? {
        RequestOutcome::Created(record) => {
            println!("Downloading {}", record.suggested_filename());
            record.id
        }
        RequestOutcome::DuplicateRejected { existing_id } => {
            bail!("Already downloading as {}", existing_id);
        }
    };

    loop {
        let record = match manager.get(&id).await {
            Some(record) => record,
            None => break,
        };
        if record.state.is_terminal() {
            break;
        }
        if record.state == TransferState::Active && record.bytes_transferred > 0 {
            let total = if record.bytes_total > 0 {
                format_bytes(record.bytes_total)
            } else {
                "?".to_string()
            };
            print!(
                "\r{:>3}%  {} / {}  {}  ETA {}   ",
                record.progress_percent,
                format_bytes(record.bytes_transferred),
                total,
                format_speed(record.throughput_bytes_per_sec),
                format_eta(record.eta_seconds)
            );
            std::io::stdout().flush()?;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    manager.run_to_completion().await;
    println!();

    let record = manager
        .get(&id)
        .await
        .context("Transfer record disappeared")?;

    match record.state {
        TransferState::Completed => {
            let via = record
                .delivered_by
                .map(|k| k.to_string())
                .unwrap_or_default();
            match &record.saved_path {
                Some(path) => println!("Saved {} via {}", path.display(), via),
                None => println!("Handed off via {}", via),
            }
            Ok(())
        }
        _ => bail!(
            "Download failed: {}",
            record.error_message.unwrap_or_else(|| record.state.to_string())
        ),
    }
}
