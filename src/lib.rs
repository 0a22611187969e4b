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


//! Media transfer engine
//!
//! Takes resolved media URLs, streams them with live progress, picks a
//! delivery strategy for the runtime it finds itself in and falls back when
//! one fails. A registry tracks every transfer and rejects duplicates.

pub mod capability;
pub mod config;
pub mod download;
pub mod environment;
pub mod error;
pub mod file;
pub mod media;
pub mod notify;
pub mod resolver;

pub use capability::{detect, DeliveryProfile, EnvironmentSignals};
pub use config::EngineConfig;
pub use download::{TransferManager, TransferMeta, TransferRecord, TransferState};
pub use error::{Result, TransferError};
