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


//! Remote byte sources
//!
//! A [`ByteSource`] opens a URL and hands back its body as a chunk stream
//! plus the advertised length. [`HttpByteSource`] does this with a streaming
//! `reqwest` GET; any non-2xx status is a `NetworkFailure`.

use crate::config::EngineConfig;
use crate::error::{Result, StrategyError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::Client;
use std::collections::HashMap;

/// Body chunks of an opened resource
pub type ChunkStream = BoxStream<'static, std::result::Result<Bytes, StrategyError>>;

/// An opened remote resource
pub struct RemoteBody {
    /// Content length advertised by the server, if any
    pub content_length: Option<u64>,

    /// Body chunks in order
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Something that can stream the bytes behind a URL
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn open(&self, url: &str) -> std::result::Result<RemoteBody, StrategyError>;
}

/// Streaming HTTP(S) source
#[derive(Debug, Clone)]
pub struct HttpByteSource {
    client: Client,
    request_headers: HashMap<String, String>,
}

impl HttpByteSource {
    /// Create a source with the configured timeout, user agent and headers
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            request_headers: config.request_headers.clone(),
        })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client, request_headers: HashMap<String, String>) -> Self {
        Self {
            client,
            request_headers,
        }
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn open(&self, url: &str) -> std::result::Result<RemoteBody, StrategyError> {
        let mut request = self.client.get(url).header("Accept", "*/*");
        for (key, value) in &self.request_headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StrategyError::NetworkFailure {
                message: format!("HTTP {} from {}", status, url),
                status_code: Some(status.as_u16()),
            });
        }

        let content_length = response.content_length().filter(|len| *len > 0);
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StrategyError::from))
            .boxed();

        Ok(RemoteBody {
            content_length,
            chunks,
        })
    }
}
