//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Collector delivery client
//!
//! This module provides the trait seam between the forwarding queue and the
//! remote collector, plus the production HTTP implementation.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::ForwarderConfig;
use crate::error::{RelayError, RelayResult};
use crate::types::OutboundRecord;

/// Delivery seam for outbound records
#[async_trait]
pub trait CollectorClient: Send + Sync {
    /// Attempt delivery of one record; any error is treated as a failed attempt
    async fn deliver(&self, record: &OutboundRecord) -> RelayResult<()>;
}

/// HTTP collector client
///
/// POSTs the flattened record as JSON with the shared secret in the
/// `x-api-key` header. Any 2xx response counts as acknowledged.
pub struct HttpCollectorClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpCollectorClient {
    /// Build a client from the forwarder configuration
    pub fn new(config: &ForwarderConfig) -> RelayResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RelayError::configuration_with_source("Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CollectorClient for HttpCollectorClient {
    async fn deliver(&self, record: &OutboundRecord) -> RelayResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(record)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::timeout("Collector request timed out")
                } else {
                    RelayError::network_with_source("Collector request failed", e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RelayError::forwarding(format!(
                "Collector responded {}",
                status
            )))
        }
    }
}
