//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Ingestion coordinator
//!
//! This module orchestrates the per-report pipeline: registry update (always,
//! so signal tracking reflects every report), vital validation, duplicate
//! suppression, forwarding for the active bridge, and the connect/release
//! guidance returned to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{RelayConfig, VitalRangesConfig};
use crate::dedup::ReadingCache;
use crate::error::RelayResult;
use crate::forwarder::{CollectorClient, ForwardingQueue, HttpCollectorClient};
use crate::registry::BridgeRegistry;
use crate::types::{BridgeReport, IngestDecision, IngestStatus, OutboundRecord, Reading, RSSI_SENTINEL};

/// Relay-wide ingestion counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Reports received
    pub total_received: u64,

    /// Readings handed to the forwarding queue
    pub total_forwarded: u64,

    /// Readings accepted but not forwarded (reporting bridge not active)
    pub total_rejected: u64,

    /// Readings suppressed as duplicates
    pub total_duplicates: u64,

    /// Coordinator start time
    pub started_at: DateTime<Utc>,

    /// Timestamp of the most recent report
    pub last_report: Option<DateTime<Utc>>,
}

impl Default for CoordinatorStats {
    fn default() -> Self {
        Self {
            total_received: 0,
            total_forwarded: 0,
            total_rejected: 0,
            total_duplicates: 0,
            started_at: Utc::now(),
            last_report: None,
        }
    }
}

impl CoordinatorStats {
    /// Fraction of received reports that were forwarded, in percent
    pub fn success_rate(&self) -> f64 {
        let received = self.total_received.max(1) as f64;
        (self.total_forwarded as f64 / received * 10_000.0).round() / 100.0
    }
}

/// Orchestrates registry, dedup cache and forwarding queue per report
pub struct IngestCoordinator {
    registry: Arc<BridgeRegistry>,
    cache: Arc<ReadingCache>,
    queue: Arc<ForwardingQueue>,
    vitals: VitalRangesConfig,
    stats: RwLock<CoordinatorStats>,
}

impl IngestCoordinator {
    /// Build the full pipeline from configuration with the HTTP collector client
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        let client = Arc::new(HttpCollectorClient::new(&config.forwarder)?);
        Ok(Self::with_client(config, client))
    }

    /// Build the pipeline with a custom collector client
    pub fn with_client(config: RelayConfig, client: Arc<dyn CollectorClient>) -> Self {
        info!(
            "Starting ingest coordinator: {} ({})",
            config.name, config.environment
        );
        Self {
            registry: Arc::new(BridgeRegistry::new(config.handoff)),
            cache: Arc::new(ReadingCache::new(config.dedup)),
            queue: Arc::new(ForwardingQueue::new(config.forwarder, client)),
            vitals: config.vitals,
            stats: RwLock::new(CoordinatorStats::default()),
        }
    }

    /// Process one bridge report and return the decision for the caller
    pub async fn ingest(&self, report: BridgeReport) -> IngestDecision {
        {
            let mut stats = self.stats.write().await;
            stats.total_received += 1;
            stats.last_report = Some(Utc::now());
        }

        // The registry update always runs, even for readings rejected below:
        // signal tracking must reflect every report.
        let is_active = self.registry.update(&report).await;

        let (spo2, hr) = match (report.spo2, report.hr) {
            (Some(spo2), Some(hr)) => (spo2, hr),
            _ => {
                return self
                    .decision(
                        IngestStatus::Rejected {
                            reason: "Missing spo2 or hr".to_string(),
                        },
                        false,
                        &report.bridge_id,
                    )
                    .await;
            }
        };

        if !self.vitals.spo2_in_range(spo2) {
            return self
                .decision(
                    IngestStatus::Rejected {
                        reason: format!("SpO2 out of range: {}", spo2),
                    },
                    false,
                    &report.bridge_id,
                )
                .await;
        }
        if !self.vitals.hr_in_range(hr) {
            return self
                .decision(
                    IngestStatus::Rejected {
                        reason: format!("HR out of range: {}", hr),
                    },
                    false,
                    &report.bridge_id,
                )
                .await;
        }

        debug!(
            "[{}]{} SpO2 {}% HR {} RSSI {} dBm",
            report.bridge_id,
            if is_active { "*" } else { "" },
            spo2,
            hr,
            report.rssi.unwrap_or(RSSI_SENTINEL)
        );

        if self.cache.is_duplicate(spo2, hr).await {
            let mut stats = self.stats.write().await;
            stats.total_duplicates += 1;
            drop(stats);
            return self.decision(IngestStatus::Duplicate, false, &report.bridge_id).await;
        }

        let mut reading = Reading::new(
            spo2,
            hr,
            report.rssi.unwrap_or(RSSI_SENTINEL),
            report.distance.unwrap_or(0.0),
            &report.bridge_id,
        );

        // Only the active bridge's readings go upstream; everyone else still
        // feeds signal tracking and the cache.
        if is_active {
            let record = OutboundRecord {
                spo2,
                hr,
                rssi: reading.rssi,
                distance: reading.distance,
                bridge_id: report.bridge_id.clone(),
                signal_quality: report
                    .signal_quality
                    .clone()
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                device_mac: report.device_mac.clone(),
                timestamp: Utc::now(),
            };

            if self.queue.submit(record) {
                reading.forwarded = true;
                self.registry.note_forwarded(&report.bridge_id).await;
                let mut stats = self.stats.write().await;
                stats.total_forwarded += 1;
            } else {
                warn!(
                    "Forwarding queue full; reading from {} not forwarded",
                    report.bridge_id
                );
            }
        } else {
            self.registry.note_rejected(&report.bridge_id).await;
            let mut stats = self.stats.write().await;
            stats.total_rejected += 1;
        }

        let forwarded = reading.forwarded;
        self.cache.record(reading).await;

        self.decision(IngestStatus::Accepted, forwarded, &report.bridge_id)
            .await
    }

    /// Assemble a decision with live handoff guidance for the reporting bridge
    async fn decision(&self, status: IngestStatus, forwarded: bool, bridge_id: &str) -> IngestDecision {
        let active_bridge = self.registry.active_bridge_id().await;
        IngestDecision {
            status,
            forwarded,
            is_active_bridge: active_bridge.as_deref() == Some(bridge_id),
            active_bridge,
            should_connect: self.registry.should_connect(bridge_id).await,
            should_release: self.registry.should_release(bridge_id).await,
        }
    }

    /// Bridge registry handle, for external status endpoints
    pub fn registry(&self) -> &Arc<BridgeRegistry> {
        &self.registry
    }

    /// Recent-readings cache handle, for external status endpoints
    pub fn cache(&self) -> &Arc<ReadingCache> {
        &self.cache
    }

    /// Forwarding queue handle, for external status endpoints
    pub fn forwarder(&self) -> &Arc<ForwardingQueue> {
        &self.queue
    }

    /// Ingestion counters snapshot
    pub async fn stats(&self) -> CoordinatorStats {
        self.stats.read().await.clone()
    }

    /// Stop the forwarding drain task; the ingestion path stays usable
    pub fn shutdown(&self) {
        info!("Shutting down ingest coordinator");
        self.queue.shutdown();
    }
}
