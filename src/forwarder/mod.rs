//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Asynchronous forwarding queue
//!
//! This module decouples the ingestion path from the latency and
//! unreliability of the remote collector. Accepted records go into a bounded
//! queue; a single drain task delivers them in strict FIFO order with
//! bounded, linearly backed-off retries. Records are perishable real-time
//! telemetry, so exhausted retries drop the record and count the failure
//! rather than spilling to disk.

pub mod client;

pub use client::{CollectorClient, HttpCollectorClient};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ForwarderConfig;
use crate::types::OutboundRecord;

/// Forwarding statistics, eventually consistent with in-flight sends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwarderStats {
    /// Records acknowledged by the collector
    pub sent: u64,

    /// Records dropped after exhausting all attempts
    pub failed: u64,

    /// Individual failed delivery attempts
    pub retried: u64,

    /// Timestamp of the last acknowledged delivery
    pub last_success: Option<DateTime<Utc>>,

    /// Timestamp of the last exhausted record
    pub last_failure: Option<DateTime<Utc>>,
}

/// Bounded queue with a single background drain task
pub struct ForwardingQueue {
    config: ForwarderConfig,
    tx: mpsc::Sender<OutboundRecord>,
    stats: Arc<RwLock<ForwarderStats>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ForwardingQueue {
    /// Create the queue and spawn its drain task
    pub fn new(config: ForwarderConfig, client: Arc<dyn CollectorClient>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = Arc::new(RwLock::new(ForwarderStats::default()));

        tokio::spawn(Self::drain_loop(
            config.clone(),
            client,
            rx,
            shutdown_rx,
            Arc::clone(&stats),
        ));

        Self {
            config,
            tx,
            stats,
            shutdown_tx,
        }
    }

    /// Enqueue a record without blocking
    ///
    /// Returns false when the queue is full; the caller must treat that as
    /// "not forwarded" and must not retry synchronously.
    pub fn submit(&self, record: OutboundRecord) -> bool {
        self.tx.try_send(record).is_ok()
    }

    /// Records currently queued (excluding any record in flight)
    pub fn pending(&self) -> usize {
        self.config.queue_capacity - self.tx.capacity()
    }

    /// Statistics snapshot
    pub async fn stats(&self) -> ForwarderStats {
        self.stats.read().await.clone()
    }

    /// Signal the drain task to stop after its current in-flight record
    ///
    /// The remaining backlog is not drained.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn drain_loop(
        config: ForwarderConfig,
        client: Arc<dyn CollectorClient>,
        mut rx: mpsc::Receiver<OutboundRecord>,
        mut shutdown_rx: broadcast::Receiver<()>,
        stats: Arc<RwLock<ForwarderStats>>,
    ) {
        loop {
            tokio::select! {
                maybe_record = rx.recv() => match maybe_record {
                    // The in-flight record runs to completion here; shutdown
                    // is only observed between records.
                    Some(record) => Self::send_with_retry(&config, &client, record, &stats).await,
                    None => break,
                },
                _ = shutdown_rx.recv() => {
                    info!("Forwarding queue shutting down; backlog abandoned");
                    break;
                }
            }
        }
    }

    async fn send_with_retry(
        config: &ForwarderConfig,
        client: &Arc<dyn CollectorClient>,
        record: OutboundRecord,
        stats: &Arc<RwLock<ForwarderStats>>,
    ) {
        for attempt in 1..=config.max_attempts {
            match timeout(config.request_timeout(), client.deliver(&record)).await {
                Ok(Ok(())) => {
                    let mut stats = stats.write().await;
                    stats.sent += 1;
                    stats.last_success = Some(Utc::now());
                    debug!(
                        "Forwarded reading from {} (SpO2 {}%, HR {})",
                        record.bridge_id, record.spo2, record.hr
                    );
                    return;
                }
                Ok(Err(e)) => {
                    warn!("Delivery attempt {} failed: {}", attempt, e);
                }
                Err(_) => {
                    warn!("Delivery attempt {} timed out", attempt);
                }
            }

            {
                let mut stats = stats.write().await;
                stats.retried += 1;
            }

            // Linear backoff keeps worst-case latency bounded; vital-sign
            // freshness matters more than eventual delivery.
            if attempt < config.max_attempts {
                sleep(config.retry_delay() * attempt).await;
            }
        }

        let mut stats = stats.write().await;
        stats.failed += 1;
        stats.last_failure = Some(Utc::now());
        warn!(
            "Dropping record from {} after {} attempts",
            record.bridge_id, config.max_attempts
        );
    }
}
