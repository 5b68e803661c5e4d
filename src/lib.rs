//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Multi-bridge coordination core for wearable vital-sign telemetry
//!
//! Several independent radio bridges observe the same mobile sensor and
//! report readings to this coordinator. The crate selects and smoothly hands
//! off a single active bridge as the sensor moves, suppresses back-to-back
//! duplicate readings, and relays accepted readings to a remote collector
//! asynchronously with bounded retries.
//!
//! The HTTP ingestion endpoints, persistence, dashboards and alerting live
//! outside this crate; they call [`IngestCoordinator::ingest`] with a
//! [`BridgeReport`] and serve the returned [`IngestDecision`] back to the
//! bridge. Active-bridge consistency is per process only: running multiple
//! coordinator instances against the same bridges is unsupported.

pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod forwarder;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use config::{DedupConfig, ForwarderConfig, HandoffConfig, RelayConfig, VitalRangesConfig};
pub use coordinator::{CoordinatorStats, IngestCoordinator};
pub use dedup::{CacheStats, ReadingCache};
pub use error::{RelayError, RelayResult};
pub use forwarder::{CollectorClient, ForwarderStats, ForwardingQueue, HttpCollectorClient};
pub use registry::{BridgeRegistry, BridgeSnapshot, RegistrySnapshot};
pub use types::{BridgeReport, IngestDecision, IngestStatus, OutboundRecord, Reading};

/// Relay version information
pub const RELAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Relay name
pub const RELAY_NAME: &str = "vitals-relay";
