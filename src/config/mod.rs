//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Configuration for the vital-sign relay
//!
//! This module provides the relay configuration structure and per-component
//! sections. All tuning constants are supplied at startup and treated as
//! immutable thereafter.

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RelayConfig {
    /// Relay instance name
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    /// Environment (development, staging, production)
    #[validate(length(min = 1, max = 20))]
    pub environment: String,

    /// Active-bridge selection configuration
    #[validate]
    pub handoff: HandoffConfig,

    /// Deduplication configuration
    #[validate]
    pub dedup: DedupConfig,

    /// Collector forwarding configuration
    #[validate]
    pub forwarder: ForwarderConfig,

    /// Physiological validation ranges
    pub vitals: VitalRangesConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: "vitals-relay".to_string(),
            environment: "development".to_string(),
            handoff: HandoffConfig::default(),
            dedup: DedupConfig::default(),
            forwarder: ForwarderConfig::default(),
            vitals: VitalRangesConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from file, layered with `RELAY_`-prefixed environment variables
    pub fn from_file(path: &PathBuf) -> RelayResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .add_source(config::Environment::with_prefix("RELAY"))
            .build()
            .map_err(|e| RelayError::configuration_with_source("Failed to load configuration", e))?;

        let relay_config: RelayConfig = config.try_deserialize().map_err(|e| {
            RelayError::configuration_with_source("Failed to deserialize configuration", e)
        })?;

        relay_config.validate_config()?;
        Ok(relay_config)
    }

    /// Load configuration from a JSON string
    pub fn from_str(content: &str) -> RelayResult<Self> {
        let config: RelayConfig = serde_json::from_str(content).map_err(|e| {
            RelayError::serialization_with_source("Failed to deserialize configuration", e)
        })?;

        config.validate_config()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate_config(&self) -> RelayResult<()> {
        self.validate()
            .map_err(|e| RelayError::validation_with_source("Configuration validation failed", e))?;

        if self.vitals.spo2_min >= self.vitals.spo2_max {
            return Err(RelayError::validation("spo2_min must be below spo2_max"));
        }
        if self.vitals.hr_min >= self.vitals.hr_max {
            return Err(RelayError::validation("hr_min must be below hr_max"));
        }

        Ok(())
    }
}

/// Active-bridge selection and handoff configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HandoffConfig {
    /// Minimum effective-signal advantage required to qualify for handoff, in dB
    pub threshold_db: f64,

    /// Softer advantage the active bridge needs before a standby bridge releases, in dB
    pub release_margin_db: f64,

    /// Multiplier applied to the trend score when computing effective signal
    pub trend_multiplier: f64,

    /// Minimum continuous qualification time before a handoff executes, in milliseconds
    #[validate(range(min = 1))]
    pub dwell_ms: u64,

    /// Silence after which a bridge is considered offline, in milliseconds
    #[validate(range(min = 1))]
    pub bridge_timeout_ms: u64,

    /// Capacity of the per-bridge RSSI sample ring
    #[validate(range(min = 1, max = 1000))]
    pub signal_history_size: usize,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            threshold_db: 8.0,
            release_margin_db: 3.0,
            trend_multiplier: 5.0,
            dwell_ms: 3000,
            bridge_timeout_ms: 10_000,
            signal_history_size: 20,
        }
    }
}

impl HandoffConfig {
    /// Handoff dwell time as a duration
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    /// Bridge offline timeout as a duration
    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_timeout_ms)
    }
}

/// Deduplication configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DedupConfig {
    /// Number of most recent readings compared against an incoming reading
    #[validate(range(min = 1, max = 100))]
    pub window: usize,

    /// Absolute SpO2 tolerance for a match (0 requires exact equality)
    pub spo2_tolerance: u16,

    /// Absolute heart-rate tolerance for a match (0 requires exact equality)
    pub hr_tolerance: u16,

    /// Capacity of the recent-readings ring
    #[validate(range(min = 1, max = 10_000))]
    pub cache_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        // The sensor emits at a fixed cadence with natural micro-variation;
        // only back-to-back identical packets are treated as resends.
        Self {
            window: 2,
            spo2_tolerance: 0,
            hr_tolerance: 0,
            cache_size: 200,
        }
    }
}

/// Collector forwarding configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForwarderConfig {
    /// Collector endpoint URL
    #[validate(length(min = 1))]
    pub endpoint: String,

    /// Shared secret sent in the `x-api-key` header
    pub api_key: String,

    /// Bounded queue capacity; a full queue is the backpressure signal
    #[validate(range(min = 1, max = 100_000))]
    pub queue_capacity: usize,

    /// Delivery attempts per record before it is dropped
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    /// Base inter-attempt delay in milliseconds; actual delay grows linearly
    /// with the attempt number so worst-case latency stays bounded
    pub retry_delay_ms: u64,

    /// Per-attempt delivery timeout in milliseconds
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/data".to_string(),
            api_key: String::new(),
            queue_capacity: 100,
            max_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_ms: 5000,
        }
    }
}

impl ForwarderConfig {
    /// Base inter-attempt delay as a duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Per-attempt delivery timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Physiological validation ranges for incoming vitals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalRangesConfig {
    /// Minimum accepted SpO2 in percent
    pub spo2_min: u16,

    /// Maximum accepted SpO2 in percent
    pub spo2_max: u16,

    /// Minimum accepted heart rate in bpm
    pub hr_min: u16,

    /// Maximum accepted heart rate in bpm
    pub hr_max: u16,
}

impl Default for VitalRangesConfig {
    fn default() -> Self {
        Self {
            spo2_min: 60,
            spo2_max: 100,
            hr_min: 30,
            hr_max: 220,
        }
    }
}

impl VitalRangesConfig {
    /// Check an SpO2 value against the accepted range
    pub fn spo2_in_range(&self, spo2: u16) -> bool {
        (self.spo2_min..=self.spo2_max).contains(&spo2)
    }

    /// Check a heart-rate value against the accepted range
    pub fn hr_in_range(&self, hr: u16) -> bool {
        (self.hr_min..=self.hr_max).contains(&hr)
    }
}
