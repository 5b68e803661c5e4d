//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Core data types for the vital-sign relay
//!
//! This module provides the wire-facing report and decision types exchanged
//! with bridges, plus the reading and outbound record types that flow through
//! the relay pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RSSI sentinel used when a report carries no signal value (weakest possible)
pub const RSSI_SENTINEL: i32 = -100;

/// A single report from a radio bridge
///
/// Every field except the bridge identifier is optional on the wire; missing
/// fields are treated as weak/neutral rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeReport {
    /// Reporting bridge identifier (wire field `device`)
    #[serde(rename = "device")]
    pub bridge_id: String,

    /// Blood oxygen saturation in percent
    #[serde(default)]
    pub spo2: Option<u16>,

    /// Heart rate in beats per minute
    #[serde(default)]
    pub hr: Option<u16>,

    /// Measured signal strength in dBm
    #[serde(default)]
    pub rssi: Option<i32>,

    /// Estimated distance to the sensor in meters
    #[serde(default)]
    pub distance: Option<f64>,

    /// Qualitative signal label reported by the bridge
    #[serde(default)]
    pub signal_quality: Option<String>,

    /// Qualitative signal trend reported by the bridge
    #[serde(default)]
    pub signal_trend: Option<String>,

    /// Whether the bridge currently holds a live connection to the sensor
    #[serde(default)]
    pub is_connected: bool,

    /// Seconds the current connection has been held
    #[serde(default)]
    pub connection_time: u64,

    /// Raw packets received from the sensor over this connection
    #[serde(default)]
    pub ble_packets: u64,

    /// MAC address of the monitored sensor, if known
    #[serde(default)]
    pub device_mac: String,
}

impl BridgeReport {
    /// Create a minimal report carrying only identity and signal state
    pub fn status_only(bridge_id: impl Into<String>, rssi: i32, is_connected: bool) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            spo2: None,
            hr: None,
            rssi: Some(rssi),
            distance: None,
            signal_quality: None,
            signal_trend: None,
            is_connected,
            connection_time: 0,
            ble_packets: 0,
            device_mac: String::new(),
        }
    }
}

/// Outcome of ingesting a single report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestStatus {
    /// Reading accepted into the pipeline
    Accepted,

    /// Reading suppressed as a near-identical repeat
    Duplicate,

    /// Reading rejected at the validation boundary
    Rejected {
        /// Human-readable rejection reason
        reason: String,
    },
}

/// Decision returned to the reporting bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDecision {
    /// Acceptance outcome
    #[serde(flatten)]
    pub status: IngestStatus,

    /// Whether the reading was handed to the forwarding queue
    pub forwarded: bool,

    /// Whether the reporting bridge is the currently active bridge
    pub is_active_bridge: bool,

    /// Identifier of the currently active bridge, if any
    pub active_bridge: Option<String>,

    /// Whether the reporting bridge should attempt a sensor connection
    pub should_connect: bool,

    /// Whether the reporting bridge should release its sensor connection
    pub should_release: bool,
}

/// One accepted vital-sign reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// Reading identifier
    pub id: Uuid,

    /// Blood oxygen saturation in percent
    pub spo2: u16,

    /// Heart rate in beats per minute
    pub hr: u16,

    /// Signal strength at acceptance time in dBm
    pub rssi: i32,

    /// Estimated distance to the sensor in meters
    pub distance: f64,

    /// Bridge that sourced the reading
    pub bridge_id: String,

    /// Acceptance timestamp
    pub timestamp: DateTime<Utc>,

    /// Whether the reading was handed to the forwarding queue
    pub forwarded: bool,
}

impl Reading {
    /// Create a new reading from validated report fields
    pub fn new(spo2: u16, hr: u16, rssi: i32, distance: f64, bridge_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            spo2,
            hr,
            rssi,
            distance,
            bridge_id: bridge_id.into(),
            timestamp: Utc::now(),
            forwarded: false,
        }
    }
}

/// Flattened payload enqueued for delivery to the remote collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundRecord {
    /// Blood oxygen saturation in percent
    pub spo2: u16,

    /// Heart rate in beats per minute
    pub hr: u16,

    /// Signal strength in dBm
    pub rssi: i32,

    /// Estimated distance to the sensor in meters
    pub distance: f64,

    /// Bridge that sourced the reading
    pub bridge_id: String,

    /// Qualitative signal label at enqueue time
    pub signal_quality: String,

    /// MAC address of the monitored sensor
    pub device_mac: String,

    /// Forwarding timestamp
    pub timestamp: DateTime<Utc>,
}
