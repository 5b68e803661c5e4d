//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Per-bridge state tracking
//!
//! This module provides the mutable state kept for each known bridge: signal
//! history with a recency-weighted average and trend score, traffic counters,
//! and connectivity flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::RSSI_SENTINEL;

/// State kept for one known bridge
#[derive(Debug, Clone)]
pub struct BridgeState {
    /// Bridge identifier
    pub bridge_id: String,

    /// First report timestamp
    pub first_seen: DateTime<Utc>,

    /// Most recent report timestamp
    pub last_seen: DateTime<Utc>,

    /// Monotonic instant of the most recent report, used for timeout math
    pub last_seen_at: Instant,

    /// Most recently reported RSSI in dBm
    pub current_rssi: i32,

    /// Recency-weighted average RSSI in dBm
    pub avg_rssi: f64,

    /// Bounded ring of recent RSSI samples, oldest first
    pub rssi_history: VecDeque<i32>,

    /// Qualitative signal label from the bridge
    pub signal_quality: String,

    /// Qualitative signal trend from the bridge
    pub signal_trend: String,

    /// Estimated distance to the sensor in meters
    pub distance: f64,

    /// Reports received from this bridge
    pub packets_received: u64,

    /// Readings from this bridge handed to the forwarding queue
    pub packets_forwarded: u64,

    /// Readings from this bridge accepted but not forwarded (bridge not active)
    pub packets_rejected: u64,

    /// Raw sensor packets the bridge reports having relayed
    pub ble_packets: u64,

    /// Whether the bridge currently holds a live sensor connection
    pub is_connected: bool,

    /// Whether this is the currently selected active bridge
    pub is_active: bool,

    /// Seconds the current sensor connection has been held
    pub connection_time: u64,

    /// MAC address of the monitored sensor, if reported
    pub device_mac: String,
}

impl BridgeState {
    /// Create state for a newly seen bridge
    pub fn new(bridge_id: impl Into<String>) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            last_seen_at: Instant::now(),
            current_rssi: RSSI_SENTINEL,
            avg_rssi: RSSI_SENTINEL as f64,
            rssi_history: VecDeque::new(),
            signal_quality: "UNKNOWN".to_string(),
            signal_trend: "stable".to_string(),
            distance: 0.0,
            packets_received: 0,
            packets_forwarded: 0,
            packets_rejected: 0,
            ble_packets: 0,
            is_connected: false,
            is_active: false,
            connection_time: 0,
            device_mac: String::new(),
        }
    }

    /// Append a signal sample and recompute the weighted average
    ///
    /// Weights grow linearly with recency (`1 + i * 0.5`), so a bridge the
    /// sensor is walking toward overtakes one it is walking away from within
    /// a few samples. Below three samples the average is the raw value.
    pub fn record_rssi(&mut self, rssi: i32, capacity: usize) {
        self.rssi_history.push_back(rssi);
        while self.rssi_history.len() > capacity {
            self.rssi_history.pop_front();
        }

        self.current_rssi = rssi;

        if self.rssi_history.len() >= 3 {
            let mut weighted_sum = 0.0;
            let mut weight_sum = 0.0;
            for (i, sample) in self.rssi_history.iter().enumerate() {
                let weight = 1.0 + i as f64 * 0.5;
                weighted_sum += *sample as f64 * weight;
                weight_sum += weight;
            }
            self.avg_rssi = weighted_sum / weight_sum;
        } else {
            self.avg_rssi = rssi as f64;
        }
    }

    /// Trend score in [-1, 1]: positive when the signal is improving
    ///
    /// Difference of the last-three and previous-three sample means,
    /// normalized by 10 dB and clamped. Zero until five samples exist.
    pub fn trend_score(&self) -> f64 {
        let n = self.rssi_history.len();
        if n < 5 {
            return 0.0;
        }

        let mean = |range: std::ops::Range<usize>| -> f64 {
            let len = range.len();
            let sum: i64 = self.rssi_history.range(range).map(|r| *r as i64).sum();
            sum as f64 / len as f64
        };

        let recent = mean(n - 3..n);
        let older = mean(n.saturating_sub(6)..n - 3);
        let diff = recent - older;

        (diff / 10.0).clamp(-1.0, 1.0)
    }

    /// Weighted average adjusted by the trend bonus/penalty
    pub fn effective_rssi(&self, trend_multiplier: f64) -> f64 {
        self.avg_rssi + self.trend_score() * trend_multiplier
    }

    /// Whether the bridge reported within the offline timeout
    pub fn is_online(&self, timeout: Duration, now: Instant) -> bool {
        now.duration_since(self.last_seen_at) < timeout
    }

    /// Read-only serializable view of this bridge
    pub fn snapshot(&self) -> BridgeSnapshot {
        BridgeSnapshot {
            bridge_id: self.bridge_id.clone(),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            current_rssi: self.current_rssi,
            avg_rssi: self.avg_rssi.round() as i32,
            signal_quality: self.signal_quality.clone(),
            signal_trend: self.signal_trend.clone(),
            trend_score: (self.trend_score() * 100.0).round() / 100.0,
            distance: (self.distance * 100.0).round() / 100.0,
            packets_received: self.packets_received,
            packets_forwarded: self.packets_forwarded,
            packets_rejected: self.packets_rejected,
            ble_packets: self.ble_packets,
            is_connected: self.is_connected,
            is_active: self.is_active,
            connection_time: self.connection_time,
            device_mac: self.device_mac.clone(),
        }
    }
}

/// Read-only serializable view of a bridge's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSnapshot {
    /// Bridge identifier
    pub bridge_id: String,

    /// First report timestamp
    pub first_seen: DateTime<Utc>,

    /// Most recent report timestamp
    pub last_seen: DateTime<Utc>,

    /// Most recently reported RSSI in dBm
    pub current_rssi: i32,

    /// Recency-weighted average RSSI in dBm
    pub avg_rssi: i32,

    /// Qualitative signal label
    pub signal_quality: String,

    /// Qualitative signal trend
    pub signal_trend: String,

    /// Trend score in [-1, 1]
    pub trend_score: f64,

    /// Estimated distance in meters
    pub distance: f64,

    /// Reports received
    pub packets_received: u64,

    /// Readings forwarded
    pub packets_forwarded: u64,

    /// Readings accepted but not forwarded
    pub packets_rejected: u64,

    /// Raw sensor packets relayed
    pub ble_packets: u64,

    /// Live sensor connection flag
    pub is_connected: bool,

    /// Active bridge flag
    pub is_active: bool,

    /// Connection hold time in seconds
    pub connection_time: u64,

    /// Sensor MAC address
    pub device_mac: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_is_raw_below_three_samples() {
        let mut state = BridgeState::new("BRIDGE_A");
        state.record_rssi(-70, 20);
        assert_eq!(state.avg_rssi, -70.0);
        state.record_rssi(-50, 20);
        assert_eq!(state.avg_rssi, -50.0);
    }

    #[test]
    fn test_weighted_average_favors_recent_samples() {
        let mut state = BridgeState::new("BRIDGE_A");
        for _ in 0..10 {
            state.record_rssi(-90, 20);
        }
        for _ in 0..3 {
            state.record_rssi(-50, 20);
        }
        // Recent strong samples outweigh the older weak ones
        assert!(state.avg_rssi > -80.0);
        assert!(state.avg_rssi < -50.0);
    }

    #[test]
    fn test_ring_is_bounded() {
        let mut state = BridgeState::new("BRIDGE_A");
        for i in 0..50 {
            state.record_rssi(-100 + i, 20);
        }
        assert_eq!(state.rssi_history.len(), 20);
        assert_eq!(*state.rssi_history.back().unwrap(), -51);
    }

    #[test]
    fn test_trend_score_zero_below_five_samples() {
        let mut state = BridgeState::new("BRIDGE_A");
        for _ in 0..4 {
            state.record_rssi(-60, 20);
        }
        assert_eq!(state.trend_score(), 0.0);
    }

    #[test]
    fn test_trend_score_improving_signal() {
        let mut state = BridgeState::new("BRIDGE_A");
        for rssi in [-90, -90, -90, -70, -70, -70] {
            state.record_rssi(rssi, 20);
        }
        // recent mean -70, older mean -90, diff 20 -> clamped to 1.0
        assert_eq!(state.trend_score(), 1.0);
    }

    #[test]
    fn test_trend_score_deteriorating_signal() {
        let mut state = BridgeState::new("BRIDGE_A");
        for rssi in [-60, -60, -60, -65, -65, -65] {
            state.record_rssi(rssi, 20);
        }
        assert_eq!(state.trend_score(), -0.5);
    }

    #[test]
    fn test_online_window() {
        let state = BridgeState::new("BRIDGE_A");
        let now = Instant::now();
        assert!(state.is_online(Duration::from_secs(10), now));
        assert!(!state.is_online(Duration::from_millis(0), now + Duration::from_millis(1)));
    }
}
