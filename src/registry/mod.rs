//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Bridge registry and active-bridge selection
//!
//! This module tracks one [`BridgeState`] per known bridge and decides, after
//! every report, which bridge should be active. Handoffs are guarded by a
//! signal-advantage threshold and a dwell-time hysteresis so transient noise
//! never flips the selection back and forth.

pub mod state;

pub use state::{BridgeSnapshot, BridgeState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::HandoffConfig;
use crate::types::{BridgeReport, RSSI_SENTINEL};

/// A bridge competing to become active
#[derive(Debug, Clone)]
struct HandoffCandidate {
    /// Candidate bridge identifier
    bridge_id: String,

    /// Monotonic instant the candidate first qualified
    since: Instant,
}

/// Registry state behind the coarse lock
///
/// Handoff evaluation must see a consistent view of all bridges, so every
/// mutation happens under one write guard.
#[derive(Debug, Default)]
struct RegistryInner {
    bridges: HashMap<String, BridgeState>,
    active_bridge_id: Option<String>,
    candidate: Option<HandoffCandidate>,
    handoffs: u64,
    last_handoff: Option<DateTime<Utc>>,
}

/// Registry of known bridges and the active-bridge selection state machine
pub struct BridgeRegistry {
    config: HandoffConfig,
    inner: RwLock<RegistryInner>,
}

impl BridgeRegistry {
    /// Create an empty registry
    pub fn new(config: HandoffConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Apply a bridge report and re-evaluate the active selection
    ///
    /// Never fails: missing fields fall back to weak/neutral defaults.
    /// Returns whether the reporting bridge is the active bridge after
    /// evaluation.
    pub async fn update(&self, report: &BridgeReport) -> bool {
        let mut inner = self.inner.write().await;
        let now = Instant::now();

        if !inner.bridges.contains_key(&report.bridge_id) {
            info!("New bridge registered: {}", report.bridge_id);
        }

        let capacity = self.config.signal_history_size;
        let bridge = inner
            .bridges
            .entry(report.bridge_id.clone())
            .or_insert_with(|| BridgeState::new(&report.bridge_id));
        bridge.last_seen = Utc::now();
        bridge.last_seen_at = now;
        bridge.packets_received += 1;

        bridge.record_rssi(report.rssi.unwrap_or(RSSI_SENTINEL), capacity);
        if let Some(quality) = &report.signal_quality {
            bridge.signal_quality = quality.clone();
        }
        if let Some(trend) = &report.signal_trend {
            bridge.signal_trend = trend.clone();
        }
        if let Some(distance) = report.distance {
            bridge.distance = distance;
        }

        bridge.is_connected = report.is_connected;
        bridge.connection_time = report.connection_time;
        bridge.ble_packets = report.ble_packets;
        if !report.device_mac.is_empty() {
            bridge.device_mac = report.device_mac.clone();
        }

        self.evaluate_handoff(&mut inner, now);

        let is_active = inner.active_bridge_id.as_deref() == Some(report.bridge_id.as_str());
        if let Some(bridge) = inner.bridges.get_mut(&report.bridge_id) {
            bridge.is_active = is_active;
        }
        is_active
    }

    /// Active-bridge selection state machine, run under the write guard
    fn evaluate_handoff(&self, inner: &mut RegistryInner, now: Instant) {
        let timeout = self.config.bridge_timeout();

        // Bridges eligible for selection: recently seen and holding a live
        // sensor connection.
        let online: Vec<String> = inner
            .bridges
            .values()
            .filter(|b| b.is_online(timeout, now) && b.is_connected)
            .map(|b| b.bridge_id.clone())
            .collect();

        if online.is_empty() {
            if let Some(active) = inner.active_bridge_id.take() {
                warn!("Active bridge {} lost - no eligible replacement", active);
                if let Some(bridge) = inner.bridges.get_mut(&active) {
                    bridge.is_active = false;
                }
            }
            inner.candidate = None;
            return;
        }

        // No active bridge, or the active one fell out of the eligible set:
        // select the best available immediately.
        let active_eligible = inner
            .active_bridge_id
            .as_ref()
            .map(|id| online.contains(id))
            .unwrap_or(false);
        if !active_eligible {
            // Any dwell timer was measured against the previous active bridge
            // and must not carry over to the replacement.
            inner.candidate = None;
            if let Some(old) = inner.active_bridge_id.take() {
                if let Some(bridge) = inner.bridges.get_mut(&old) {
                    bridge.is_active = false;
                }
            }
            let best_id = online
                .iter()
                .max_by(|a, b| {
                    inner.bridges[a.as_str()]
                        .avg_rssi
                        .total_cmp(&inner.bridges[b.as_str()].avg_rssi)
                })
                .cloned();
            if let Some(best_id) = best_id {
                info!(
                    "Active bridge selected: {} ({:.0} dBm avg)",
                    best_id, inner.bridges[best_id.as_str()].avg_rssi
                );
                if let Some(bridge) = inner.bridges.get_mut(&best_id) {
                    bridge.is_active = true;
                }
                inner.active_bridge_id = Some(best_id);
            }
            return;
        }

        let active_id = match inner.active_bridge_id.clone() {
            Some(id) => id,
            None => return,
        };
        let multiplier = self.config.trend_multiplier;
        let current_effective = inner.bridges[active_id.as_str()].effective_rssi(multiplier);

        // Find the strongest challenger whose effective signal clears the
        // active bridge's by the handoff threshold.
        let mut best_candidate: Option<String> = None;
        let mut best_candidate_rssi = inner.bridges[active_id.as_str()].avg_rssi;

        for id in &online {
            if *id == active_id {
                continue;
            }
            let effective = inner.bridges[id.as_str()].effective_rssi(multiplier);
            if effective > current_effective + self.config.threshold_db
                && (best_candidate.is_none() || effective > best_candidate_rssi)
            {
                best_candidate = Some(id.clone());
                best_candidate_rssi = effective;
            }
        }

        match best_candidate {
            Some(candidate_id) => {
                let qualified_since = match &inner.candidate {
                    Some(c) if c.bridge_id == candidate_id => Some(c.since),
                    _ => None,
                };

                match qualified_since {
                    Some(since) if now.duration_since(since) >= self.config.dwell() => {
                        // Dwell time satisfied: execute the handoff.
                        if let Some(bridge) = inner.bridges.get_mut(&active_id) {
                            bridge.is_active = false;
                        }
                        if let Some(bridge) = inner.bridges.get_mut(&candidate_id) {
                            bridge.is_active = true;
                        }
                        info!(
                            "Handoff: {} -> {} ({:.0} -> {:.0} dBm avg)",
                            active_id,
                            candidate_id,
                            inner.bridges[active_id.as_str()].avg_rssi,
                            inner.bridges[candidate_id.as_str()].avg_rssi
                        );
                        inner.active_bridge_id = Some(candidate_id);
                        inner.candidate = None;
                        inner.handoffs += 1;
                        inner.last_handoff = Some(Utc::now());
                    }
                    Some(_) => {
                        // Still dwelling; leave the candidate timer running.
                    }
                    None => {
                        debug!(
                            "Handoff candidate: {} ({:.0} dBm avg)",
                            candidate_id, inner.bridges[candidate_id.as_str()].avg_rssi
                        );
                        inner.candidate = Some(HandoffCandidate {
                            bridge_id: candidate_id,
                            since: now,
                        });
                    }
                }
            }
            None => {
                inner.candidate = None;
            }
        }
    }

    /// Clear the active designation if the active bridge went silent
    ///
    /// Evaluation normally runs on report arrival; this keeps query results
    /// honest when the active bridge simply stops reporting and nothing else
    /// triggers an update.
    async fn expire_stale_active(&self) {
        let needs_expiry = {
            let inner = self.inner.read().await;
            match &inner.active_bridge_id {
                Some(id) => inner
                    .bridges
                    .get(id)
                    .map(|b| !b.is_online(self.config.bridge_timeout(), Instant::now()))
                    .unwrap_or(true),
                None => false,
            }
        };

        if needs_expiry {
            let mut inner = self.inner.write().await;
            self.evaluate_handoff(&mut inner, Instant::now());
        }
    }

    /// Identifier of the currently active bridge, if any
    pub async fn active_bridge_id(&self) -> Option<String> {
        self.expire_stale_active().await;
        self.inner.read().await.active_bridge_id.clone()
    }

    /// Whether the given bridge should attempt a sensor connection
    ///
    /// True when no bridge is active, when the asker is the active bridge, or
    /// when the asker's average signal already clears the active bridge's by
    /// the handoff threshold. The last case lets a clearly superior bridge
    /// start connecting before its dwell time elapses; it does not flip the
    /// active designation, and two bridges may briefly attempt at once.
    pub async fn should_connect(&self, bridge_id: &str) -> bool {
        self.expire_stale_active().await;
        let inner = self.inner.read().await;

        let active_id = match &inner.active_bridge_id {
            None => return true,
            Some(id) if id == bridge_id => return true,
            Some(id) => id,
        };

        match (inner.bridges.get(bridge_id), inner.bridges.get(active_id)) {
            (Some(candidate), Some(active)) => {
                candidate.avg_rssi > active.avg_rssi + self.config.threshold_db
            }
            _ => false,
        }
    }

    /// Whether the given bridge should release its sensor connection
    ///
    /// Uses a softer margin than promotion, so a standby bridge does not
    /// release and re-acquire in a loop around the handoff threshold.
    pub async fn should_release(&self, bridge_id: &str) -> bool {
        self.expire_stale_active().await;
        let inner = self.inner.read().await;

        let active_id = match &inner.active_bridge_id {
            Some(id) if id != bridge_id => id,
            _ => return false,
        };

        match (inner.bridges.get(bridge_id), inner.bridges.get(active_id)) {
            (Some(this), Some(active)) => {
                active.avg_rssi > this.avg_rssi + self.config.release_margin_db
            }
            _ => false,
        }
    }

    /// Record that a reading from this bridge was handed to the forwarder
    pub async fn note_forwarded(&self, bridge_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(bridge) = inner.bridges.get_mut(bridge_id) {
            bridge.packets_forwarded += 1;
        }
    }

    /// Record that a reading from this bridge was accepted but not forwarded
    pub async fn note_rejected(&self, bridge_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(bridge) = inner.bridges.get_mut(bridge_id) {
            bridge.packets_rejected += 1;
        }
    }

    /// Snapshot of a single bridge
    pub async fn bridge_snapshot(&self, bridge_id: &str) -> Option<BridgeSnapshot> {
        let inner = self.inner.read().await;
        inner.bridges.get(bridge_id).map(|b| b.snapshot())
    }

    /// Count of bridges seen within the offline timeout
    pub async fn online_count(&self) -> usize {
        let inner = self.inner.read().await;
        let now = Instant::now();
        inner
            .bridges
            .values()
            .filter(|b| b.is_online(self.config.bridge_timeout(), now))
            .count()
    }

    /// Full registry snapshot for status reporting
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.expire_stale_active().await;
        let inner = self.inner.read().await;
        let now = Instant::now();

        RegistrySnapshot {
            active_bridge: inner.active_bridge_id.clone(),
            total_bridges: inner.bridges.len(),
            online_bridges: inner
                .bridges
                .values()
                .filter(|b| b.is_online(self.config.bridge_timeout(), now))
                .count(),
            handoff_candidate: inner.candidate.as_ref().map(|c| c.bridge_id.clone()),
            handoffs: inner.handoffs,
            last_handoff: inner.last_handoff,
            bridges: inner
                .bridges
                .iter()
                .map(|(id, b)| (id.clone(), b.snapshot()))
                .collect(),
        }
    }
}

/// Read-only view of the whole registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Identifier of the active bridge, if any
    pub active_bridge: Option<String>,

    /// Total bridges ever seen
    pub total_bridges: usize,

    /// Bridges seen within the offline timeout
    pub online_bridges: usize,

    /// Bridge currently dwelling toward a handoff, if any
    pub handoff_candidate: Option<String>,

    /// Handoffs executed since startup
    pub handoffs: u64,

    /// Timestamp of the most recent handoff
    pub last_handoff: Option<DateTime<Utc>>,

    /// Per-bridge snapshots
    pub bridges: HashMap<String, BridgeSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    fn fast_config() -> HandoffConfig {
        HandoffConfig {
            dwell_ms: 300,
            bridge_timeout_ms: 5000,
            ..HandoffConfig::default()
        }
    }

    fn report(bridge_id: &str, rssi: i32, connected: bool) -> BridgeReport {
        BridgeReport::status_only(bridge_id, rssi, connected)
    }

    async fn active_flags(registry: &BridgeRegistry) -> usize {
        registry
            .snapshot()
            .await
            .bridges
            .values()
            .filter(|b| b.is_active)
            .count()
    }

    #[tokio::test]
    async fn test_first_connected_bridge_becomes_active() {
        let registry = BridgeRegistry::new(fast_config());

        assert!(!registry.update(&report("A", -60, false)).await);
        assert_eq!(registry.active_bridge_id().await, None);

        assert!(registry.update(&report("A", -60, true)).await);
        assert_eq!(registry.active_bridge_id().await, Some("A".to_string()));
    }

    #[tokio::test]
    async fn test_best_signal_selected_when_none_active() {
        let registry = BridgeRegistry::new(fast_config());

        registry.update(&report("A", -90, true)).await;
        registry.update(&report("B", -60, true)).await;

        // A was selected first and keeps the designation; drop it offline by
        // disconnecting and the stronger B takes over immediately.
        assert_eq!(registry.active_bridge_id().await, Some("A".to_string()));
        registry.update(&report("A", -90, false)).await;
        assert_eq!(registry.active_bridge_id().await, Some("B".to_string()));
    }

    #[tokio::test]
    async fn test_at_most_one_active_bridge() {
        let registry = BridgeRegistry::new(fast_config());

        for i in 0..40 {
            let rssi = -90 + (i * 7) % 50;
            registry.update(&report("A", rssi, true)).await;
            registry.update(&report("B", -95 + (i * 11) % 60, i % 3 != 0)).await;
            registry.update(&report("C", -70, true)).await;
            assert!(active_flags(&registry).await <= 1);
        }
    }

    #[tokio::test]
    async fn test_handoff_waits_for_dwell_time() {
        let registry = BridgeRegistry::new(fast_config());

        // A established as the active bridge.
        for _ in 0..3 {
            registry.update(&report("A", -60, true)).await;
        }
        assert_eq!(registry.active_bridge_id().await, Some("A".to_string()));

        // B appears with a far stronger signal and keeps reporting. The
        // fourth report is the first one past the 300ms dwell window.
        registry.update(&report("B", -40, true)).await;
        assert_eq!(
            registry.snapshot().await.handoff_candidate,
            Some("B".to_string())
        );

        for _ in 0..2 {
            sleep(Duration::from_millis(110)).await;
            registry.update(&report("B", -40, true)).await;
            assert_eq!(registry.active_bridge_id().await, Some("A".to_string()));
        }

        sleep(Duration::from_millis(110)).await;
        registry.update(&report("B", -40, true)).await;
        assert_eq!(registry.active_bridge_id().await, Some("B".to_string()));
        assert_eq!(registry.snapshot().await.handoffs, 1);
        assert!(active_flags(&registry).await == 1);
    }

    #[tokio::test]
    async fn test_candidate_cleared_when_advantage_fades() {
        let registry = BridgeRegistry::new(fast_config());

        for _ in 0..3 {
            registry.update(&report("A", -60, true)).await;
        }
        registry.update(&report("B", -40, true)).await;
        assert_eq!(
            registry.snapshot().await.handoff_candidate,
            Some("B".to_string())
        );

        // B's signal collapses before the dwell elapses.
        for _ in 0..6 {
            registry.update(&report("B", -95, true)).await;
        }
        assert_eq!(registry.snapshot().await.handoff_candidate, None);
        assert_eq!(registry.active_bridge_id().await, Some("A".to_string()));
    }

    #[tokio::test]
    async fn test_replacement_selection_resets_candidate() {
        let registry = BridgeRegistry::new(fast_config());

        for _ in 0..3 {
            registry.update(&report("A", -60, true)).await;
        }
        registry.update(&report("C", -50, true)).await;
        assert_eq!(
            registry.snapshot().await.handoff_candidate,
            Some("C".to_string())
        );

        // A drops its connection; C is promoted immediately and the dwell
        // timer it was serving against A is discarded.
        registry.update(&report("A", -60, false)).await;
        assert_eq!(registry.active_bridge_id().await, Some("C".to_string()));
        assert_eq!(registry.snapshot().await.handoff_candidate, None);

        // A returning with a far stronger signal starts a fresh dwell; no
        // instant handoff against the new active.
        registry.update(&report("A", -20, true)).await;
        registry.update(&report("A", -20, true)).await;
        assert_eq!(registry.active_bridge_id().await, Some("C".to_string()));
        assert_eq!(
            registry.snapshot().await.handoff_candidate,
            Some("A".to_string())
        );
    }

    #[tokio::test]
    async fn test_active_bridge_expires_without_reports() {
        let config = HandoffConfig {
            bridge_timeout_ms: 80,
            ..fast_config()
        };
        let registry = BridgeRegistry::new(config);

        registry.update(&report("A", -60, true)).await;
        assert_eq!(registry.active_bridge_id().await, Some("A".to_string()));

        sleep(Duration::from_millis(120)).await;
        // No further reports from anyone: the query itself must observe the
        // expiry.
        assert_eq!(registry.active_bridge_id().await, None);
        assert_eq!(registry.online_count().await, 0);
    }

    #[tokio::test]
    async fn test_should_connect_fast_path() {
        let registry = BridgeRegistry::new(fast_config());

        // Nobody active: anyone may try.
        assert!(registry.should_connect("A").await);

        registry.update(&report("A", -80, true)).await;
        assert!(registry.should_connect("A").await);

        // B is known but far weaker: no.
        registry.update(&report("B", -95, false)).await;
        assert!(!registry.should_connect("B").await);

        // B clears A by more than the threshold: connection attempt allowed
        // even though the dwell-based handoff has not executed.
        for _ in 0..6 {
            registry.update(&report("B", -55, false)).await;
        }
        assert!(registry.should_connect("B").await);
        assert_eq!(registry.active_bridge_id().await, Some("A".to_string()));
    }

    #[tokio::test]
    async fn test_should_release_uses_softer_margin() {
        let registry = BridgeRegistry::new(fast_config());

        registry.update(&report("A", -50, true)).await;
        assert!(!registry.should_release("A").await);

        // Active is 10 dB better than B: release.
        registry.update(&report("B", -60, false)).await;
        assert!(registry.should_release("B").await);

        // C is within the release margin: hold on.
        registry.update(&report("C", -52, false)).await;
        assert!(!registry.should_release("C").await);
    }
}
