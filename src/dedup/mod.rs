//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Recent-readings cache and deduplication filter
//!
//! This module suppresses exact/near-exact repeated vital pairs arriving in
//! quick succession, independent of source bridge. The window is deliberately
//! tight and the default tolerance zero: the sensor emits at a fixed cadence
//! with natural micro-variation, so only back-to-back identical packets
//! (resends or bridge echoes) should be dropped, never legitimate repeated
//! readings from a patient at rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::config::DedupConfig;
use crate::types::Reading;

/// Cache state behind the lock
#[derive(Debug, Default)]
struct CacheInner {
    readings: VecDeque<Reading>,
    last_forwarded: Option<Reading>,
}

/// Bounded ring of recent accepted readings with duplicate detection
pub struct ReadingCache {
    config: DedupConfig,
    inner: RwLock<CacheInner>,
}

impl ReadingCache {
    /// Create an empty cache
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    /// Whether the vital pair matches any of the last `window` readings
    /// within the configured tolerances
    pub async fn is_duplicate(&self, spo2: u16, hr: u16) -> bool {
        let inner = self.inner.read().await;
        inner
            .readings
            .iter()
            .rev()
            .take(self.config.window)
            .any(|cached| {
                cached.spo2.abs_diff(spo2) <= self.config.spo2_tolerance
                    && cached.hr.abs_diff(hr) <= self.config.hr_tolerance
            })
    }

    /// Append a reading, evicting the oldest on overflow
    pub async fn record(&self, reading: Reading) {
        let mut inner = self.inner.write().await;
        if reading.forwarded {
            inner.last_forwarded = Some(reading.clone());
        }
        inner.readings.push_back(reading);
        while inner.readings.len() > self.config.cache_size {
            inner.readings.pop_front();
        }
    }

    /// Most recent `count` readings, oldest first
    pub async fn recent(&self, count: usize) -> Vec<Reading> {
        let inner = self.inner.read().await;
        let skip = inner.readings.len().saturating_sub(count);
        inner.readings.iter().skip(skip).cloned().collect()
    }

    /// Most recently forwarded reading, if any
    pub async fn last_forwarded(&self) -> Option<Reading> {
        self.inner.read().await.last_forwarded.clone()
    }

    /// Cache statistics over the last 20 readings
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        if inner.readings.is_empty() {
            return CacheStats::default();
        }

        let skip = inner.readings.len().saturating_sub(20);
        let recent: Vec<&Reading> = inner.readings.iter().skip(skip).collect();
        let avg_spo2 = recent.iter().map(|r| r.spo2 as f64).sum::<f64>() / recent.len() as f64;
        let avg_hr = recent.iter().map(|r| r.hr as f64).sum::<f64>() / recent.len() as f64;

        CacheStats {
            count: inner.readings.len(),
            avg_spo2: (avg_spo2 * 10.0).round() / 10.0,
            avg_hr: (avg_hr * 10.0).round() / 10.0,
            last_timestamp: inner.readings.back().map(|r| r.timestamp),
        }
    }
}

/// Read-only cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Readings currently held
    pub count: usize,

    /// Average SpO2 over the last 20 readings
    pub avg_spo2: f64,

    /// Average heart rate over the last 20 readings
    pub avg_hr: f64,

    /// Timestamp of the newest reading
    pub last_timestamp: Option<DateTime<Utc>>,
}
