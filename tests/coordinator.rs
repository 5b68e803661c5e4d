//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! End-to-end pipeline tests: report ingestion through handoff selection,
//! deduplication and forwarding against a mocked collector.

use async_trait::async_trait;
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use vitals_relay::{
    BridgeReport, CollectorClient, ForwarderConfig, HandoffConfig, IngestCoordinator, IngestStatus,
    OutboundRecord, RelayConfig, RelayError, RelayResult,
};

mock! {
    Collector {}

    #[async_trait]
    impl CollectorClient for Collector {
        async fn deliver(&self, record: &OutboundRecord) -> RelayResult<()>;
    }
}

/// Collector that never completes an attempt, for backpressure tests
struct HangingCollector;

#[async_trait]
impl CollectorClient for HangingCollector {
    async fn deliver(&self, _record: &OutboundRecord) -> RelayResult<()> {
        sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// Install a per-test capturing subscriber so output from the forwarding
/// drain task lands in the test log. Repeat installs are ignored.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config() -> RelayConfig {
    init_tracing();
    RelayConfig {
        handoff: HandoffConfig {
            dwell_ms: 300,
            ..HandoffConfig::default()
        },
        forwarder: ForwarderConfig {
            retry_delay_ms: 10,
            request_timeout_ms: 200,
            ..ForwarderConfig::default()
        },
        ..RelayConfig::default()
    }
}

fn vitals_report(bridge_id: &str, spo2: u16, hr: u16, rssi: i32) -> BridgeReport {
    BridgeReport {
        spo2: Some(spo2),
        hr: Some(hr),
        ..BridgeReport::status_only(bridge_id, rssi, true)
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_active_bridge_reading_reaches_collector() {
    let mut collector = MockCollector::new();
    collector
        .expect_deliver()
        .withf(|record| record.spo2 == 97 && record.hr == 72 && record.bridge_id == "A")
        .times(1)
        .returning(|_| Ok(()));

    let coordinator = IngestCoordinator::with_client(test_config(), Arc::new(collector));

    let decision = coordinator.ingest(vitals_report("A", 97, 72, -60)).await;
    assert_eq!(decision.status, IngestStatus::Accepted);
    assert!(decision.forwarded);
    assert!(decision.is_active_bridge);

    wait_until(|| async { coordinator.forwarder().stats().await.sent == 1 }).await;
}

#[tokio::test]
async fn test_collector_failure_never_reaches_ingestion() {
    let mut collector = MockCollector::new();
    collector
        .expect_deliver()
        .times(3)
        .returning(|_| Err(RelayError::network("connection refused")));

    let coordinator = IngestCoordinator::with_client(test_config(), Arc::new(collector));

    // Ingestion reports success: forwarding means "enqueued", delivery is
    // decoupled.
    let decision = coordinator.ingest(vitals_report("A", 97, 72, -60)).await;
    assert_eq!(decision.status, IngestStatus::Accepted);
    assert!(decision.forwarded);

    wait_until(|| async { coordinator.forwarder().stats().await.failed == 1 }).await;
    let stats = coordinator.forwarder().stats().await;
    assert_eq!(stats.sent, 0);
    assert_eq!(stats.retried, 3);
}

#[tokio::test]
async fn test_handoff_after_dwell_redirects_forwarding() {
    let mut collector = MockCollector::new();
    collector.expect_deliver().returning(|_| Ok(()));

    let coordinator = IngestCoordinator::with_client(test_config(), Arc::new(collector));

    // A establishes itself as the active bridge; B is present but weak.
    for hr in [70, 71, 72] {
        coordinator.ingest(vitals_report("A", 97, hr, -60)).await;
    }
    let weak = coordinator.ingest(vitals_report("B", 97, 73, -90)).await;
    assert!(!weak.is_active_bridge);
    assert!(!weak.forwarded);

    // B's signal jumps and stays strong; the fourth strong report is the
    // first past the 300ms dwell window.
    let mut hr = 74;
    let first = coordinator.ingest(vitals_report("B", 97, hr, -40)).await;
    assert!(!first.is_active_bridge);

    for _ in 0..2 {
        sleep(Duration::from_millis(110)).await;
        hr += 1;
        let decision = coordinator.ingest(vitals_report("B", 97, hr, -40)).await;
        assert!(!decision.is_active_bridge, "handoff before dwell elapsed");
    }

    sleep(Duration::from_millis(110)).await;
    hr += 1;
    let decision = coordinator.ingest(vitals_report("B", 97, hr, -40)).await;
    assert!(decision.is_active_bridge);
    assert!(decision.forwarded);
    assert_eq!(decision.active_bridge, Some("B".to_string()));

    // A is now on the losing side of both guidance checks.
    let demoted = coordinator.ingest(vitals_report("A", 97, 90, -60)).await;
    assert!(!demoted.is_active_bridge);
    assert!(!demoted.forwarded);
    assert!(demoted.should_release);
}

#[tokio::test]
async fn test_duplicates_suppressed_across_bridges() {
    let mut collector = MockCollector::new();
    collector.expect_deliver().returning(|_| Ok(()));

    let coordinator = IngestCoordinator::with_client(test_config(), Arc::new(collector));

    coordinator.ingest(vitals_report("A", 97, 72, -60)).await;

    // The same vital pair relayed by a different bridge is a bridge echo.
    let echo = coordinator.ingest(vitals_report("B", 97, 72, -70)).await;
    assert_eq!(echo.status, IngestStatus::Duplicate);

    // After two distinct readings the pair is legitimate again.
    coordinator.ingest(vitals_report("A", 96, 74, -60)).await;
    coordinator.ingest(vitals_report("A", 98, 71, -60)).await;
    let again = coordinator.ingest(vitals_report("A", 97, 72, -60)).await;
    assert_eq!(again.status, IngestStatus::Accepted);
}

#[tokio::test]
async fn test_queue_backpressure_surfaces_as_not_forwarded() {
    let mut config = test_config();
    config.forwarder.queue_capacity = 2;
    config.forwarder.request_timeout_ms = 60_000;

    let coordinator = IngestCoordinator::with_client(config, Arc::new(HangingCollector));

    // First reading goes in flight and hangs there.
    let first = coordinator.ingest(vitals_report("A", 97, 70, -60)).await;
    assert!(first.forwarded);
    wait_until(|| async { coordinator.forwarder().pending() == 0 }).await;

    // Two more fill the queue behind it.
    for hr in [71, 72] {
        let decision = coordinator.ingest(vitals_report("A", 97, hr, -60)).await;
        assert!(decision.forwarded);
    }

    // The next reading is accepted but not forwarded; nothing blocks.
    let overflow = coordinator.ingest(vitals_report("A", 97, 73, -60)).await;
    assert_eq!(overflow.status, IngestStatus::Accepted);
    assert!(!overflow.forwarded);
    assert_eq!(coordinator.forwarder().pending(), 2);

    let stats = coordinator.stats().await;
    assert_eq!(stats.total_received, 4);
    assert_eq!(stats.total_forwarded, 3);
}
