//! Contract: failure-threshold outage detection
//!
//! Constraints verified:
//! - The outage activates exactly when the consecutive-failure count
//!   reaches the threshold, never earlier, never twice per episode
//! - The restoration event fires exactly once, on the first success after
//!   an outage, and resets the failure counter
//! - A threshold raised by a config reload applies to the next episode
//!
//! These cover Scenario A (three timeouts at threshold 3), Scenario B (one
//! success afterwards) and Scenario E (threshold changed mid-run).

mod common;

use common::*;
use linkwatch_core::{ConnectionStatus, MonitorEvent};

#[tokio::test]
async fn outage_declared_exactly_at_the_third_timeout() {
    // One success to get Online, then three lost probes
    let prober = ScriptedProber::from_latencies([Some(12.0), None, None, None]);
    let mut harness = Harness::new("", prober, ScriptedIpProvider::from_ips(["1.2.3.4"]));

    harness.ticks(1).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Online);

    // Two failures: still Online, no event
    harness.ticks(2).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Online);
    assert!(
        !harness
            .drain_events()
            .iter()
            .any(|e| matches!(e, MonitorEvent::OutageStarted { .. }))
    );

    // Third failure: Offline, exactly one outage event
    harness.ticks(1).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Offline);
    let outages: Vec<_> = harness
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::OutageStarted { .. }))
        .collect();
    assert_eq!(
        outages,
        vec![MonitorEvent::OutageStarted {
            consecutive_failures: 3
        }]
    );

    let delivered = harness.sink.snapshot();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].category.as_deref(), Some("OUTAGE"));
}

#[tokio::test]
async fn no_duplicate_events_while_the_outage_persists() {
    let prober = ScriptedProber::from_latencies([None, None, None, None, None, None]);
    let mut harness = Harness::new("", prober, ScriptedIpProvider::from_ips(["1.2.3.4"]));

    harness.ticks(6).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Offline);

    let outages = harness
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::OutageStarted { .. }))
        .count();
    assert_eq!(outages, 1, "edge-triggered: one event per episode");
    assert_eq!(harness.sink.snapshot().len(), 1);
}

#[tokio::test]
async fn restoration_fires_once_and_resets_the_counter() {
    // Scenario B: outage, then one success at 42.3 ms
    let prober =
        ScriptedProber::from_latencies([None, None, None, Some(42.3), Some(8.0)]);
    let mut harness = Harness::new("", prober, ScriptedIpProvider::from_ips(["1.2.3.4"]));

    harness.ticks(3).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Offline);
    harness.drain_events();

    harness.ticks(1).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Online);
    let restored: Vec<_> = harness
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::Restored { .. }))
        .collect();
    assert_eq!(restored, vec![MonitorEvent::Restored { latency_ms: 42.3 }]);

    // Further successes announce nothing new
    harness.ticks(1).await;
    assert!(harness.drain_events().is_empty());

    let categories: Vec<_> = harness
        .sink
        .snapshot()
        .into_iter()
        .filter_map(|d| d.category)
        .collect();
    assert_eq!(categories, vec!["OUTAGE", "RESTORED"]);
}

#[tokio::test]
async fn status_stays_starting_until_first_probe_resolves_either_way() {
    let prober = ScriptedProber::from_latencies([None, None, None]);
    let mut harness = Harness::new("", prober, ScriptedIpProvider::from_ips(["1.2.3.4"]));

    // Failures before the threshold leave the initial status in place
    harness.ticks(2).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Starting);

    harness.ticks(1).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Offline);
}

#[tokio::test]
async fn raised_threshold_governs_the_next_outage() {
    // Scenario E: threshold 3 -> 5 mid-run
    let prober = ScriptedProber::from_latencies([
        Some(10.0), // online, config still threshold 3
        None,
        None,
        None,
        None,
        None,
    ]);
    let mut harness = Harness::new(
        "[ping]\nfail_threshold = 3\n",
        prober,
        ScriptedIpProvider::from_ips(["1.2.3.4"]),
    );

    harness.ticks(1).await;
    harness.rewrite_config("[ping]\nfail_threshold = 5\n");

    // Four failures under the new threshold: no outage yet
    harness.ticks(4).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Online);
    assert!(
        !harness
            .drain_events()
            .iter()
            .any(|e| matches!(e, MonitorEvent::OutageStarted { .. }))
    );

    // Fifth failure trips it
    harness.ticks(1).await;
    assert_eq!(harness.engine.status(), ConnectionStatus::Offline);
    assert!(
        harness
            .drain_events()
            .iter()
            .any(|e| matches!(
                e,
                MonitorEvent::OutageStarted {
                    consecutive_failures: 5
                }
            ))
    );
}
