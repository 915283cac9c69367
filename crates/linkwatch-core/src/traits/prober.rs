// # Prober Trait
//
// Defines the interface for a single connectivity probe.
//
// ## Implementations
//
// - ICMP echo: `linkwatch-probe-icmp` crate
// - Test doubles: scripted probers in the contract tests
//
// Probers are observers, not decision-makers: they report one outcome per
// call and hold no outage state. The engine owns the cadence (exactly one
// probe per tick, never overlapping) and the state machine.

use std::time::Duration;

use async_trait::async_trait;

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    /// The target replied within the timeout
    Reply {
        /// Round-trip time in milliseconds
        latency_ms: f64,
    },
    /// No reply within the timeout, or the probe could not be sent
    ///
    /// Both cases count as a failed probe; the distinction only matters for
    /// logging inside the implementation.
    NoReply,
}

impl ProbeOutcome {
    /// Whether the probe succeeded
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply { .. })
    }
}

/// Trait for probe implementations
///
/// # Contract
///
/// - One call issues exactly one probe and returns within roughly `timeout`
/// - Implementations must not retry internally; retry semantics belong to
///   the failure-threshold state machine
/// - A send failure (unresolvable host, closed socket) is reported as
///   [`ProbeOutcome::NoReply`], not as an error
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `host` once with the given reply timeout and payload size
    async fn probe(&self, host: &str, timeout: Duration, packet_size: usize) -> ProbeOutcome;
}
