// # linkwatch-core
//
// Core library for the linkwatch connectivity monitoring daemon.
//
// ## Architecture Overview
//
// This library provides the daemon's entire decision logic:
// - **ConfigStore**: Typed configuration with mtime-based hot reload
// - **Prober** (trait): One connectivity probe per tick, implemented
//   out-of-crate (ICMP echo in `linkwatch-probe-icmp`)
// - **OutageTracker**: Edge-triggered failure-threshold state machine
// - **HistoryBuffer**: Fixed-capacity FIFO of latency samples
// - **IpTracker**: Public-IP provider fallback chain with geolocation and
//   change detection (`linkwatch-ip-http` supplies the providers)
// - **NotificationGate**: Enablement and mute-window filter in front of the
//   external delivery sink
// - **StatePublisher**: Atomic file-based state surface for readers
// - **MonitorEngine**: The tick loop that wires it all together
//
// ## Design Principles
//
// 1. **Single timeline**: One tick drives probing, IP checks and config
//    reload strictly in sequence; no shared mutable state, no locks
// 2. **Graceful degradation**: Steady-state errors never propagate upward;
//    stale values and defaults stand in until the next tick
// 3. **Injected time**: All time-dependent behavior goes through the
//    `Clock` trait so tests run without wall-clock sleeps
// 4. **Library-first**: The daemon binary is a thin wiring layer

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod notify;
pub mod outage;
pub mod publish;
pub mod tracker;
pub mod traits;

// Re-export core types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigStore};
pub use engine::{MonitorEngine, MonitorEvent};
pub use error::{Error, Result};
pub use history::{HistoryBuffer, Sample};
pub use notify::{EventCategory, Notification, NotificationGate};
pub use outage::{ConnectionStatus, OutageTracker, Transition};
pub use publish::{IpState, StatePublisher};
pub use tracker::{IpCheckOutcome, IpRecord, IpTracker};
pub use traits::{GeoInfo, GeoProvider, NotificationSink, ProbeOutcome, Prober, PublicIpProvider};
