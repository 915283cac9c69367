//! Core monitor engine
//!
//! The MonitorEngine is responsible for:
//! - Driving one probe per tick and feeding the outage state machine
//! - Running the IP tracker when its own interval has elapsed
//! - Reloading configuration when the backing file changes
//! - Publishing status, history, IP state and the event log
//!
//! ## Tick Flow
//!
//! ```text
//! ┌──────────────┐   1. config update check
//! │ MonitorEngine│   2. probe → outage state machine → history
//! │    tick()    │   3. IP check (if due) → change detection
//! └──────────────┘   4. publish dirty state
//! ```
//!
//! Everything runs strictly in sequence on one control flow; no locks are
//! needed between the steps. The probe step may block for up to the probe
//! timeout, so the scheduler clamps the sleep remainder to a small positive
//! floor instead of busy-looping when a probe overruns the interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{Config, ConfigStore};
use crate::history::{HistoryBuffer, Sample};
use crate::notify::{EventCategory, Notification, NotificationGate};
use crate::outage::{ConnectionStatus, OutageTracker, Transition};
use crate::publish::StatePublisher;
use crate::tracker::{IpCheckOutcome, IpRecord, IpTracker};
use crate::traits::{NotificationSink, ProbeOutcome, Prober};
use crate::error::Result;

/// Bounded capacity of the engine event channel
///
/// When full, new events are dropped with a warning; observers are
/// best-effort and must never backpressure the probe loop.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Floor for the per-tick sleep remainder
///
/// Keeps an overrunning probe from turning the loop into a busy spin.
const MIN_TICK_SLEEP: Duration = Duration::from_millis(100);

/// Events emitted by the engine for external observers
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Engine started
    Started { host: String },
    /// Failure threshold reached; an outage episode began
    OutageStarted { consecutive_failures: u32 },
    /// First successful probe after an outage episode
    Restored { latency_ms: f64 },
    /// First successful IP resolution of this run
    IpResolved { record: IpRecord },
    /// Public IP changed against the previously recorded address
    IpChanged { previous: String, record: IpRecord },
    /// Configuration was reloaded from disk
    ConfigReloaded,
    /// Engine stopped
    Stopped { reason: String },
}

/// Core monitor engine
///
/// Owns every component and all mutable state. Constructed once at daemon
/// start; `startup()` claims the state directory, then `run()` (or
/// `run_with_shutdown()` in tests) drives ticks until terminated.
///
/// ## Testability
///
/// `tick()` is public: tests drive the engine tick by tick with a scripted
/// prober and a manual clock, never sleeping on the wall clock.
pub struct MonitorEngine {
    config_store: ConfigStore,
    prober: Box<dyn Prober>,
    tracker: IpTracker,
    history: HistoryBuffer,
    outage: OutageTracker,
    status: ConnectionStatus,
    gate: NotificationGate,
    publisher: StatePublisher,
    clock: Arc<dyn Clock>,
    event_tx: mpsc::Sender<MonitorEvent>,
}

impl MonitorEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `config_store`: store that has already performed its initial load
    /// - `prober`: probe implementation
    /// - `tracker`: IP tracker with its provider chains
    /// - `sink`: notification delivery sink (behind the gate)
    /// - `publisher`: state-directory publisher
    /// - `clock`: time source (`SystemClock` in production)
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events
    pub fn new(
        config_store: ConfigStore,
        prober: Box<dyn Prober>,
        tracker: IpTracker,
        sink: Arc<dyn NotificationSink>,
        publisher: StatePublisher,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let config = config_store.current();
        let history = HistoryBuffer::new(config.history_capacity);
        let gate = NotificationGate::new(sink, Arc::clone(&clock), config);

        let engine = Self {
            config_store,
            prober,
            tracker,
            history,
            outage: OutageTracker::new(),
            status: ConnectionStatus::Starting,
            gate,
            publisher,
            clock,
            event_tx: tx,
        };

        (engine, rx)
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Current configuration snapshot
    pub fn config(&self) -> &Config {
        self.config_store.current()
    }

    /// Suppress outage notifications until `until`; `None` clears the window
    pub fn mute_outages_until(&mut self, until: Option<DateTime<Utc>>) {
        self.gate.set_mute_until(until);
    }

    /// Sound name the external delivery layer should attach to
    /// notifications, tracking config reloads
    pub fn notification_sound(&self) -> &str {
        self.gate.sound()
    }

    /// Last `log.tail_lines` lines of the published event log
    ///
    /// The same view the presentation layer assembles from the state
    /// directory; exposed here so embedders and tests share the parser.
    pub async fn log_tail(&self) -> Result<Vec<String>> {
        crate::publish::read_log_tail(
            self.publisher.dir(),
            self.config_store.current().log_tail_lines,
        )
        .await
    }

    /// Claim the state directory and publish the initial surface
    ///
    /// Returns the only fatal error class: a state directory or pid file
    /// that cannot be created terminates the daemon.
    pub async fn startup(&mut self) -> Result<()> {
        self.publisher.startup(std::process::id()).await?;

        let host = self.config_store.current().host.clone();
        // Best-effort initial surface; failures here are retried next tick
        self.publish_all().await;
        if let Err(err) = self
            .publisher
            .log_event(self.clock.now(), &format!("monitoring {host}"))
            .await
        {
            warn!("could not write startup log entry: {err}");
        }

        info!("monitor started (host {host})");
        self.emit_event(MonitorEvent::Started { host });
        Ok(())
    }

    /// Run one scheduler tick
    ///
    /// Steps run strictly in sequence: config reload check, probe, IP check
    /// if due, state publication. The config snapshot captured at the top
    /// is used for the whole tick, so a reload never half-applies.
    pub async fn tick(&mut self) {
        if let Some(updated) = self.config_store.check_for_update() {
            self.apply_config(&updated).await;
        }
        let config = self.config_store.current().clone();

        self.probe_step(&config).await;

        if self
            .tracker
            .check_due(self.clock.now(), config.ip_check_interval)
        {
            self.ip_step(&config).await;
        }

        self.publish_all().await;
    }

    /// Run until a shutdown signal arrives
    ///
    /// Production entry point; SIGINT via `ctrl_c`. The daemon binary
    /// prefers [`Self::run_with_shutdown`] with its own signal wiring so
    /// SIGTERM is honored too.
    pub async fn run(&mut self) -> Result<()> {
        self.run_internal(None, true).await
    }

    /// Run with an optional external shutdown receiver
    ///
    /// # Parameters
    ///
    /// - `shutdown_rx`: receiver that triggers a clean shutdown when it
    ///   resolves (used by the daemon's signal handler and by tests)
    pub async fn run_with_shutdown(
        &mut self,
        shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<()> {
        self.run_internal(Some(shutdown_rx), false).await
    }

    async fn run_internal(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
        also_ctrl_c: bool,
    ) -> Result<()> {
        let mut shutdown_rx = shutdown_rx;
        loop {
            let tick_started = tokio::time::Instant::now();
            self.tick().await;

            let interval = self.config_store.current().probe_interval;
            let remainder = interval
                .checked_sub(tick_started.elapsed())
                .unwrap_or(Duration::ZERO)
                .max(MIN_TICK_SLEEP);

            let stop = tokio::select! {
                () = tokio::time::sleep(remainder) => false,
                _ = async {
                    match shutdown_rx.as_mut() {
                        Some(rx) => { let _ = rx.await; }
                        None => std::future::pending().await,
                    }
                } => true,
                _ = tokio::signal::ctrl_c(), if also_ctrl_c => true,
            };

            if stop {
                info!("shutdown signal received");
                break;
            }
        }

        if let Err(err) = self
            .publisher
            .log_event(self.clock.now(), "monitor stopped")
            .await
        {
            warn!("could not write shutdown log entry: {err}");
        }
        self.publisher.shutdown().await?;
        self.emit_event(MonitorEvent::Stopped {
            reason: "shutdown signal".to_string(),
        });
        Ok(())
    }

    /// Apply a reloaded configuration to dependent components
    async fn apply_config(&mut self, config: &Config) {
        self.history.set_capacity(config.history_capacity);
        self.gate.apply_config(config);
        if let Err(err) = self
            .publisher
            .log_event(self.clock.now(), "configuration reloaded")
            .await
        {
            warn!("could not log config reload: {err}");
        }
        self.emit_event(MonitorEvent::ConfigReloaded);
    }

    /// Probe once and feed the outage state machine
    async fn probe_step(&mut self, config: &Config) {
        let outcome = self
            .prober
            .probe(&config.host, config.probe_timeout, config.packet_size)
            .await;

        match outcome {
            ProbeOutcome::Reply { latency_ms } => {
                let sample = Sample::latency(latency_ms);
                self.history.push(sample);
                self.status = ConnectionStatus::Online;

                if self.outage.record_success() == Transition::Restored {
                    let rounded = sample.latency_ms().unwrap_or_default();
                    info!("connection restored ({rounded:.1} ms)");
                    self.log_and_notify(
                        "Connection restored",
                        &format!("{} is reachable again ({rounded:.1} ms)", config.host),
                        EventCategory::Restored,
                    )
                    .await;
                    self.emit_event(MonitorEvent::Restored {
                        latency_ms: rounded,
                    });
                }
            }
            ProbeOutcome::NoReply => {
                self.history.push(Sample::Timeout);
                let transition = self.outage.record_failure(config.fail_threshold);
                if self.outage.outage_active() {
                    self.status = ConnectionStatus::Offline;
                }

                if transition == Transition::OutageStarted {
                    let failures = self.outage.consecutive_failures();
                    warn!("outage declared after {failures} consecutive failures");
                    self.log_and_notify(
                        "Connection lost",
                        &format!(
                            "{} unreachable for {failures} consecutive probes",
                            config.host
                        ),
                        EventCategory::Outage,
                    )
                    .await;
                    self.emit_event(MonitorEvent::OutageStarted {
                        consecutive_failures: failures,
                    });
                } else {
                    debug!(
                        "probe failed ({} consecutive)",
                        self.outage.consecutive_failures()
                    );
                }
            }
        }
    }

    /// Run one IP resolution cycle and handle the outcome
    async fn ip_step(&mut self, config: &Config) {
        match self.tracker.resolve().await {
            IpCheckOutcome::Initial(record) => {
                let line = format!(
                    "initial IP {} ({}, {})",
                    record.ip, record.country, record.city
                );
                if let Err(err) = self.publisher.log_event(self.clock.now(), &line).await {
                    warn!("could not log initial IP: {err}");
                }
                self.emit_event(MonitorEvent::IpResolved { record });
            }
            IpCheckOutcome::Changed { previous, record } => {
                let (shown_old, shown_new) = if config.censor_ip_on_change {
                    (
                        crate::tracker::censor_ip(&previous),
                        crate::tracker::censor_ip(&record.ip),
                    )
                } else {
                    (previous.clone(), record.ip.clone())
                };
                self.log_and_notify(
                    "Public IP changed",
                    &format!(
                        "{shown_old} -> {shown_new} ({}, {})",
                        record.country, record.city
                    ),
                    EventCategory::IpChange,
                )
                .await;
                self.emit_event(MonitorEvent::IpChanged { previous, record });
            }
            IpCheckOutcome::Unchanged | IpCheckOutcome::Skipped => {}
        }
    }

    /// Publish the full state surface; failures are logged and retried
    /// next tick
    async fn publish_all(&mut self) {
        if let Err(err) = self.publisher.publish_status(self.status).await {
            error!("{err}");
        }
        let snapshot = self.history.snapshot();
        if let Err(err) = self.publisher.publish_history(&snapshot).await {
            error!("{err}");
        }
        if let Err(err) = self.publisher.publish_ip(self.tracker.current()).await {
            error!("{err}");
        }
    }

    /// Write the event to the published log and offer it to the gate
    async fn log_and_notify(&mut self, title: &str, body: &str, category: EventCategory) {
        if let Err(err) = self
            .publisher
            .log_event(self.clock.now(), &format!("{title}: {body}"))
            .await
        {
            warn!("could not append event log: {err}");
        }
        self.gate
            .notify(Notification::new(title, body, category));
    }

    /// Emit an engine event
    ///
    /// Send without blocking; a full channel drops the event with a warning
    /// rather than stalling the probe loop.
    fn emit_event(&self, event: MonitorEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("event channel full, dropping event");
        }
    }
}
