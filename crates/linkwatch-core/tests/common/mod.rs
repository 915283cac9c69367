//! Test doubles and common utilities for the monitor contract tests
//!
//! Scripted components let the tests drive the engine tick by tick with a
//! manual clock: no network, no raw sockets, no wall-clock sleeps.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use linkwatch_core::clock::ManualClock;
use linkwatch_core::error::{Error, Result};
use linkwatch_core::traits::{
    GeoInfo, GeoProvider, NotificationSink, ProbeOutcome, Prober, PublicIpProvider,
};
use linkwatch_core::{ConfigStore, IpTracker, MonitorEngine, MonitorEvent, StatePublisher};

/// Prober that replays a scripted list of outcomes
///
/// Once the script is exhausted, every further probe succeeds with a fixed
/// latency so long-running tests stay online by default.
pub struct ScriptedProber {
    outcomes: Mutex<VecDeque<ProbeOutcome>>,
}

impl ScriptedProber {
    pub fn new(outcomes: impl IntoIterator<Item = ProbeOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
        }
    }

    /// Shorthand: `Some(ms)` is a reply, `None` a lost probe
    pub fn from_latencies(script: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self::new(script.into_iter().map(|entry| match entry {
            Some(latency_ms) => ProbeOutcome::Reply { latency_ms },
            None => ProbeOutcome::NoReply,
        }))
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, _host: &str, _timeout: Duration, _packet_size: usize) -> ProbeOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ProbeOutcome::Reply { latency_ms: 10.0 })
    }
}

/// Public-IP provider that replays scripted answers, then fails
pub struct ScriptedIpProvider {
    answers: Mutex<VecDeque<Result<IpAddr>>>,
}

impl ScriptedIpProvider {
    pub fn new(answers: impl IntoIterator<Item = Result<IpAddr>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
        }
    }

    pub fn from_ips(ips: impl IntoIterator<Item = &'static str>) -> Self {
        Self::new(
            ips.into_iter()
                .map(|ip| Ok(ip.parse().expect("test IP parses"))),
        )
    }
}

#[async_trait]
impl PublicIpProvider for ScriptedIpProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_ip(&self) -> Result<IpAddr> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::resolution("script exhausted")))
    }
}

/// Geolocation provider with a fixed answer
pub struct StaticGeoProvider {
    geo: GeoInfo,
}

impl StaticGeoProvider {
    pub fn new(country: &str, city: &str) -> Self {
        Self {
            geo: GeoInfo {
                country: country.to_string(),
                city: city.to_string(),
            },
        }
    }
}

#[async_trait]
impl GeoProvider for StaticGeoProvider {
    fn name(&self) -> &'static str {
        "static-geo"
    }

    async fn lookup(&self, _ip: IpAddr) -> Result<GeoInfo> {
        Ok(self.geo.clone())
    }
}

/// One delivery observed by the collecting sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub title: String,
    pub body: String,
    pub category: Option<String>,
}

/// Sink that records every delivery
#[derive(Default)]
pub struct CollectingSink {
    pub delivered: Mutex<Vec<Delivered>>,
}

impl CollectingSink {
    pub fn snapshot(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn deliver(&self, title: &str, body: &str, category: Option<&str>) -> Result<()> {
        self.delivered.lock().unwrap().push(Delivered {
            title: title.to_string(),
            body: body.to_string(),
            category: category.map(str::to_string),
        });
        Ok(())
    }
}

/// Fully wired engine over temp state, scripted I/O and a manual clock
pub struct Harness {
    pub engine: MonitorEngine,
    pub events: mpsc::Receiver<MonitorEvent>,
    pub sink: Arc<CollectingSink>,
    pub clock: Arc<ManualClock>,
    pub state_dir: tempfile::TempDir,
    pub config_path: std::path::PathBuf,
}

impl Harness {
    /// Build a harness
    ///
    /// # Parameters
    ///
    /// - `config_toml`: content of the config file ("" for pure defaults)
    /// - `prober`: scripted probe outcomes
    /// - `ip_answers`: scripted public-IP answers
    pub fn new(
        config_toml: &str,
        prober: ScriptedProber,
        ip_answers: ScriptedIpProvider,
    ) -> Self {
        let state_dir = tempfile::tempdir().expect("tempdir");
        let config_path = state_dir.path().join("config.toml");
        std::fs::write(&config_path, config_toml).expect("write config");

        let mut config_store = ConfigStore::new(&config_path);
        config_store.load();

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sink = Arc::new(CollectingSink::default());

        let tracker = IpTracker::new(
            vec![Box::new(ip_answers)],
            vec![Box::new(StaticGeoProvider::new("Iceland", "Reykjavik"))],
            clock.clone(),
        );
        // Tests that skip startup() still need the publish directory
        let published = state_dir.path().join("state");
        std::fs::create_dir_all(&published).expect("create state dir");
        let publisher = StatePublisher::new(published);

        let (engine, events) = MonitorEngine::new(
            config_store,
            Box::new(prober),
            tracker,
            sink.clone(),
            publisher,
            clock.clone(),
        );

        Self {
            engine,
            events,
            sink,
            clock,
            state_dir,
            config_path,
        }
    }

    /// Run `n` ticks, letting detached notification tasks settle after each
    pub async fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.engine.tick().await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }
    }

    /// Drain every event emitted so far
    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Rewrite the config file and force the mtime forward so the store's
    /// update check fires on the next tick
    ///
    /// Each rewrite lands on a strictly later mtime, independent of the
    /// filesystem's timestamp resolution.
    pub fn rewrite_config(&self, content: &str) {
        use std::sync::atomic::{AtomicI64, Ordering};
        static OFFSET: AtomicI64 = AtomicI64::new(60);

        std::fs::write(&self.config_path, content).expect("rewrite config");
        let later = filetime::FileTime::from_unix_time(
            filetime::FileTime::now().unix_seconds() + OFFSET.fetch_add(60, Ordering::SeqCst),
            0,
        );
        filetime::set_file_mtime(&self.config_path, later).expect("bump mtime");
    }

    /// The directory the publisher writes into
    pub fn published_dir(&self) -> std::path::PathBuf {
        self.state_dir.path().join("state")
    }

    /// Path of a published state file
    pub fn state_file(&self, name: &str) -> std::path::PathBuf {
        self.published_dir().join(name)
    }
}
