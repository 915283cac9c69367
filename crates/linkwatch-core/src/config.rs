//! Configuration types for the connectivity monitor
//!
//! The daemon consumes a TOML file with `[ping]`, `[ip_check]`,
//! `[notifications]` and `[log]` tables. Every field is optional; unknown
//! fields are ignored. A field that is absent or invalid keeps its
//! last-known-good value (the documented default on first load), so a broken
//! edit can never take the daemon down.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::{debug, info, warn};

/// Default probe target
pub const DEFAULT_HOST: &str = "8.8.8.8";
/// Default probe cadence in seconds
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 2;
/// Default consecutive-failure threshold for declaring an outage
pub const DEFAULT_FAIL_THRESHOLD: u32 = 3;
/// Default per-probe timeout in seconds
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 2;
/// Default ICMP payload size in bytes
pub const DEFAULT_PACKET_SIZE: usize = 56;
/// Default latency history capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;
/// Default public-IP check cadence in seconds
pub const DEFAULT_IP_CHECK_INTERVAL_SECS: u64 = 10;
/// Default notification sound name
pub const DEFAULT_NOTIFICATION_SOUND: &str = "Basso";
/// Default number of log lines exposed to readers
pub const DEFAULT_LOG_TAIL_LINES: usize = 7;

/// Immutable configuration snapshot
///
/// Owned by [`ConfigStore`]; the engine clones a snapshot at tick start so a
/// reload mid-tick can never produce a partially-applied config.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Probe target (IP address or hostname)
    pub host: String,
    /// Cadence of the probe loop
    pub probe_interval: Duration,
    /// Consecutive failures required to declare an outage
    pub fail_threshold: u32,
    /// Per-probe reply timeout
    pub probe_timeout: Duration,
    /// ICMP payload size in bytes
    pub packet_size: usize,
    /// Latency history capacity
    pub history_capacity: usize,
    /// Cadence of public-IP checks
    pub ip_check_interval: Duration,
    /// Master switch for the notification gate
    pub notifications_enabled: bool,
    /// Sound name handed to the notification delivery layer
    pub notification_sound: String,
    /// Mask IP octets in user-facing change notifications
    pub censor_ip_on_change: bool,
    /// Number of log lines exposed to readers
    pub log_tail_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            packet_size: DEFAULT_PACKET_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            ip_check_interval: Duration::from_secs(DEFAULT_IP_CHECK_INTERVAL_SECS),
            notifications_enabled: true,
            notification_sound: DEFAULT_NOTIFICATION_SOUND.to_string(),
            censor_ip_on_change: false,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
        }
    }
}

/// Raw on-disk shape: everything optional, unknown fields ignored
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    ping: RawPing,
    #[serde(default)]
    ip_check: RawIpCheck,
    #[serde(default)]
    notifications: RawNotifications,
    #[serde(default)]
    log: RawLog,
}

#[derive(Debug, Default, Deserialize)]
struct RawPing {
    host: Option<String>,
    interval_seconds: Option<u64>,
    fail_threshold: Option<u32>,
    timeout_seconds: Option<u64>,
    packet_size: Option<usize>,
    history_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIpCheck {
    interval_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNotifications {
    enabled: Option<bool>,
    sound: Option<String>,
    censor_on_change: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLog {
    tail_lines: Option<usize>,
}

impl Config {
    /// Merge a raw file onto this config, returning the merged config and a
    /// list of `field: old -> new` descriptions for the reload log
    ///
    /// Present-and-valid fields replace current values; absent fields keep
    /// them; present-but-invalid fields keep them with a warning.
    fn merged_with(&self, raw: &RawConfig) -> (Config, Vec<String>) {
        let mut next = self.clone();
        let mut changed = Vec::new();

        if let Some(host) = &raw.ping.host {
            if host.trim().is_empty() {
                warn!("ping.host is empty, keeping {:?}", next.host);
            } else if *host != next.host {
                changed.push(format!("ping.host: {:?} -> {:?}", next.host, host));
                next.host = host.clone();
            }
        }
        if let Some(secs) = raw.ping.interval_seconds {
            if secs == 0 {
                warn!("ping.interval_seconds must be positive, keeping current value");
            } else if Duration::from_secs(secs) != next.probe_interval {
                changed.push(format!(
                    "ping.interval_seconds: {} -> {}",
                    next.probe_interval.as_secs(),
                    secs
                ));
                next.probe_interval = Duration::from_secs(secs);
            }
        }
        if let Some(threshold) = raw.ping.fail_threshold {
            if threshold == 0 {
                warn!("ping.fail_threshold must be at least 1, keeping current value");
            } else if threshold != next.fail_threshold {
                changed.push(format!(
                    "ping.fail_threshold: {} -> {}",
                    next.fail_threshold, threshold
                ));
                next.fail_threshold = threshold;
            }
        }
        if let Some(secs) = raw.ping.timeout_seconds {
            if secs == 0 {
                warn!("ping.timeout_seconds must be positive, keeping current value");
            } else if Duration::from_secs(secs) != next.probe_timeout {
                changed.push(format!(
                    "ping.timeout_seconds: {} -> {}",
                    next.probe_timeout.as_secs(),
                    secs
                ));
                next.probe_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(size) = raw.ping.packet_size
            && size != next.packet_size
        {
            changed.push(format!("ping.packet_size: {} -> {}", next.packet_size, size));
            next.packet_size = size;
        }
        if let Some(size) = raw.ping.history_size {
            if size == 0 {
                warn!("ping.history_size must be at least 1, keeping current value");
            } else if size != next.history_capacity {
                changed.push(format!(
                    "ping.history_size: {} -> {}",
                    next.history_capacity, size
                ));
                next.history_capacity = size;
            }
        }
        if let Some(secs) = raw.ip_check.interval_seconds {
            if secs == 0 {
                warn!("ip_check.interval_seconds must be positive, keeping current value");
            } else if Duration::from_secs(secs) != next.ip_check_interval {
                changed.push(format!(
                    "ip_check.interval_seconds: {} -> {}",
                    next.ip_check_interval.as_secs(),
                    secs
                ));
                next.ip_check_interval = Duration::from_secs(secs);
            }
        }
        if let Some(enabled) = raw.notifications.enabled
            && enabled != next.notifications_enabled
        {
            changed.push(format!(
                "notifications.enabled: {} -> {}",
                next.notifications_enabled, enabled
            ));
            next.notifications_enabled = enabled;
        }
        if let Some(sound) = &raw.notifications.sound
            && *sound != next.notification_sound
        {
            changed.push(format!(
                "notifications.sound: {:?} -> {:?}",
                next.notification_sound, sound
            ));
            next.notification_sound = sound.clone();
        }
        if let Some(censor) = raw.notifications.censor_on_change
            && censor != next.censor_ip_on_change
        {
            changed.push(format!(
                "notifications.censor_on_change: {} -> {}",
                next.censor_ip_on_change, censor
            ));
            next.censor_ip_on_change = censor;
        }
        if let Some(lines) = raw.log.tail_lines {
            if lines == 0 {
                warn!("log.tail_lines must be at least 1, keeping current value");
            } else if lines != next.log_tail_lines {
                changed.push(format!(
                    "log.tail_lines: {} -> {}",
                    next.log_tail_lines, lines
                ));
                next.log_tail_lines = lines;
            }
        }

        (next, changed)
    }
}

/// File-backed configuration store with mtime-based hot reload
///
/// `load()` is called once at startup; the engine then calls
/// `check_for_update()` at the top of every tick and swaps in the new
/// snapshot only when the backing file actually changed.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: Config,
    last_modified: Option<SystemTime>,
}

impl ConfigStore {
    /// Create a store for the given path without touching the filesystem
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            current: Config::default(),
            last_modified: None,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot
    pub fn current(&self) -> &Config {
        &self.current
    }

    /// Initial load
    ///
    /// Unreadable or malformed files log a warning and leave the documented
    /// defaults in place. Never fails the daemon.
    pub fn load(&mut self) -> &Config {
        self.last_modified = self.read_mtime();
        match self.read_raw() {
            Ok(raw) => {
                let (merged, changed) = self.current.merged_with(&raw);
                self.current = merged;
                debug!(
                    "configuration loaded from {} ({} field(s) set)",
                    self.path.display(),
                    changed.len()
                );
            }
            Err(err) => {
                warn!(
                    "could not load {}: {err}; using defaults",
                    self.path.display()
                );
            }
        }
        &self.current
    }

    /// Reload if the backing file's modification time changed
    ///
    /// Returns the new snapshot only when a reload happened and parsed
    /// cleanly; a malformed rewrite keeps the current snapshot. A successful
    /// reload logs a summary of every changed field.
    pub fn check_for_update(&mut self) -> Option<Config> {
        let mtime = self.read_mtime();
        if mtime == self.last_modified {
            return None;
        }
        self.last_modified = mtime;

        match self.read_raw() {
            Ok(raw) => {
                let (merged, changed) = self.current.merged_with(&raw);
                if changed.is_empty() {
                    debug!("config file touched but no fields changed");
                    self.current = merged;
                    return None;
                }
                info!("configuration reloaded: {}", changed.join(", "));
                self.current = merged;
                Some(self.current.clone())
            }
            Err(err) => {
                warn!(
                    "config reload failed for {}: {err}; keeping current configuration",
                    self.path.display()
                );
                None
            }
        }
    }

    fn read_mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
    }

    fn read_raw(&self) -> crate::Result<RawConfig> {
        let text = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&text)?)
    }
}
