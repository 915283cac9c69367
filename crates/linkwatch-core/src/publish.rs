// # State Publisher
//
// File-based IPC surface consumed by the presentation layer.
//
// ## Purpose
//
// The daemon is the sole writer of a small state directory; any number of
// readers poll it on their own timers. There is no push channel.
//
// ## Write Discipline
//
// - Atomic replace: status, history and ip are written to a temporary file
//   and renamed into place, so a reader never observes a truncated value
// - Append-only: the event log is opened in append mode
// - Change-gated: each value is rewritten only when it actually differs
//   from what is already on disk, bounding steady-state I/O
//
// ## Files
//
// ```text
// status          STARTING | ONLINE | OFFLINE
// history         one sample per line, newest last, "42.3" or "TIMEOUT"
// ip              address|country|city, or RESOLVING
// events.log      [2025-01-09 12:00:00] message
// linkwatchd.pid  daemon process id (liveness marker)
// ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::history::Sample;
use crate::outage::ConnectionStatus;
use crate::tracker::IpRecord;

/// Status file name
pub const STATUS_FILE: &str = "status";
/// History file name
pub const HISTORY_FILE: &str = "history";
/// IP record file name
pub const IP_FILE: &str = "ip";
/// Event log file name
pub const LOG_FILE: &str = "events.log";
/// Pid (liveness marker) file name
pub const PID_FILE: &str = "linkwatchd.pid";

/// Placeholder published before the first successful IP resolution
pub const IP_RESOLVING_PLACEHOLDER: &str = "RESOLVING";

/// Publisher for the daemon's state directory
///
/// Tracks the last written value per file so unchanged state costs no I/O.
/// All publish errors are non-fatal; the engine logs them and retries on
/// the next tick with fresh values.
#[derive(Debug)]
pub struct StatePublisher {
    dir: PathBuf,
    last_status: Option<String>,
    last_history: Option<String>,
    last_ip: Option<String>,
}

impl StatePublisher {
    /// Create a publisher rooted at `dir` without touching the filesystem
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            last_status: None,
            last_history: None,
            last_ip: None,
        }
    }

    /// State directory root
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Create the state directory and write the liveness marker
    ///
    /// The only fatal path in the publisher: a daemon that cannot create its
    /// state surface has nothing to offer and must not start. A pid file
    /// left behind by a dead process is overwritten; one belonging to a live
    /// process aborts startup.
    pub async fn startup(&mut self, pid: u32) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::startup(format!(
                "cannot create state directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let pid_path = self.path(PID_FILE);
        if let Some(existing) = read_pid(&pid_path).await {
            if existing != pid && pid_alive(existing) {
                return Err(Error::startup(format!(
                    "another instance appears to be running (pid {existing})"
                )));
            }
            tracing::debug!("replacing stale pid file (pid {existing})");
        }
        self.write_atomic(PID_FILE, &format!("{pid}\n"))
            .await
            .map_err(|e| Error::startup(format!("cannot write pid file: {e}")))?;
        Ok(())
    }

    /// Remove the liveness marker on clean shutdown
    pub async fn shutdown(&self) -> Result<()> {
        match fs::remove_file(self.path(PID_FILE)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::publish(format!("cannot remove pid file: {e}"))),
        }
    }

    /// Publish the connection status token
    pub async fn publish_status(&mut self, status: ConnectionStatus) -> Result<()> {
        let content = format!("{}\n", status.as_token());
        if self.last_status.as_deref() == Some(content.as_str()) {
            return Ok(());
        }
        self.write_atomic(STATUS_FILE, &content).await?;
        self.last_status = Some(content);
        Ok(())
    }

    /// Publish the history snapshot, newest last
    pub async fn publish_history(&mut self, samples: &[Sample]) -> Result<()> {
        let mut content = String::new();
        for sample in samples {
            content.push_str(&sample.to_string());
            content.push('\n');
        }
        if self.last_history.as_deref() == Some(content.as_str()) {
            return Ok(());
        }
        self.write_atomic(HISTORY_FILE, &content).await?;
        self.last_history = Some(content);
        Ok(())
    }

    /// Publish the IP record, or the resolving placeholder when `None`
    pub async fn publish_ip(&mut self, record: Option<&IpRecord>) -> Result<()> {
        let content = match record {
            Some(r) => format!("{}|{}|{}\n", r.ip, r.country, r.city),
            None => format!("{IP_RESOLVING_PLACEHOLDER}\n"),
        };
        if self.last_ip.as_deref() == Some(content.as_str()) {
            return Ok(());
        }
        self.write_atomic(IP_FILE, &content).await?;
        self.last_ip = Some(content);
        Ok(())
    }

    /// Append one timestamped line to the event log
    pub async fn log_event(&self, at: DateTime<Utc>, message: &str) -> Result<()> {
        let line = format!("[{}] {message}\n", at.format("%Y-%m-%d %H:%M:%S"));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(LOG_FILE))
            .await
            .map_err(|e| Error::publish(format!("cannot open event log: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::publish(format!("cannot append to event log: {e}")))?;
        Ok(())
    }

    /// Write-then-rename so readers never see a partial value
    async fn write_atomic(&self, name: &str, content: &str) -> Result<()> {
        let target = self.path(name);
        let temp = self.dir.join(format!("{name}.tmp"));

        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| Error::publish(format!("cannot create {}: {e}", temp.display())))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::publish(format!("cannot write {}: {e}", temp.display())))?;
        file.flush()
            .await
            .map_err(|e| Error::publish(format!("cannot flush {}: {e}", temp.display())))?;
        drop(file);

        fs::rename(&temp, &target).await.map_err(|e| {
            Error::publish(format!(
                "cannot rename {} to {}: {e}",
                temp.display(),
                target.display()
            ))
        })?;
        Ok(())
    }
}

// ──────────────── reader side ────────────────
//
// The presentation layer ships separately; these helpers define the parse
// side of the protocol and keep the round-trip testable from one place.

/// Parse the status file content
pub fn parse_status(content: &str) -> Option<ConnectionStatus> {
    ConnectionStatus::from_token(content)
}

/// Parse history file content into samples, oldest first
///
/// Unparseable lines are skipped; a reader polling mid-write of an older
/// daemon must tolerate garbage rather than fail the whole snapshot.
pub fn parse_history(content: &str) -> Vec<Sample> {
    content
        .lines()
        .filter_map(|line| line.parse::<Sample>().ok())
        .collect()
}

/// Parsed IP state as seen by a reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpState {
    /// No resolution has succeeded yet
    Resolving,
    /// `address|country|city` triple
    Resolved {
        ip: String,
        country: String,
        city: String,
    },
}

/// Parse the ip file content
pub fn parse_ip(content: &str) -> Option<IpState> {
    let line = content.lines().next()?.trim();
    if line == IP_RESOLVING_PLACEHOLDER {
        return Some(IpState::Resolving);
    }
    let mut parts = line.splitn(3, '|');
    let ip = parts.next()?.to_string();
    let country = parts.next()?.to_string();
    let city = parts.next()?.to_string();
    if ip.is_empty() {
        return None;
    }
    Some(IpState::Resolved { ip, country, city })
}

/// Read the last `lines` lines of the event log
pub async fn read_log_tail(dir: &Path, lines: usize) -> Result<Vec<String>> {
    let content = match fs::read_to_string(dir.join(LOG_FILE)).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::publish(format!("cannot read event log: {e}"))),
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|s| s.to_string()).collect())
}

/// Read the pid from the liveness marker, if present and well-formed
pub async fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).await.ok()?;
    content.trim().parse().ok()
}

/// Whether the process behind the liveness marker is still running
///
/// Absence of the marker, a malformed pid, or a dead process all mean "not
/// running"; readers show last-known state with a staleness indicator.
pub async fn daemon_running(dir: &Path) -> bool {
    match read_pid(&dir.join(PID_FILE)).await {
        Some(pid) => pid_alive(pid),
        None => false,
    }
}

/// Signal-0 liveness probe
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Non-unix fallback: presence of a well-formed pid counts as alive
#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    true
}
