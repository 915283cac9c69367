//! Latency history buffer
//!
//! Fixed-capacity ring of probe samples. The prober appends one sample per
//! tick; the oldest sample is evicted when the buffer is full. The state
//! publisher reads snapshots, never the live buffer.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Marker written to the history file for a probe that got no reply
///
/// Deliberately non-numeric so no downstream consumer can confuse it with a
/// valid latency, including `0.0`.
pub const TIMEOUT_MARKER: &str = "TIMEOUT";

/// One probe outcome as stored in history
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Round-trip latency in milliseconds, one decimal place of precision
    Latency(f64),
    /// The probe got no reply within the configured timeout
    Timeout,
}

impl Sample {
    /// Build a latency sample, discarding sub-millisecond precision beyond
    /// one decimal place and clamping negatives to zero
    pub fn latency(ms: f64) -> Self {
        let ms = if ms.is_finite() { ms.max(0.0) } else { 0.0 };
        Self::Latency((ms * 10.0).round() / 10.0)
    }

    /// Whether this sample is the timeout sentinel
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Latency in milliseconds, or `None` for the timeout sentinel
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Self::Latency(ms) => Some(*ms),
            Self::Timeout => None,
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latency(ms) => write!(f, "{ms:.1}"),
            Self::Timeout => f.write_str(TIMEOUT_MARKER),
        }
    }
}

impl FromStr for Sample {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == TIMEOUT_MARKER {
            return Ok(Self::Timeout);
        }
        let ms: f64 = s
            .parse()
            .map_err(|_| crate::Error::publish(format!("unparseable history entry: {s:?}")))?;
        if ms < 0.0 {
            return Err(crate::Error::publish(format!(
                "negative latency in history entry: {s:?}"
            )));
        }
        Ok(Self::latency(ms))
    }
}

/// Fixed-capacity FIFO buffer of probe samples
#[derive(Debug)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer holding at most `capacity` samples
    ///
    /// A zero capacity is rejected by config validation before it gets here,
    /// but the buffer still guards against it.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when at capacity
    pub fn push(&mut self, sample: Sample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Change the capacity, trimming the oldest samples if shrinking
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Read-only snapshot, oldest first / newest last
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }
}
