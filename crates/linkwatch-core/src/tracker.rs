//! Public IP tracker
//!
//! Walks an ordered chain of public-IP providers, attaches geolocation from
//! a primary provider with one fallback, and detects address changes. The
//! tracker retains the previous record whenever a cycle fails, so readers
//! always see the last known address.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::traits::{GeoInfo, GeoProvider, PublicIpProvider};

/// Upper bound on a single provider attempt
///
/// Belt over the providers' own HTTP timeouts: even a misbehaving
/// implementation cannot stall the loop longer than this per attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(4);

/// Last successfully resolved public IP with its geolocation
///
/// Replaced wholesale on every successful resolution, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRecord {
    /// Public address as reported by the winning provider
    pub ip: String,
    /// Country name, or `"Unknown"` when geolocation failed
    pub country: String,
    /// City name, or `"Unknown"` when geolocation failed
    pub city: String,
    /// When this record was resolved
    pub fetched_at: DateTime<Utc>,
}

/// What one resolution cycle produced
#[derive(Debug, Clone, PartialEq)]
pub enum IpCheckOutcome {
    /// First successful resolution of this run
    Initial(IpRecord),
    /// The address differs from the previously recorded one
    Changed {
        previous: String,
        record: IpRecord,
    },
    /// Same address as before (record refreshed in place)
    Unchanged,
    /// Every provider failed; the previous record is retained
    Skipped,
}

/// Periodic public-IP and geolocation tracker
pub struct IpTracker {
    ip_providers: Vec<Box<dyn PublicIpProvider>>,
    geo_providers: Vec<Box<dyn GeoProvider>>,
    clock: Arc<dyn Clock>,
    current: Option<IpRecord>,
    last_check: Option<DateTime<Utc>>,
}

impl IpTracker {
    /// Create a tracker over an ordered provider chain
    ///
    /// `geo_providers` is primary-first; only the first two are consulted
    /// per cycle (primary plus one fallback).
    pub fn new(
        ip_providers: Vec<Box<dyn PublicIpProvider>>,
        geo_providers: Vec<Box<dyn GeoProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ip_providers,
            geo_providers,
            clock,
            current: None,
            last_check: None,
        }
    }

    /// Last successfully resolved record, if any
    pub fn current(&self) -> Option<&IpRecord> {
        self.current.as_ref()
    }

    /// Whether a check is due at `now` given the configured cadence
    ///
    /// The first call of a run is always due, so the initial resolution
    /// happens on the first tick rather than one interval in.
    pub fn check_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_check {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed >= chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX)
            }
        }
    }

    /// Run one resolution cycle
    ///
    /// Address resolution and geolocation are independent: a geolocation
    /// failure never discards a successfully resolved address.
    pub async fn resolve(&mut self) -> IpCheckOutcome {
        let now = self.clock.now();
        self.last_check = Some(now);

        let Some(ip) = self.fetch_public_ip().await else {
            warn!("all public IP providers failed; keeping previous record");
            return IpCheckOutcome::Skipped;
        };

        let geo = self.fetch_geo(ip).await;
        let record = IpRecord {
            ip: ip.to_string(),
            country: geo.country,
            city: geo.city,
            fetched_at: now,
        };

        let outcome = match &self.current {
            None => {
                info!("initial public IP: {} ({}, {})", record.ip, record.country, record.city);
                IpCheckOutcome::Initial(record.clone())
            }
            Some(previous) if previous.ip != record.ip => {
                info!("public IP changed: {} -> {}", previous.ip, record.ip);
                IpCheckOutcome::Changed {
                    previous: previous.ip.clone(),
                    record: record.clone(),
                }
            }
            Some(_) => IpCheckOutcome::Unchanged,
        };

        self.current = Some(record);
        outcome
    }

    /// Try each address provider in order; first non-empty answer wins
    async fn fetch_public_ip(&self) -> Option<IpAddr> {
        for provider in &self.ip_providers {
            match tokio::time::timeout(ATTEMPT_TIMEOUT, provider.fetch_ip()).await {
                Ok(Ok(ip)) => {
                    debug!("public IP {} via {}", ip, provider.name());
                    return Some(ip);
                }
                Ok(Err(err)) => {
                    debug!("IP provider {} failed: {err}", provider.name());
                }
                Err(_) => {
                    debug!("IP provider {} timed out", provider.name());
                }
            }
        }
        None
    }

    /// Primary geolocation provider with one fallback
    async fn fetch_geo(&self, ip: IpAddr) -> GeoInfo {
        for provider in self.geo_providers.iter().take(2) {
            match tokio::time::timeout(ATTEMPT_TIMEOUT, provider.lookup(ip)).await {
                Ok(Ok(geo)) => return geo,
                Ok(Err(err)) => {
                    debug!("geo provider {} failed: {err}", provider.name());
                }
                Err(_) => {
                    debug!("geo provider {} timed out", provider.name());
                }
            }
        }
        warn!("geolocation unavailable for {ip}; using Unknown");
        GeoInfo::unknown()
    }
}

/// Mask the last three dotted-decimal octets of an IPv4 address
///
/// Used for user-facing change notifications when censoring is enabled; the
/// stored record always keeps the real address. Non-IPv4 strings are
/// returned unchanged.
pub fn censor_ip(ip: &str) -> String {
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() == 4 {
        format!("{}.*.*.*", octets[0])
    } else {
        ip.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedIpProvider {
        answers: Mutex<Vec<Result<IpAddr>>>,
    }

    impl ScriptedIpProvider {
        fn new(answers: Vec<Result<IpAddr>>) -> Self {
            Self {
                answers: Mutex::new(answers),
            }
        }
    }

    #[async_trait]
    impl PublicIpProvider for ScriptedIpProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_ip(&self) -> Result<IpAddr> {
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                return Err(Error::resolution("script exhausted"));
            }
            answers.remove(0)
        }
    }

    struct FailingGeo;

    #[async_trait]
    impl GeoProvider for FailingGeo {
        fn name(&self) -> &'static str {
            "failing-geo"
        }

        async fn lookup(&self, _ip: IpAddr) -> Result<GeoInfo> {
            Err(Error::resolution("unreachable"))
        }
    }

    struct FixedGeo(GeoInfo);

    #[async_trait]
    impl GeoProvider for FixedGeo {
        fn name(&self) -> &'static str {
            "fixed-geo"
        }

        async fn lookup(&self, _ip: IpAddr) -> Result<GeoInfo> {
            Ok(self.0.clone())
        }
    }

    fn tracker_with(
        answers: Vec<Result<IpAddr>>,
        geo: Vec<Box<dyn GeoProvider>>,
    ) -> IpTracker {
        IpTracker::new(
            vec![Box::new(ScriptedIpProvider::new(answers))],
            geo,
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    #[tokio::test]
    async fn first_resolution_is_initial_not_change() {
        let mut tracker = tracker_with(
            vec![Ok("1.2.3.4".parse().unwrap())],
            vec![Box::new(FixedGeo(GeoInfo {
                country: "Iceland".into(),
                city: "Reykjavik".into(),
            }))],
        );

        match tracker.resolve().await {
            IpCheckOutcome::Initial(record) => {
                assert_eq!(record.ip, "1.2.3.4");
                assert_eq!(record.country, "Iceland");
            }
            other => panic!("expected Initial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn change_detected_against_previous_address() {
        let mut tracker = tracker_with(
            vec![Ok("1.2.3.4".parse().unwrap()), Ok("5.6.7.8".parse().unwrap())],
            vec![Box::new(FailingGeo)],
        );

        tracker.resolve().await;
        match tracker.resolve().await {
            IpCheckOutcome::Changed { previous, record } => {
                assert_eq!(previous, "1.2.3.4");
                assert_eq!(record.ip, "5.6.7.8");
            }
            other => panic!("expected Changed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_cycle_retains_previous_record() {
        let mut tracker = tracker_with(
            vec![
                Ok("1.2.3.4".parse().unwrap()),
                Err(Error::resolution("down")),
            ],
            vec![Box::new(FailingGeo)],
        );

        tracker.resolve().await;
        assert_eq!(tracker.resolve().await, IpCheckOutcome::Skipped);
        assert_eq!(tracker.current().unwrap().ip, "1.2.3.4");
    }

    #[tokio::test]
    async fn geo_failure_never_discards_the_address() {
        let mut tracker = tracker_with(
            vec![Ok("1.2.3.4".parse().unwrap())],
            vec![Box::new(FailingGeo), Box::new(FailingGeo)],
        );

        tracker.resolve().await;
        let record = tracker.current().unwrap();
        assert_eq!(record.ip, "1.2.3.4");
        assert_eq!(record.country, "Unknown");
        assert_eq!(record.city, "Unknown");
    }

    #[tokio::test]
    async fn fallback_geo_provider_is_consulted() {
        let mut tracker = tracker_with(
            vec![Ok("1.2.3.4".parse().unwrap())],
            vec![
                Box::new(FailingGeo),
                Box::new(FixedGeo(GeoInfo {
                    country: "Portugal".into(),
                    city: "Lisbon".into(),
                })),
            ],
        );

        tracker.resolve().await;
        assert_eq!(tracker.current().unwrap().city, "Lisbon");
    }

    #[test]
    fn due_gating_follows_the_interval() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let mut tracker = IpTracker::new(vec![], vec![], clock.clone());

        let interval = Duration::from_secs(10);
        assert!(tracker.check_due(clock.now(), interval));

        tracker.last_check = Some(clock.now());
        clock.advance(chrono::Duration::seconds(9));
        assert!(!tracker.check_due(clock.now(), interval));
        clock.advance(chrono::Duration::seconds(1));
        assert!(tracker.check_due(clock.now(), interval));
    }

    #[test]
    fn censor_masks_last_three_octets() {
        assert_eq!(censor_ip("1.2.3.4"), "1.*.*.*");
        assert_eq!(censor_ip("203.0.113.9"), "203.*.*.*");
        // Not dotted-quad: left alone
        assert_eq!(censor_ip("2001:db8::1"), "2001:db8::1");
    }
}
