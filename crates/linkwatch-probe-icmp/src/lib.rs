// # ICMP Echo Prober
//
// This crate provides the production probe implementation for linkwatch.
//
// ## Purpose
//
// One ICMP echo request per engine tick against the configured host, with
// the engine's timeout and payload size. The prober holds two raw-socket
// clients (IPv4 and IPv6) for the daemon's lifetime; a per-probe pinger is
// cheap and carries a random identifier so replies cannot be confused with
// another process's probes.
//
// ## Failure Semantics
//
// Everything short of a reply within the timeout (lost packet, closed
// socket, unresolvable hostname) is reported as `ProbeOutcome::NoReply`.
// The outage state machine owns the interpretation; the prober never
// retries internally.
//
// ## Privileges
//
// Raw ICMP sockets require elevated privileges on most platforms
// (CAP_NET_RAW on Linux). Creating the clients fails at daemon startup
// when the privilege is missing, which surfaces as the one fatal error
// class.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tracing::debug;

use linkwatch_core::traits::{ProbeOutcome, Prober};
use linkwatch_core::{Error, Result};

/// ICMP echo prober backed by `surge-ping`
pub struct IcmpProber {
    client_v4: Client,
    client_v6: Client,
    sequence: AtomicU16,
}

impl IcmpProber {
    /// Create the prober and its raw-socket clients
    ///
    /// # Returns
    ///
    /// - `Ok(IcmpProber)`: both clients created
    /// - `Err(Error::Startup)`: raw sockets unavailable (missing privilege)
    pub fn new() -> Result<Self> {
        let client_v4 = Client::new(&Config::default())
            .map_err(|e| Error::startup(format!("cannot create ICMPv4 client: {e}")))?;
        let client_v6 = Client::new(&Config::builder().kind(ICMP::V6).build())
            .map_err(|e| Error::startup(format!("cannot create ICMPv6 client: {e}")))?;

        Ok(Self {
            client_v4,
            client_v6,
            sequence: AtomicU16::new(0),
        })
    }

    /// Resolve `host` to an address, preferring IPv4
    ///
    /// Literal addresses skip resolution entirely (the default target is
    /// one), so the probe path has no DNS dependency unless a hostname is
    /// configured.
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
        match tokio::net::lookup_host((host, 0)).await {
            Ok(addrs) => pick_address(addrs.map(|a| a.ip())),
            Err(err) => {
                debug!("cannot resolve {host}: {err}");
                None
            }
        }
    }
}

/// First IPv4 address if any, otherwise the first address of any family
fn pick_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let addrs: Vec<IpAddr> = addrs.into_iter().collect();
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, host: &str, timeout: Duration, packet_size: usize) -> ProbeOutcome {
        let Some(ip) = self.resolve(host).await else {
            return ProbeOutcome::NoReply;
        };

        let client = if ip.is_ipv4() {
            &self.client_v4
        } else {
            &self.client_v6
        };

        let payload = vec![0u8; packet_size];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        match pinger.ping(PingSequence(sequence), &payload).await {
            Ok((_packet, latency)) => ProbeOutcome::Reply {
                latency_ms: latency.as_secs_f64() * 1000.0,
            },
            Err(err) => {
                debug!("probe to {ip} failed: {err}");
                ProbeOutcome::NoReply
            }
        }
    }
}
