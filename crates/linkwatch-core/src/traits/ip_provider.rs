// # Public IP and Geolocation Provider Traits
//
// Defines the interfaces for the lookup chain behind the IP tracker.
//
// ## Implementations
//
// - HTTP services: `linkwatch-ip-http` crate (ipify, ifconfig.me,
//   icanhazip; ip-api.com and ipwho.is for geolocation)
// - Test doubles: scripted providers in the contract tests
//
// Providers are tried in order by the tracker; each attempt is
// independently time-boxed so a hung endpoint can never stall the probe
// loop beyond its bound. Providers must not cache, retry, or fall back
// internally; chain semantics are owned by the tracker.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::Result;

/// Country/city pair resolved for an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country: String,
    pub city: String,
}

impl GeoInfo {
    /// Placeholder used when every geolocation provider failed
    pub fn unknown() -> Self {
        Self {
            country: "Unknown".to_string(),
            city: "Unknown".to_string(),
        }
    }
}

/// Trait for public-IP lookup implementations
#[async_trait]
pub trait PublicIpProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    /// Fetch the machine's current public IP address
    ///
    /// One attempt, bounded by the implementation's own short timeout.
    async fn fetch_ip(&self) -> Result<IpAddr>;
}

/// Trait for geolocation lookup implementations
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    /// Resolve country and city for the given address
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo>;
}
