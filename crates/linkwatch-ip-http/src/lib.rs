// # HTTP Public-IP and Geolocation Providers
//
// This crate provides the production lookup implementations for linkwatch.
//
// ## Purpose
//
// The IP tracker in `linkwatch-core` walks an ordered chain of
// `PublicIpProvider`s and a primary/fallback pair of `GeoProvider`s. This
// crate supplies both, backed by public HTTP services:
//
// - Address: api.ipify.org, ifconfig.me, icanhazip.com (plain-text bodies)
// - Geolocation: ip-api.com (primary), ipwho.is (fallback)
//
// ## Timeouts
//
// Every client carries its own short request timeout so a slow provider
// costs a bounded slice of one tick; the tracker adds a second bound on
// top. Providers perform exactly one attempt per call; ordering, fallback
// and retry cadence are owned by the tracker.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use linkwatch_core::traits::{GeoInfo, GeoProvider, PublicIpProvider};
use linkwatch_core::{Error, Result};

/// Per-request timeout for lookup services
const HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Public-IP services tried in order by the default chain
const DEFAULT_IP_SERVICES: &[(&str, &str)] = &[
    ("ipify", "https://api.ipify.org"),
    ("ifconfig.me", "https://ifconfig.me/ip"),
    ("icanhazip", "https://icanhazip.com"),
];

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Public-IP provider for services that answer with a bare address body
pub struct PlainTextIpProvider {
    name: &'static str,
    url: String,
    client: reqwest::Client,
}

impl PlainTextIpProvider {
    /// Create a provider for the given service
    pub fn new(name: &'static str, url: impl Into<String>) -> Self {
        Self {
            name,
            url: url.into(),
            client: http_client(),
        }
    }
}

#[async_trait]
impl PublicIpProvider for PlainTextIpProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_ip(&self) -> Result<IpAddr> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::resolution(format!("{}: request failed: {e}", self.name)))?;

        if !response.status().is_success() {
            return Err(Error::resolution(format!(
                "{}: HTTP {}",
                self.name,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::resolution(format!("{}: unreadable body: {e}", self.name)))?;
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(Error::resolution(format!("{}: empty body", self.name)));
        }

        trimmed
            .parse()
            .map_err(|_| Error::resolution(format!("{}: not an IP address: {trimmed:?}", self.name)))
    }
}

/// The default ordered address-provider chain
pub fn default_ip_chain() -> Vec<Box<dyn PublicIpProvider>> {
    DEFAULT_IP_SERVICES
        .iter()
        .map(|(name, url)| Box::new(PlainTextIpProvider::new(name, *url)) as Box<dyn PublicIpProvider>)
        .collect()
}

/// The default geolocation providers, primary first
pub fn default_geo_chain() -> Vec<Box<dyn GeoProvider>> {
    vec![
        Box::new(IpApiGeoProvider::new()),
        Box::new(IpWhoIsGeoProvider::new()),
    ]
}

/// Primary geolocation provider (ip-api.com)
pub struct IpApiGeoProvider {
    client: reqwest::Client,
}

/// Successful ip-api.com response subset
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    message: String,
}

impl IpApiGeoProvider {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for IpApiGeoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeoProvider for IpApiGeoProvider {
    fn name(&self) -> &'static str {
        "ip-api.com"
    }

    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo> {
        let url = format!("http://ip-api.com/json/{ip}?fields=status,message,country,city");
        let response: IpApiResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::resolution(format!("ip-api.com: request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::resolution(format!("ip-api.com: bad payload: {e}")))?;

        if response.status != "success" {
            return Err(Error::resolution(format!(
                "ip-api.com: {}",
                if response.message.is_empty() {
                    "non-success status".to_string()
                } else {
                    response.message
                }
            )));
        }

        debug!("geolocated {ip} via ip-api.com");
        Ok(GeoInfo {
            country: non_empty_or_unknown(response.country),
            city: non_empty_or_unknown(response.city),
        })
    }
}

/// Fallback geolocation provider (ipwho.is)
pub struct IpWhoIsGeoProvider {
    client: reqwest::Client,
}

/// ipwho.is response subset
#[derive(Debug, Deserialize)]
struct IpWhoIsResponse {
    success: bool,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
}

impl IpWhoIsGeoProvider {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for IpWhoIsGeoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeoProvider for IpWhoIsGeoProvider {
    fn name(&self) -> &'static str {
        "ipwho.is"
    }

    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo> {
        let url = format!("https://ipwho.is/{ip}");
        let response: IpWhoIsResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::resolution(format!("ipwho.is: request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::resolution(format!("ipwho.is: bad payload: {e}")))?;

        if !response.success {
            return Err(Error::resolution("ipwho.is: lookup reported failure"));
        }

        debug!("geolocated {ip} via ipwho.is");
        Ok(GeoInfo {
            country: non_empty_or_unknown(response.country),
            city: non_empty_or_unknown(response.city),
        })
    }
}

fn non_empty_or_unknown(value: String) -> String {
    if value.trim().is_empty() {
        "Unknown".to_string()
    } else {
        value
    }
}
