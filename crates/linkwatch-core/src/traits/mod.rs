//! Core traits for the connectivity monitor
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Prober`]: Issue a single connectivity probe
//! - [`PublicIpProvider`]: Look up the machine's public IP address
//! - [`GeoProvider`]: Look up geolocation for an address
//! - [`NotificationSink`]: Receive filtered notification triples

pub mod ip_provider;
pub mod notification_sink;
pub mod prober;

pub use ip_provider::{GeoInfo, GeoProvider, PublicIpProvider};
pub use notification_sink::NotificationSink;
pub use prober::{ProbeOutcome, Prober};
