// # Notification Sink Trait
//
// The delivery mechanism (desktop notification, webhook, whatever the
// platform offers) lives outside the daemon core. The core hands it
// `(title, body, category)` triples that already passed the notification
// gate; the sink owns nothing but delivery.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for notification delivery implementations
///
/// Delivery is fire-and-forget from the engine's perspective: a failed
/// `deliver` is logged by the gate and never escalates.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification
    ///
    /// `category` is the gate's event category token (e.g. `"OUTAGE"`);
    /// `None` for informational notifications.
    async fn deliver(&self, title: &str, body: &str, category: Option<&str>) -> Result<()>;
}
