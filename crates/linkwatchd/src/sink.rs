//! Stand-in notification sink
//!
//! Actual delivery (desktop notification, tray popup) belongs to the
//! platform-specific presentation layer shipped separately. The daemon
//! links a sink that surfaces every gated notification in its own log, so
//! headless deployments still see the events.

use async_trait::async_trait;
use tracing::info;

use linkwatch_core::Result;
use linkwatch_core::traits::NotificationSink;

/// Sink that writes notifications to the daemon log
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(&self, title: &str, body: &str, category: Option<&str>) -> Result<()> {
        match category {
            Some(category) => info!("notification [{category}] {title}: {body}"),
            None => info!("notification {title}: {body}"),
        }
        Ok(())
    }
}
