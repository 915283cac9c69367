//! Notification gate
//!
//! Pure filter-then-forward stage between the engine and the external
//! delivery sink. The gate drops events when notifications are disabled and
//! suppresses outage events inside a mute window; everything that passes is
//! handed to the sink fire-and-forget.
//!
//! Mute policy: the mute window applies to the `OUTAGE` category only.
//! Restoration and IP-change events always pass an active mute window, so a
//! muted user still learns when the connection comes back or the address
//! moves. The master `notifications.enabled` switch drops everything.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::traits::NotificationSink;

/// Event category attached to an outgoing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    /// Connectivity lost
    Outage,
    /// Connectivity restored after an outage
    Restored,
    /// Public IP address changed
    IpChange,
}

impl EventCategory {
    /// Stable token handed to the sink
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outage => "OUTAGE",
            Self::Restored => "RESTORED",
            Self::IpChange => "IP_CHANGE",
        }
    }
}

/// One notification as produced by the engine, before gating
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub category: EventCategory,
}

impl Notification {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        category: EventCategory,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            category,
        }
    }
}

/// Mute-window and enablement filter in front of the sink
pub struct NotificationGate {
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    enabled: bool,
    sound: String,
    mute_until: Option<DateTime<Utc>>,
}

impl NotificationGate {
    /// Create a gate forwarding to `sink`, configured from `config`
    pub fn new(sink: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            sink,
            clock,
            enabled: config.notifications_enabled,
            sound: config.notification_sound.clone(),
            mute_until: None,
        }
    }

    /// Pick up the notification fields of a reloaded config
    pub fn apply_config(&mut self, config: &Config) {
        self.enabled = config.notifications_enabled;
        self.sound = config.notification_sound.clone();
    }

    /// Suppress outage notifications until `until`; `None` clears the window
    pub fn set_mute_until(&mut self, until: Option<DateTime<Utc>>) {
        self.mute_until = until;
    }

    /// Sound name the external delivery layer should use
    pub fn sound(&self) -> &str {
        &self.sound
    }

    /// Whether an outage notification would currently be muted
    pub fn outages_muted(&self) -> bool {
        self.mute_until
            .is_some_and(|until| self.clock.now() < until)
    }

    /// Filter the notification and forward it to the sink
    ///
    /// Delivery runs on a detached task; a sink failure is logged and never
    /// escalates to the caller.
    pub fn notify(&self, notification: Notification) {
        if !self.enabled {
            debug!(
                "notifications disabled, dropping {:?}: {}",
                notification.category, notification.title
            );
            return;
        }
        if notification.category == EventCategory::Outage && self.outages_muted() {
            debug!("outage notification muted: {}", notification.title);
            return;
        }

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let category = notification.category.as_str();
            if let Err(err) = sink
                .deliver(&notification.title, &notification.body, Some(category))
                .await
            {
                warn!("notification delivery failed: {err}");
            }
        });
    }
}
