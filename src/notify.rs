//! One-way delivery of user notifications.
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

/// A notification to show to the user.
///
/// Notifications with the same `id` replace each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub body: String,
}

impl Notification {
    /// Creates a notification. With `replace_previous` every notification gets id 0, so only the
    /// latest one stays visible; otherwise the id is the current time in milliseconds.
    pub fn new(title: impl Into<String>, body: impl Into<String>, replace_previous: bool) -> Self {
        let id = if replace_previous {
            0
        } else {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as u64)
                .unwrap_or_default()
        };

        Self {
            id,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Destination for notifications. `notify` must never block the caller.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink forwarding notifications to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<Notification>);

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        if self.0.send(notification).is_err() {
            #[cfg(feature = "logging")]
            log::warn!("notification dropped, receiver is gone");
        }
    }
}
