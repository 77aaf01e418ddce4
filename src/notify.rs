//! Offline notification capability.
//!
//! When a message arrives for a user with no live connection, the relay
//! hands the payload to this sink. The default implementation only logs:
//! no push-notification integration exists yet, and making the gap a
//! pluggable interface keeps it visible instead of buried in a handler.

use serde_json::Value;

/// Capability interface for reaching users who are not connected.
pub trait NotificationSink: Send + Sync {
    fn notify_offline(&self, user_id: &str, payload: &Value);
}

/// Default sink: records the would-be push and drops it.
#[derive(Debug, Default)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn notify_offline(&self, user_id: &str, payload: &Value) {
        tracing::debug!(
            user_id = %user_id,
            event = payload.get("event").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "recipient offline, would need push notification"
        );
    }
}
