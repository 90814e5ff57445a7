//! Notification dispatch on official status transitions.
//!
//! Delivery itself lives outside this crate: the dispatcher resolves who
//! should hear about a transition (owner plus notify-enabled shares), filters
//! through per-user preferences and hands a request to the sink. Failures are
//! logged and swallowed; a broken notification channel must never fail a
//! check cycle.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::hysteresis::StatusTransition;
use super::types::CheckResult;
use crate::storage::models::Monitor;
use crate::storage::repository::Storage;

/// Preference domain used for monitor events
pub const NOTIFICATION_DOMAIN: &str = "monitors";

#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub icon_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Fire-and-forget notification delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create_notification(&self, request: NotificationRequest) -> Result<()>;
}

/// Publishes a topic refresh so subscribed clients re-poll; used after a
/// manual maintenance toggle, not for ordinary check ticks
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn trigger_topic_poll(&self, topic: &str);
}

/// Gates whether a notification is actually created for a given user/event.
///
/// `is_admin` and `webhook_config` carry caller context where the host has
/// it; the standalone daemon tracks neither and passes `false` and `None`.
#[async_trait]
pub trait PreferenceResolver: Send + Sync {
    async fn user_wants_event(
        &self,
        user_id: Uuid,
        domain: &str,
        event_key: &str,
        is_admin: bool,
        webhook_config: Option<&serde_json::Value>,
    ) -> bool;
}

/// Sink for the standalone binary: notifications land in the log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn create_notification(&self, request: NotificationRequest) -> Result<()> {
        tracing::info!(
            user = %request.user_id,
            kind = %request.kind,
            "{}: {}",
            request.title,
            request.message
        );
        Ok(())
    }
}

/// Topic publisher for the standalone binary
pub struct LogPublisher;

#[async_trait]
impl TopicPublisher for LogPublisher {
    async fn trigger_topic_poll(&self, topic: &str) {
        tracing::debug!(topic, "topic poll triggered");
    }
}

/// Preference resolver that lets every event through
pub struct AllowAllPreferences;

#[async_trait]
impl PreferenceResolver for AllowAllPreferences {
    async fn user_wants_event(
        &self,
        _user_id: Uuid,
        _domain: &str,
        _event_key: &str,
        _is_admin: bool,
        _webhook_config: Option<&serde_json::Value>,
    ) -> bool {
        true
    }
}

pub struct NotificationDispatcher {
    storage: Arc<dyn Storage>,
    sink: Arc<dyn NotificationSink>,
    preferences: Arc<dyn PreferenceResolver>,
}

impl NotificationDispatcher {
    pub fn new(
        storage: Arc<dyn Storage>,
        sink: Arc<dyn NotificationSink>,
        preferences: Arc<dyn PreferenceResolver>,
    ) -> Self {
        Self { storage, sink, preferences }
    }

    /// Dispatch one official transition to every interested user
    pub async fn dispatch(
        &self,
        monitor: &Monitor,
        transition: StatusTransition,
        result: &CheckResult,
    ) {
        let (event_key, enabled) = match transition {
            StatusTransition::Down => ("monitor-down", monitor.notify_on_down),
            StatusTransition::Recovered => ("monitor-up", monitor.notify_on_up),
            StatusTransition::Degraded => ("monitor-degraded", monitor.notify_on_degraded),
        };

        if !enabled {
            return;
        }

        for user_id in self.resolve_recipients(monitor).await {
            if !self
                .preferences
                .user_wants_event(user_id, NOTIFICATION_DOMAIN, event_key, false, None)
                .await
            {
                continue;
            }

            let request = build_request(monitor, transition, result, user_id, event_key);
            if let Err(e) = self.sink.create_notification(request).await {
                tracing::warn!(
                    monitor = %monitor.uuid,
                    user = %user_id,
                    "failed to create notification: {:#}",
                    e
                );
            }
        }
    }

    /// Owner plus all users whose share carries the notify flag
    async fn resolve_recipients(&self, monitor: &Monitor) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();

        seen.insert(monitor.user_id);
        recipients.push(monitor.user_id);

        match self.storage.get_monitor_shares(monitor.uuid).await {
            Ok(shares) => {
                for share in shares.into_iter().filter(|s| s.notify) {
                    if seen.insert(share.user_id) {
                        recipients.push(share.user_id);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    monitor = %monitor.uuid,
                    "failed to resolve monitor shares, notifying owner only: {:#}",
                    e
                );
            }
        }

        recipients
    }
}

fn build_request(
    monitor: &Monitor,
    transition: StatusTransition,
    result: &CheckResult,
    user_id: Uuid,
    event_key: &str,
) -> NotificationRequest {
    let (title, message) = match transition {
        StatusTransition::Down => (
            format!("{} is down", monitor.name),
            result
                .error_message
                .clone()
                .unwrap_or_else(|| "Service did not respond as expected".to_string()),
        ),
        StatusTransition::Recovered => (
            format!("{} is back up", monitor.name),
            match result.latency_ms {
                Some(latency) => format!("Responding again in {}ms", latency),
                None => "Responding again".to_string(),
            },
        ),
        StatusTransition::Degraded => (
            format!("{} is degraded", monitor.name),
            match result.latency_ms {
                Some(latency) => format!(
                    "Response time {}ms exceeds the {}ms threshold",
                    latency, monitor.degraded_threshold_ms
                ),
                None => "Response time exceeds the configured threshold".to_string(),
            },
        ),
    };

    NotificationRequest {
        user_id,
        kind: event_key.to_string(),
        title,
        message,
        icon_id: monitor.icon_id.clone(),
        metadata: json!({
            "monitorId": monitor.uuid,
            "status": result.status,
            "statusCode": result.status_code,
            "latencyMs": result.latency_ms,
            "checkedAt": result.checked_at,
        }),
    }
}
