//! Notifications (§10.5): a fire-and-forget `Notifier` the pipeline calls
//! after each terminal outcome. Grounded on the webhook-dispatch shape of
//! `rust-modules/src/monitoring/alerts.rs`, trimmed to the one channel the
//! spec actually needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeEvent {
    /// Unique per dispatch, so a flaky webhook endpoint can dedup retried
    /// deliveries of the same outcome.
    pub event_id: Uuid,
    pub opportunity_id: String,
    pub success: bool,
    pub profit_lamports: i128,
    pub signatures: Vec<String>,
    pub error: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OutcomeEvent);
}

/// Default notifier when `notifications.enabled = false`.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &OutcomeEvent) {}
}

pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &OutcomeEvent) {
        if let Err(e) = self.http.post(&self.url).json(event).send().await {
            warn!(error = %e, "webhook notification failed");
        }
    }
}
