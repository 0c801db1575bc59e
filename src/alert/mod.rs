//! Operational alerting channel.
//!
//! Background stage failures are never returned to a caller; they are
//! logged and posted here. A Slack incoming webhook is used when one is
//! configured, otherwise alerts only go to the log.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsCollector;

/// Category of an alert, used for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A collaborator call failed; the stage will be retried next cycle.
    Transient,
    /// Registry content is inconsistent.
    Integrity,
    /// A remote job failed or produced no usable output.
    JobFailure,
    /// A remote job timed out and was rescheduled with a larger budget.
    JobRetry,
    /// Caching was turned off or on.
    Lifecycle,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Transient => "transient",
            AlertKind::Integrity => "integrity",
            AlertKind::JobFailure => "job_failure",
            AlertKind::JobRetry => "job_retry",
            AlertKind::Lifecycle => "lifecycle",
        }
    }
}

/// A single operator notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    /// Stage or operation that raised it.
    pub context: String,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            message: message.into(),
        }
    }

    /// Single-line rendering posted to chat channels.
    pub fn render(&self) -> String {
        format!("[stats-cache] {}: {}", self.context, self.message)
    }
}

/// Sink for operator notifications.
///
/// Delivery is best effort: a failing channel must never fail the stage
/// that raised the alert.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn alert(&self, alert: Alert);
}

/// Writes alerts to the log only.
#[derive(Debug, Default)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert(&self, alert: Alert) {
        MetricsCollector::new().record_alert(alert.kind.as_str());
        tracing::warn!(
            kind = alert.kind.as_str(),
            context = %alert.context,
            "ALERT: {}",
            alert.message
        );
    }
}

#[derive(Serialize)]
struct SlackMessage {
    text: String,
}

/// Posts alerts to a Slack incoming webhook.
pub struct SlackAlerter {
    webhook_url: String,
    http_client: Client,
}

impl SlackAlerter {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            webhook_url: webhook_url.into(),
            http_client: Client::builder().timeout(Duration::from_secs(10)).build()?,
        })
    }
}

#[async_trait]
impl Alerter for SlackAlerter {
    async fn alert(&self, alert: Alert) {
        MetricsCollector::new().record_alert(alert.kind.as_str());
        tracing::warn!(
            kind = alert.kind.as_str(),
            context = %alert.context,
            "ALERT: {}",
            alert.message
        );

        let body = SlackMessage {
            text: alert.render(),
        };
        match self
            .http_client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
        {
            Ok(response) if !response.status().is_success() => {
                tracing::error!(status = %response.status(), "Slack webhook rejected alert");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to post alert to Slack");
            }
        }
    }
}

/// Collects alerts in memory.
#[derive(Debug, Default)]
pub struct MemoryAlerter {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: AlertKind) -> usize {
        self.alerts
            .lock()
            .map(|a| a.iter().filter(|alert| alert.kind == kind).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().map(|a| a.is_empty()).unwrap_or(true)
    }
}

#[async_trait]
impl Alerter for MemoryAlerter {
    async fn alert(&self, alert: Alert) {
        tracing::debug!(context = %alert.context, "{}", alert.message);
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_render() {
        let alert = Alert::new(AlertKind::JobFailure, "finish", "job 42 failed");
        assert_eq!(alert.render(), "[stats-cache] finish: job 42 failed");
    }

    #[tokio::test]
    async fn test_memory_alerter_collects() {
        let alerter = MemoryAlerter::new();
        assert!(alerter.is_empty());
        alerter
            .alert(Alert::new(AlertKind::Transient, "discover", "registry down"))
            .await;
        alerter
            .alert(Alert::new(AlertKind::JobRetry, "finish", "retrying"))
            .await;
        assert_eq!(alerter.alerts().len(), 2);
        assert_eq!(alerter.count(AlertKind::Transient), 1);
        assert_eq!(alerter.count(AlertKind::Integrity), 0);
    }

    #[tokio::test]
    async fn test_slack_alerter_swallows_delivery_errors() {
        let alerter = SlackAlerter::new("http://localhost:65535/hook").unwrap();
        alerter
            .alert(Alert::new(AlertKind::Lifecycle, "bootstrap", "disabled"))
            .await;
    }

    #[test]
    fn test_alert_kind_labels() {
        assert_eq!(AlertKind::JobFailure.as_str(), "job_failure");
        assert_eq!(AlertKind::Integrity.as_str(), "integrity");
    }
}
