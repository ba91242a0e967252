use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use tripflow_core::config::NotificationConfig;
use tripflow_core::{Notification, NotificationError, NotificationSink, TracingNotificationSink};

/// Posts each notification as JSON to the configured webhook URL, with an optional bearer
/// token.
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

impl WebhookNotificationSink {
    pub fn new(
        url: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NotificationError::Transport(error.to_string()))?;
        Ok(Self { client, url: url.into(), token })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        let mut request = self.client.post(&self.url).json(notification);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| NotificationError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(format!("webhook answered {status}")));
        }
        Ok(())
    }
}

/// Picks the webhook when one is configured, otherwise logs notifications.
pub fn sink_from_config(
    config: &NotificationConfig,
) -> Result<Arc<dyn NotificationSink>, NotificationError> {
    match &config.webhook_url {
        Some(url) => {
            info!(
                event_name = "system.notifications.webhook",
                correlation_id = "bootstrap",
                "notifications will be posted to the configured webhook"
            );
            let sink = WebhookNotificationSink::new(
                url.clone(),
                config.webhook_token.clone(),
                Duration::from_secs(config.timeout_secs.max(1)),
            )?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(TracingNotificationSink)),
    }
}
