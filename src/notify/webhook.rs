//! Webhook notifier: POSTs each notification as JSON.

use super::{Notification, Notifier, NotifyError};
use crate::config::NotifyConfig;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    max_elapsed: Duration,
}

impl WebhookNotifier {
    /// Build a notifier with a per-attempt `timeout` and a total retry budget
    /// of `max_elapsed`.
    pub fn new(url: String, timeout: Duration, max_elapsed: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        Ok(Self {
            client,
            url,
            max_elapsed,
        })
    }

    /// None when no webhook URL is configured.
    pub fn from_config(config: &NotifyConfig) -> Result<Option<Self>, NotifyError> {
        config
            .webhook_url
            .as_ref()
            .map(|url| {
                Self::new(
                    url.clone(),
                    Duration::from_millis(config.timeout_ms),
                    Duration::from_millis(config.max_elapsed_ms),
                )
            })
            .transpose()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!(
            member_id = %notification.member_id(),
            url = %self.url,
            "Delivering notification"
        );

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&self.url)
                .json(notification)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(NotifyError::Network(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(NotifyError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(NotifyError::Http {
                    status: status.as_u16(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(NotifyError::Http {
                    status: status.as_u16(),
                }));
            }
            Ok(())
        })
        .await
    }
}
