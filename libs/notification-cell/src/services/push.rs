use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{NotificationError, PushMessage};

#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, messages: &[PushMessage]) -> Result<(), NotificationError>;
}

/// Expo push API client.
pub struct ExpoPushClient {
    client: Client,
    url: String,
    access_token: Option<String>,
}

impl ExpoPushClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: config.push_api_url.clone(),
            access_token: config.push_access_token.clone(),
        }
    }
}

#[async_trait]
impl PushProvider for ExpoPushClient {
    async fn send(&self, messages: &[PushMessage]) -> Result<(), NotificationError> {
        if messages.is_empty() {
            return Ok(());
        }

        debug!("Sending {} push messages to {}", messages.len(), self.url);

        let mut request = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(messages);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            error!("Push provider error ({}): {}", status, text);
            return Err(NotificationError::Provider(format!("HTTP {}: {}", status, text)));
        }

        Ok(())
    }
}
