//! Telegram Bot API notifications

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info};

use super::Notifier;
use crate::error::DeliveryError;
use crate::retry::{with_retry, RetryConfig};

/// Sends Markdown messages to one chat through `sendMessage`.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
    retry: RetryConfig,
}

impl TelegramNotifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(TelegramNotifier {
            client,
            api_url: "https://api.telegram.org".to_string(),
            bot_token,
            chat_id,
            retry: RetryConfig::default(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    async fn post_message(&self, text: &str) -> Result<(), DeliveryError> {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            return Err(DeliveryError::MissingCredentials);
        };

        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        let url = format!("{}/bot{}/sendMessage", self.api_url, token);
        let resp = self.client.post(&url).json(&payload).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        match with_retry(&self.retry, "telegram sendMessage", || self.post_message(text)).await {
            Ok(()) => {
                info!("Telegram message sent");
                true
            }
            Err(e) => {
                error!("Failed to send Telegram message: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credentials_fail_without_network() {
        let notifier = TelegramNotifier::new(None, Some("42".into())).unwrap();
        assert!(!notifier.is_configured());
        assert!(!notifier.send("hello").await);
    }
}
