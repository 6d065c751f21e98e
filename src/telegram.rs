//! Telegram Bot API client for delivering alerts.
//!
//! Delivery failures are returned to the caller and are never retried here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

const SEND_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Telegram request failed: HTTP {status}; {detail}")]
    Http { status: u16, detail: String },

    #[error("Telegram send failed: {0}")]
    Rejected(String),

    #[error("Telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected Telegram response payload: {0}")]
    Payload(String),
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_notification: bool,
}

/// The envelope every Bot API response shares.
#[derive(Debug, Deserialize)]
pub struct TelegramResponse {
    #[serde(default)]
    pub ok: bool,
    pub description: Option<String>,
}

/// Client for the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramClient {
    /// Create a client for the API hosted at `api_base`.
    pub fn with_base_url(api_base: &str, bot_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        }
    }

    /// Send a text message to `chat_id`.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        disable_notification: bool,
    ) -> Result<(), TelegramError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = SendMessageRequest {
            chat_id,
            text,
            disable_notification,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;

        if !status.is_success() {
            return Err(TelegramError::Http {
                status: status.as_u16(),
                detail: error_detail(&raw),
            });
        }

        let parsed: TelegramResponse =
            serde_json::from_str(&raw).map_err(|_| TelegramError::Payload(raw.clone()))?;
        if !parsed.ok {
            return Err(TelegramError::Rejected(
                parsed.description.unwrap_or_else(|| raw.trim().to_string()),
            ));
        }

        info!(chat_id, "Telegram message delivered");
        Ok(())
    }
}

/// Best human-readable explanation from an error response body.
pub fn error_detail(raw_body: &str) -> String {
    let trimmed = raw_body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    serde_json::from_str::<TelegramResponse>(trimmed)
        .ok()
        .and_then(|r| r.description)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| trimmed.to_string())
}
