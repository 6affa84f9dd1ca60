//! SMS delivery through the Twilio Messages API.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Notifier, NotifyError};
use crate::config::TwilioConfig;
use crate::error::{Error, Result};

/// Sends SMS via `POST /2010-04-01/Accounts/{sid}/Messages.json`.
#[derive(Clone)]
pub struct TwilioNotifier {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl std::fmt::Debug for TwilioNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioNotifier")
            .field("base_url", &self.base_url)
            .field("account_sid", &self.account_sid)
            .field("from_number", &self.from_number)
            .finish_non_exhaustive()
    }
}

impl TwilioNotifier {
    /// Build a notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotifierSetup`] if credentials are missing or the HTTP
    /// client cannot be built.
    pub fn new(config: &TwilioConfig, timeout: Duration) -> Result<Self> {
        let required = |value: &Option<String>, name: &str| -> Result<String> {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::notifier_setup(format!("twilio {name} is not set")))
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::notifier_setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            account_sid: required(&config.account_sid, "account_sid")?,
            auth_token: required(&config.auth_token, "auth_token")?,
            from_number: required(&config.from_number, "from_number")?,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn send(&self, phone: &str, message: &str) -> std::result::Result<(), NotifyError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", phone),
                ("From", self.from_number.as_str()),
                ("Body", message),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(phone, "twilio accepted message ({})", status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        // Twilio error bodies are JSON with a human-readable `message`
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or(body);

        Err(NotifyError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
