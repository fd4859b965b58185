//! Slack Web API implementation of the chat gateway.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::GatewayError;
use crate::gateway::ChatGateway;

const GATEWAY: &str = "slack";
const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Slack Web API client: one bot token, one pooled HTTP client with a
/// bounded request timeout.
pub struct SlackGateway {
    bot_token: SecretString,
    base_url: String,
    client: reqwest::Client,
}

impl SlackGateway {
    pub fn new(bot_token: SecretString, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport {
                gateway: GATEWAY,
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            bot_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Override the API base URL (tests, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }
}

fn transport_err(e: reqwest::Error) -> GatewayError {
    GatewayError::Transport {
        gateway: GATEWAY,
        reason: e.to_string(),
    }
}

#[async_trait]
impl ChatGateway for SlackGateway {
    async fn download_file(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await
            .map_err(transport_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                gateway: GATEWAY,
                status: status.as_u16(),
                body: String::new(),
            });
        }
        Ok(resp.bytes().await.map_err(transport_err)?.to_vec())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "channel": channel_id,
            "thread_ts": thread_ts,
            "text": text,
        });

        let resp = self
            .client
            .post(self.api_url("chat.postMessage"))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                gateway: GATEWAY,
                status: status.as_u16(),
                body,
            });
        }

        // Slack reports application errors in-band with HTTP 200.
        let data: serde_json::Value = resp.json().await.map_err(transport_err)?;
        if data.get("ok") != Some(&serde_json::Value::Bool(true)) {
            let error = data
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(GatewayError::Api {
                gateway: GATEWAY,
                error,
            });
        }
        Ok(())
    }
}
