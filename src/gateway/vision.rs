//! HTTP implementation of the vision-inference gateway.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::GatewayError;
use crate::gateway::VisionGateway;

const GATEWAY: &str = "vision";

/// Posts the transport-encoded image to the configured inference endpoint.
///
/// The per-user API key travels in the `X-API-Key` header and nowhere else;
/// it is never logged and never part of an error.
pub struct HttpVisionGateway {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpVisionGateway {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport {
                gateway: GATEWAY,
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl VisionGateway for HttpVisionGateway {
    async fn infer(
        &self,
        api_key: &SecretString,
        image_data_uri: &str,
        parameter: &str,
    ) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "image_data": image_data_uri,
            "parameter": parameter,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-Key", api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                gateway: GATEWAY,
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| GatewayError::Transport {
            gateway: GATEWAY,
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                gateway: GATEWAY,
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}
