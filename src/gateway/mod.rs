//! Outbound collaborator seams: the chat platform and the vision API.

pub mod slack;
pub mod vision;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::GatewayError;

pub use slack::SlackGateway;
pub use vision::HttpVisionGateway;

/// Chat-platform surface the bridge needs: authenticated file download and
/// threaded message posting.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Download a platform-hosted file using the bot credential.
    async fn download_file(&self, url: &str) -> Result<Vec<u8>, GatewayError>;

    /// Post a message into a conversation thread.
    async fn post_message(
        &self,
        channel_id: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<(), GatewayError>;
}

/// Vision-inference surface: submit an encoded image, get the raw result
/// body back. Parsing the body belongs to the pipeline, not the gateway.
#[async_trait]
pub trait VisionGateway: Send + Sync {
    async fn infer(
        &self,
        api_key: &SecretString,
        image_data_uri: &str,
        parameter: &str,
    ) -> Result<String, GatewayError>;
}

/// Post a reply without blocking the caller.
///
/// Failures are logged, never retried, never surfaced upstream.
pub fn post_reply_detached(
    chat: Arc<dyn ChatGateway>,
    channel_id: String,
    thread_ts: String,
    text: String,
) {
    tokio::spawn(async move {
        if let Err(e) = chat.post_message(&channel_id, &thread_ts, &text).await {
            tracing::warn!(channel = %channel_id, error = %e, "Failed to post reply");
        }
    });
}
