//! Per-attachment processing: download, encode, infer, format.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::error::{GatewayError, PipelineError};
use crate::events::Attachment;
use crate::gateway::{ChatGateway, VisionGateway};
use crate::pipeline::format::{self, ReplyFormat};

/// Mimetype assumed when the platform didn't supply one.
const FALLBACK_MIME: &str = "image/jpeg";

/// Maximum raw-body excerpt quoted in failure replies.
pub const BODY_EXCERPT_CHARS: usize = 200;

/// Reply text produced for one attachment. Always non-empty.
pub type ReplyText = String;

/// Runs one attachment through download, transport encoding, inference,
/// and formatting.
///
/// `process` is total over `ReplyText`: every failure domain renders as a
/// reply, nothing propagates past this boundary.
pub struct ImageProcessor {
    chat: Arc<dyn ChatGateway>,
    vision: Arc<dyn VisionGateway>,
    format: ReplyFormat,
}

impl ImageProcessor {
    pub fn new(
        chat: Arc<dyn ChatGateway>,
        vision: Arc<dyn VisionGateway>,
        format: ReplyFormat,
    ) -> Self {
        Self {
            chat,
            vision,
            format,
        }
    }

    /// Process one attachment to reply text.
    pub async fn process(
        &self,
        attachment: &Attachment,
        text: &str,
        credential: &SecretString,
    ) -> ReplyText {
        match self.run(attachment, text, credential).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Attachment processing failed");
                format::render_failure(&e, BODY_EXCERPT_CHARS)
            }
        }
    }

    async fn run(
        &self,
        attachment: &Attachment,
        text: &str,
        credential: &SecretString,
    ) -> Result<String, PipelineError> {
        let url = attachment
            .url_private
            .as_deref()
            .ok_or(PipelineError::MissingDownloadUrl)?;

        let bytes = self
            .chat
            .download_file(url)
            .await
            .map_err(download_error)?;
        debug!(bytes = bytes.len(), "Attachment downloaded");

        let data_uri = encode_data_uri(&attachment.mimetype, &bytes);
        let parameter = count_parameter(text);

        let raw = self
            .vision
            .infer(credential, &data_uri, &parameter)
            .await
            .map_err(inference_error)?;

        format::render_result(self.format, &raw)
    }
}

fn download_error(e: GatewayError) -> PipelineError {
    match e {
        GatewayError::Status { status, .. } => PipelineError::Download { status },
        other => PipelineError::DownloadTransport {
            reason: other.to_string(),
        },
    }
}

fn inference_error(e: GatewayError) -> PipelineError {
    match e {
        GatewayError::Status { status, body, .. } => PipelineError::Inference { status, body },
        other => PipelineError::InferenceTransport {
            reason: other.to_string(),
        },
    }
}

/// Transport-encode image bytes as a base64 data URI.
fn encode_data_uri(mimetype: &str, bytes: &[u8]) -> String {
    let mime = if mimetype.is_empty() {
        FALLBACK_MIME
    } else {
        mimetype
    };
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Extract the optional count hint from the message text.
///
/// `count apples` forwards `count apples` as the inference parameter;
/// anything else forwards an empty parameter.
fn count_parameter(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    match lowered.strip_prefix("count") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => {
            format!("count {}", rest.trim()).trim_end().to_string()
        }
        _ => String::new(),
    }
}
