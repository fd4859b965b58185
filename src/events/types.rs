//! Wire types for webhook deliveries.
//!
//! Every field is optional at the serde level so that any well-formed JSON
//! body classifies instead of failing deserialization. The HTTP layer only
//! rejects bodies that are not JSON at all.

use serde::Deserialize;

/// One raw webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    /// Delivery type: `url_verification` or `event_callback`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Handshake token to echo back, present on `url_verification` only.
    #[serde(default)]
    pub challenge: Option<String>,
    /// Platform-assigned delivery id. Retries reuse it.
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event: Option<InnerEvent>,
}

/// The event wrapped inside an `event_callback` delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct InnerEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Present on edits, deletions, bot messages. Never processed.
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Present when the event originates from a bot, ours included.
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    /// Root thread id; only replies carry it.
    #[serde(default)]
    pub thread_ts: Option<String>,
    /// Client-generated message id. Survives delivery retries.
    #[serde(default)]
    pub client_msg_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub files: Vec<Attachment>,
}

/// One uploaded file on a message event.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    /// Platform file id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mimetype: String,
    /// Authenticated download URL.
    #[serde(default)]
    pub url_private: Option<String>,
}

impl Attachment {
    /// Whether this attachment is an image the pipeline should process.
    pub fn is_image(&self) -> bool {
        self.mimetype.starts_with("image/")
    }
}
