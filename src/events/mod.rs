//! Inbound webhook event model and classification.

pub mod classifier;
pub mod commands;
pub mod types;

pub use classifier::{Classification, MessageContext, classify};
pub use commands::CredentialCommand;
pub use types::{Attachment, InnerEvent, WebhookEnvelope};
