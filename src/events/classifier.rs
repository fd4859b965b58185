//! Maps a raw delivery to one of the fixed event categories.

use crate::events::commands::{self, CredentialCommand};
use crate::events::types::{Attachment, WebhookEnvelope};

/// Context shared by every actionable message classification: who sent it,
/// where the reply goes, and the ids the dedup key derives from.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub user_id: String,
    pub channel_id: String,
    /// Thread to reply into: inbound `thread_ts`, falling back to `ts`.
    pub thread_ts: String,
    /// The message's own timestamp.
    pub ts: String,
    pub client_msg_id: Option<String>,
}

/// Outcome of classifying one delivery, in precedence order.
#[derive(Debug, Clone)]
pub enum Classification {
    /// Platform handshake. Bypasses all other logic.
    VerificationChallenge { challenge: String },
    /// Explicit credential-management command.
    CredentialCommand {
        ctx: MessageContext,
        command: CredentialCommand,
    },
    /// Message with at least one image attachment.
    ImageMessage {
        ctx: MessageContext,
        text: String,
        attachments: Vec<Attachment>,
    },
    /// Everything else. Absorbed without reply.
    Ignorable { reason: &'static str },
}

/// Classify one delivery.
///
/// `bot_user_id` is the bridge's own user id, if known; events carrying it
/// (or any `bot_id`) are ignorable so the bridge never answers itself.
pub fn classify(envelope: &WebhookEnvelope, bot_user_id: Option<&str>) -> Classification {
    if envelope.kind == "url_verification" {
        if let Some(challenge) = &envelope.challenge {
            return Classification::VerificationChallenge {
                challenge: challenge.clone(),
            };
        }
        return Classification::Ignorable {
            reason: "verification without challenge",
        };
    }

    if envelope.kind != "event_callback" {
        return Classification::Ignorable {
            reason: "unknown delivery type",
        };
    }
    let Some(event) = &envelope.event else {
        return Classification::Ignorable {
            reason: "event_callback without event",
        };
    };

    if event.kind != "message" {
        return Classification::Ignorable {
            reason: "non-message event",
        };
    }
    // Subtypes cover edits, deletions, joins; none are processable uploads.
    if event.subtype.is_some() {
        return Classification::Ignorable {
            reason: "message subtype",
        };
    }
    if event.bot_id.is_some() {
        return Classification::Ignorable {
            reason: "own bot event",
        };
    }
    let Some(user_id) = event.user.clone().filter(|u| !u.is_empty()) else {
        return Classification::Ignorable {
            reason: "missing user",
        };
    };
    if bot_user_id.is_some_and(|bot| bot == user_id) {
        return Classification::Ignorable {
            reason: "own bot event",
        };
    }
    let Some(channel_id) = event.channel.clone().filter(|c| !c.is_empty()) else {
        return Classification::Ignorable {
            reason: "missing channel",
        };
    };
    let Some(ts) = event.ts.clone().filter(|t| !t.is_empty()) else {
        return Classification::Ignorable {
            reason: "missing timestamp",
        };
    };

    let ctx = MessageContext {
        user_id,
        channel_id,
        thread_ts: event.thread_ts.clone().unwrap_or_else(|| ts.clone()),
        ts,
        client_msg_id: event.client_msg_id.clone(),
    };

    if let Some(text) = &event.text
        && let Some(command) = commands::parse(text)
    {
        return Classification::CredentialCommand { ctx, command };
    }

    let attachments: Vec<Attachment> = event
        .files
        .iter()
        .filter(|f| f.is_image())
        .cloned()
        .collect();
    if !attachments.is_empty() {
        return Classification::ImageMessage {
            ctx,
            text: event.text.clone().unwrap_or_default(),
            attachments,
        };
    }

    Classification::Ignorable {
        reason: "no actionable content",
    }
}
