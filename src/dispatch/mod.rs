//! The dispatcher: classification, idempotency gating, credential gating,
//! warn throttling, and handoff to the worker pool.
//!
//! Core invariant: for any dedup key, at most one processing attempt and
//! at most one reply per attachment, system-wide, despite at-least-once
//! delivery from the platform. The acknowledgment is decided here; all
//! processing runs detached.

pub mod idempotency;
pub mod warn;

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::events::types::{Attachment, WebhookEnvelope};
use crate::events::{self, Classification, CredentialCommand, MessageContext};
use crate::gateway::{self, ChatGateway};
use crate::store::CredentialStore;
use crate::worker::{JobQueue, ProcessingJob};

use self::idempotency::{Admission, IdempotencyGate, dedup_key};
use self::warn::WarnThrottle;

/// Reply templates for the notification paths, parameterized per
/// deployment instead of forked per deployment.
#[derive(Debug, Clone)]
pub struct ReplyTemplates {
    /// Sent (throttled) when an image arrives without a registered key.
    pub register_prompt: String,
    pub register_ack: String,
    pub delete_ack: String,
    pub show_missing: String,
    pub command_failed: String,
}

impl Default for ReplyTemplates {
    fn default() -> Self {
        Self {
            register_prompt:
                ":warning: Please register your API key first using `register sk-...`."
                    .to_string(),
            register_ack: ":white_check_mark: API key registered successfully.".to_string(),
            delete_ack: ":wastebasket: API key deleted.".to_string(),
            show_missing: ":mag: No API key registered for you yet.".to_string(),
            command_failed: ":x: Could not update your API key. Please try again.".to_string(),
        }
    }
}

/// Terminal acknowledgment states, one per delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handshake answered with the literal challenge.
    Challenge(String),
    /// Credential command executed.
    Command,
    /// Image work admitted and handed to the pool.
    Accepted,
    /// Repeat delivery of a seen event; absorbed silently.
    Duplicate,
    /// No credential on file; warn path taken (possibly throttled).
    CredentialMissing,
    /// Nothing actionable.
    Ignored,
    /// Pool queue full; event acknowledged and dropped.
    Busy,
}

/// The core orchestrator, shared by every delivery.
pub struct Dispatcher {
    bot_user_id: Option<String>,
    idempotency: IdempotencyGate,
    throttle: WarnThrottle,
    credentials: CredentialStore,
    chat: Arc<dyn ChatGateway>,
    queue: Arc<dyn JobQueue>,
    templates: ReplyTemplates,
}

impl Dispatcher {
    pub fn new(
        bot_user_id: Option<String>,
        idempotency: IdempotencyGate,
        throttle: WarnThrottle,
        credentials: CredentialStore,
        chat: Arc<dyn ChatGateway>,
        queue: Arc<dyn JobQueue>,
        templates: ReplyTemplates,
    ) -> Self {
        Self {
            bot_user_id,
            idempotency,
            throttle,
            credentials,
            chat,
            queue,
            templates,
        }
    }

    /// Run one delivery through the state machine.
    ///
    /// Returns once the acknowledgment is decided; admitted processing
    /// continues in the worker pool, observable only through its replies.
    pub async fn dispatch(&self, envelope: &WebhookEnvelope) -> DispatchOutcome {
        match events::classify(envelope, self.bot_user_id.as_deref()) {
            Classification::VerificationChallenge { challenge } => {
                // Always answered, even if the delivery id collides with a
                // seen event: losing the handshake kills the subscription.
                debug!("Answering verification challenge");
                DispatchOutcome::Challenge(challenge)
            }
            Classification::Ignorable { reason } => {
                debug!(
                    reason,
                    event_id = envelope.event_id.as_deref().unwrap_or("-"),
                    "Ignoring delivery"
                );
                DispatchOutcome::Ignored
            }
            Classification::CredentialCommand { ctx, command } => {
                // The gate runs before the command's side effects too: a
                // retried register delivery must not ack twice.
                match self.idempotency.admit(&dedup_key(&ctx, &[])).await {
                    Admission::Duplicate => absorb_duplicate(&ctx),
                    Admission::Admitted => self.handle_command(ctx, command).await,
                }
            }
            Classification::ImageMessage {
                ctx,
                text,
                attachments,
            } => match self.idempotency.admit(&dedup_key(&ctx, &attachments)).await {
                Admission::Duplicate => absorb_duplicate(&ctx),
                Admission::Admitted => self.handle_image(ctx, text, attachments).await,
            },
        }
    }

    async fn handle_command(
        &self,
        ctx: MessageContext,
        command: CredentialCommand,
    ) -> DispatchOutcome {
        let reply = match command {
            CredentialCommand::Register(secret) => {
                match self.credentials.register(&ctx.user_id, &secret).await {
                    Ok(()) => {
                        info!(user = %ctx.user_id, "Credential registered");
                        self.templates.register_ack.clone()
                    }
                    Err(e) => {
                        error!(user = %ctx.user_id, error = %e, "Credential registration failed");
                        self.templates.command_failed.clone()
                    }
                }
            }
            CredentialCommand::Show => match self.credentials.fetch(&ctx.user_id).await {
                // The explicit show command is the one place the secret is
                // allowed to travel back out verbatim.
                Ok(Some(secret)) => {
                    format!("Your registered API key: `{}`", secret.expose_secret())
                }
                Ok(None) => self.templates.show_missing.clone(),
                Err(e) => {
                    error!(user = %ctx.user_id, error = %e, "Credential lookup failed");
                    self.templates.command_failed.clone()
                }
            },
            CredentialCommand::Delete => match self.credentials.remove(&ctx.user_id).await {
                Ok(true) => {
                    info!(user = %ctx.user_id, "Credential deleted");
                    self.templates.delete_ack.clone()
                }
                Ok(false) => self.templates.show_missing.clone(),
                Err(e) => {
                    error!(user = %ctx.user_id, error = %e, "Credential deletion failed");
                    self.templates.command_failed.clone()
                }
            },
        };

        gateway::post_reply_detached(
            Arc::clone(&self.chat),
            ctx.channel_id,
            ctx.thread_ts,
            reply,
        );
        DispatchOutcome::Command
    }

    async fn handle_image(
        &self,
        ctx: MessageContext,
        text: String,
        attachments: Vec<Attachment>,
    ) -> DispatchOutcome {
        let credential = match self.credentials.fetch(&ctx.user_id).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return self.warn_missing_credential(ctx).await,
            Err(e) => {
                // Store down: treat as missing rather than dropping the
                // user silently.
                error!(user = %ctx.user_id, error = %e, "Credential lookup failed");
                return self.warn_missing_credential(ctx).await;
            }
        };

        let job = ProcessingJob {
            job_id: Uuid::new_v4(),
            channel_id: ctx.channel_id,
            thread_ts: ctx.thread_ts,
            user_id: ctx.user_id,
            text,
            attachments,
            credential,
        };
        let job_id = job.job_id;
        match self.queue.submit(job) {
            Ok(()) => {
                info!(job_id = %job_id, "Image processing job admitted");
                DispatchOutcome::Accepted
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Processing queue rejected admitted job");
                DispatchOutcome::Busy
            }
        }
    }

    async fn warn_missing_credential(&self, ctx: MessageContext) -> DispatchOutcome {
        if self.throttle.should_warn(&ctx.user_id, &ctx.ts).await {
            info!(user = %ctx.user_id, "Prompting user to register a credential");
            gateway::post_reply_detached(
                Arc::clone(&self.chat),
                ctx.channel_id,
                ctx.thread_ts,
                self.templates.register_prompt.clone(),
            );
        } else {
            debug!(user = %ctx.user_id, "Registration prompt throttled");
        }
        DispatchOutcome::CredentialMissing
    }
}

fn absorb_duplicate(ctx: &MessageContext) -> DispatchOutcome {
    info!(channel = %ctx.channel_id, ts = %ctx.ts, "Duplicate delivery absorbed");
    DispatchOutcome::Duplicate
}
