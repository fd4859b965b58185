//! Atomic admit-once gate over the shared ledger.

use std::sync::Arc;
use std::time::Duration;

use crate::events::{Attachment, MessageContext};
use crate::store::KvStore;

/// Namespace prefix for dedup markers.
const PREFIX: &str = "dedup:";

/// Outcome of the admit-once check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
}

/// Derive the dedup key for one logical event, most durable source first:
/// the client message id survives delivery retries, the attachment's
/// platform id survives most of them, and the channel/timestamp composite
/// only tolerates whole-timestamp granularity.
pub fn dedup_key(ctx: &MessageContext, attachments: &[Attachment]) -> String {
    if let Some(id) = ctx.client_msg_id.as_deref().filter(|id| !id.is_empty()) {
        return format!("{PREFIX}msg:{id}");
    }
    if let Some(id) = attachments
        .iter()
        .find_map(|a| a.id.as_deref())
        .filter(|id| !id.is_empty())
    {
        return format!("{PREFIX}file:{id}");
    }
    format!("{PREFIX}ts:{}:{}", ctx.channel_id, ctx.ts)
}

/// Admit-once gate.
///
/// A single atomic test-and-set against the ledger; a separate
/// check-then-set pair would open a race window that concurrent duplicate
/// deliveries exploit.
pub struct IdempotencyGate {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl IdempotencyGate {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Claim the key. On a store failure the event is admitted (fail open):
    /// an outage degrades to duplicate replies, not dropped events.
    pub async fn admit(&self, key: &str) -> Admission {
        match self.kv.set_if_absent(key, "1", self.ttl).await {
            Ok(true) => Admission::Admitted,
            Ok(false) => Admission::Duplicate,
            Err(e) => {
                tracing::warn!(error = %e, "Dedup ledger unavailable; admitting event");
                Admission::Admitted
            }
        }
    }
}
