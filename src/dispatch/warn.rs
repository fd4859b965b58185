//! Missing-credential warn throttle.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::store::KvStore;

/// Namespace prefix for warn markers. Its lifecycle is independent of the
/// dedup namespace: warn markers live for hours, dedup markers for minutes.
const PREFIX: &str = "warned:";

/// Throttle keying granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnScope {
    /// One prompt per user per TTL window, whatever they send.
    PerUser,
    /// One prompt per user per message timestamp.
    PerUserPerEvent,
}

impl FromStr for WarnScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::PerUser),
            "user_event" => Ok(Self::PerUserPerEvent),
            other => Err(format!(
                "unknown warn scope '{other}' (expected 'user' or 'user_event')"
            )),
        }
    }
}

/// Bounds how often the registration prompt is sent to one user.
pub struct WarnThrottle {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    scope: WarnScope,
}

impl WarnThrottle {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration, scope: WarnScope) -> Self {
        Self { kv, ttl, scope }
    }

    fn key(&self, user_id: &str, ts: &str) -> String {
        match self.scope {
            WarnScope::PerUser => format!("{PREFIX}{user_id}"),
            WarnScope::PerUserPerEvent => format!("{PREFIX}{user_id}:{ts}"),
        }
    }

    /// Atomically claim the right to warn.
    ///
    /// On a store failure the prompt is sent (fail open): a duplicate
    /// prompt beats a silently stranded user.
    pub async fn should_warn(&self, user_id: &str, ts: &str) -> bool {
        match self
            .kv
            .set_if_absent(&self.key(user_id, ts), "1", self.ttl)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::warn!(error = %e, "Warn ledger unavailable; sending prompt");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn throttle(scope: WarnScope) -> WarnThrottle {
        WarnThrottle::new(Arc::new(MemoryStore::new()), Duration::from_secs(3600), scope)
    }

    #[tokio::test]
    async fn per_user_scope_warns_once_across_messages() {
        let throttle = throttle(WarnScope::PerUser);
        assert!(throttle.should_warn("U1", "1.0").await);
        for i in 1..5 {
            assert!(!throttle.should_warn("U1", &format!("1.{i}")).await);
        }
    }

    #[tokio::test]
    async fn per_user_scope_is_independent_between_users() {
        let throttle = throttle(WarnScope::PerUser);
        assert!(throttle.should_warn("U1", "1.0").await);
        assert!(throttle.should_warn("U2", "1.0").await);
    }

    #[tokio::test]
    async fn per_event_scope_warns_once_per_timestamp() {
        let throttle = throttle(WarnScope::PerUserPerEvent);
        assert!(throttle.should_warn("U1", "1.0").await);
        assert!(!throttle.should_warn("U1", "1.0").await);
        assert!(throttle.should_warn("U1", "2.0").await);
    }

    #[tokio::test]
    async fn expired_marker_warns_again() {
        let throttle = WarnThrottle::new(
            Arc::new(MemoryStore::new()),
            Duration::from_millis(20),
            WarnScope::PerUser,
        );
        assert!(throttle.should_warn("U1", "1.0").await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(throttle.should_warn("U1", "2.0").await);
    }

    #[test]
    fn scope_parses_known_values() {
        assert_eq!("user".parse::<WarnScope>().unwrap(), WarnScope::PerUser);
        assert_eq!(
            "user_event".parse::<WarnScope>().unwrap(),
            WarnScope::PerUserPerEvent
        );
        assert!("channel".parse::<WarnScope>().is_err());
    }
}
