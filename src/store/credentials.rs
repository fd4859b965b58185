//! Typed credential access over the key-value capability.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::error::StoreError;
use crate::store::kv::KvStore;

/// Namespace prefix for per-user inference credentials.
const PREFIX: &str = "credential:";

/// Per-user inference API keys.
///
/// No TTL: entries live until explicitly deleted. The dispatcher only ever
/// reads; mutation happens exclusively through the registration and
/// deletion commands.
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(user_id: &str) -> String {
        format!("{PREFIX}{user_id}")
    }

    /// Store (or overwrite) a user's key.
    pub async fn register(&self, user_id: &str, secret: &SecretString) -> Result<(), StoreError> {
        self.kv
            .set(&Self::key(user_id), secret.expose_secret(), None)
            .await
    }

    /// Fetch a user's key, if registered.
    pub async fn fetch(&self, user_id: &str) -> Result<Option<SecretString>, StoreError> {
        Ok(self
            .kv
            .get(&Self::key(user_id))
            .await?
            .map(SecretString::from))
    }

    /// Remove a user's key. Returns whether one existed.
    pub async fn remove(&self, user_id: &str) -> Result<bool, StoreError> {
        self.kv.delete(&Self::key(user_id)).await
    }
}
