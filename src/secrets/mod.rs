//! Credential lookup facade.
//!
//! The pipeline never sees how credentials are stored or decrypted; it
//! resolves a tool's required credential id to a [`DecryptedSecret`] and
//! moves on. Plaintext lives in secure memory, is redacted from Debug
//! output, and is exposed only at the injection point.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use crate::error::CredentialError;

/// A decrypted credential value, held in secure memory.
pub struct DecryptedSecret {
    value: SecretString,
}

impl DecryptedSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
        }
    }

    /// Expose the plaintext for injection. The only access path; never
    /// log or persist the returned slice.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.value.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DecryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecryptedSecret([REDACTED, {} bytes])", self.len())
    }
}

impl Clone for DecryptedSecret {
    fn clone(&self) -> Self {
        Self {
            value: SecretString::from(self.value.expose_secret().to_string()),
        }
    }
}

/// Aggregate health of the credential backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialHealth {
    pub total: usize,
    pub expired: usize,
}

impl CredentialHealth {
    pub fn is_healthy(&self) -> bool {
        self.expired == 0
    }
}

/// The lookup contract the core consumes. Enrollment, templates, and
/// guided setup live behind this boundary.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a credential id to its decrypted secret.
    async fn resolve(&self, credential_id: &str) -> Result<DecryptedSecret, CredentialError>;

    async fn health(&self) -> CredentialHealth;
}

struct StoredCredential {
    value: SecretString,
    expires_at: Option<DateTime<Utc>>,
    usage_count: u64,
}

/// In-memory credential store for tests and the demo binary.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<String, StoredCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enroll(&self, id: impl Into<String>, value: impl Into<String>) {
        self.enroll_with_expiry(id, value, None).await;
    }

    pub async fn enroll_with_expiry(
        &self,
        id: impl Into<String>,
        value: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.credentials.write().await.insert(
            id.into(),
            StoredCredential {
                value: SecretString::from(value.into()),
                expires_at,
                usage_count: 0,
            },
        );
    }

    pub async fn usage_count(&self, id: &str) -> Option<u64> {
        self.credentials.read().await.get(id).map(|c| c.usage_count)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn resolve(&self, credential_id: &str) -> Result<DecryptedSecret, CredentialError> {
        let mut credentials = self.credentials.write().await;
        let stored = credentials
            .get_mut(credential_id)
            .ok_or_else(|| CredentialError::Missing {
                id: credential_id.to_string(),
            })?;

        if let Some(expires_at) = stored.expires_at
            && expires_at <= Utc::now()
        {
            return Err(CredentialError::Expired {
                id: credential_id.to_string(),
            });
        }

        stored.usage_count += 1;
        Ok(DecryptedSecret::new(stored.value.expose_secret()))
    }

    async fn health(&self) -> CredentialHealth {
        let credentials = self.credentials.read().await;
        let now = Utc::now();
        let expired = credentials
            .values()
            .filter(|c| c.expires_at.is_some_and(|at| at <= now))
            .count();
        CredentialHealth {
            total: credentials.len(),
            expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_resolve_round_trip() {
        let store = InMemoryCredentialStore::new();
        store.enroll("github_token", "ghp_secret").await;

        let secret = store.resolve("github_token").await.unwrap();
        assert_eq!(secret.expose(), "ghp_secret");
        assert_eq!(store.usage_count("github_token").await, Some(1));
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let store = InMemoryCredentialStore::new();
        let err = store.resolve("absent").await.unwrap_err();
        assert!(matches!(err, CredentialError::Missing { .. }));
        assert_eq!(err.code(), "CREDENTIAL_MISSING");
    }

    #[tokio::test]
    async fn test_expired_credential() {
        let store = InMemoryCredentialStore::new();
        store
            .enroll_with_expiry("old", "value", Some(Utc::now() - Duration::hours(1)))
            .await;

        let err = store.resolve("old").await.unwrap_err();
        assert!(matches!(err, CredentialError::Expired { .. }));
    }

    #[tokio::test]
    async fn test_health_counts_expired() {
        let store = InMemoryCredentialStore::new();
        store.enroll("fresh", "v").await;
        store
            .enroll_with_expiry("stale", "v", Some(Utc::now() - Duration::minutes(5)))
            .await;

        let health = store.health().await;
        assert_eq!(health.total, 2);
        assert_eq!(health.expired, 1);
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let secret = DecryptedSecret::new("super_secret_value");
        let debug = format!("{secret:?}");
        assert!(!debug.contains("super_secret_value"));
        assert!(debug.contains("REDACTED"));
    }
}
