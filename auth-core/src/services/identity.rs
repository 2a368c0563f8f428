//! Collaborator seams for the session state machine.
//!
//! The core does not own credential storage, MFA delivery, or session
//! persistence; it talks to them through these traits. In-memory
//! implementations are provided for embedding and tests.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::AuthError;
use crate::models::{SessionRecord, StoredIdentity, UserProfile};

/// Looks up credential material for a presented identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn find_identity(&self, username: &str) -> Result<Option<StoredIdentity>, AuthError>;
}

/// Delivers a one-time MFA code to the user out of band.
#[async_trait]
pub trait MfaDelivery: Send + Sync {
    async fn deliver_code(&self, user: &UserProfile, code: &str) -> Result<(), AuthError>;
}

/// Persisted token/session storage. The state machine is the only writer.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, record: &SessionRecord) -> Result<(), AuthError>;
    async fn clear(&self, session_id: &str) -> Result<(), AuthError>;
}

/// In-memory identity provider keyed by username.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    identities: DashMap<String, StoredIdentity>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, username: impl Into<String>, identity: StoredIdentity) {
        self.identities.insert(username.into(), identity);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn find_identity(&self, username: &str) -> Result<Option<StoredIdentity>, AuthError> {
        Ok(self.identities.get(username).map(|e| e.value().clone()))
    }
}

/// In-memory session store keyed by session ID.
#[derive(Default)]
pub struct MemorySessionStore {
    records: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.records.get(session_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), AuthError> {
        self.records
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), AuthError> {
        self.records.remove(session_id);
        Ok(())
    }
}

/// MFA delivery that drops codes; for deployments without a second factor.
pub struct NullMfaDelivery;

#[async_trait]
impl MfaDelivery for NullMfaDelivery {
    async fn deliver_code(&self, user: &UserProfile, _code: &str) -> Result<(), AuthError> {
        tracing::debug!(user_id = %user.id, "MFA code generated but no delivery channel configured");
        Ok(())
    }
}
