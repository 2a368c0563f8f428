#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use auth_core::config::AuthConfig;
use auth_core::crypto::{hash_password, Password};
use auth_core::error::AuthError;
use auth_core::models::{Credentials, DeviceMetadata, SessionRecord, StoredIdentity, UserProfile};
use auth_core::services::{
    MemoryIdentityProvider, MemorySessionStore, MfaDelivery, SessionStateMachine, SessionStore,
};

/// MFA delivery that captures codes so tests can replay them.
pub struct CapturingMfaDelivery {
    pub codes: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MfaDelivery for CapturingMfaDelivery {
    async fn deliver_code(&self, _user: &UserProfile, code: &str) -> Result<(), AuthError> {
        self.codes
            .lock()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("codes mutex poisoned: {}", e)))?
            .push(code.to_string());
        Ok(())
    }
}

/// Session store that accepts a fixed number of saves and then fails every
/// write, for exercising storage outages mid-lifecycle.
pub struct FlakySessionStore {
    inner: MemorySessionStore,
    saves_left: AtomicUsize,
}

impl FlakySessionStore {
    pub fn new(successful_saves: usize) -> Self {
        Self {
            inner: MemorySessionStore::new(),
            saves_left: AtomicUsize::new(successful_saves),
        }
    }
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), AuthError> {
        let left = self.saves_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "session store unavailable"
            )));
        }
        self.saves_left.store(left - 1, Ordering::SeqCst);
        self.inner.save(record).await
    }

    async fn clear(&self, session_id: &str) -> Result<(), AuthError> {
        self.inner.clear(session_id).await
    }
}

pub struct TestHarness {
    pub machine: SessionStateMachine,
    pub store: Arc<MemorySessionStore>,
    pub mfa_codes: Arc<Mutex<Vec<String>>>,
}

impl TestHarness {
    pub fn last_mfa_code(&self) -> String {
        self.mfa_codes
            .lock()
            .expect("codes mutex poisoned")
            .last()
            .expect("no MFA code was delivered")
            .clone()
    }
}

pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.jwt.secret = "integration-test-secret".to_string();
    config
}

pub fn test_user(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        name: None,
    }
}

/// Install a test subscriber once so `RUST_LOG` works in tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Identity provider seeded with a single user whose password is hashed for
/// real.
pub fn seeded_provider(
    username: &str,
    password: &str,
    mfa_enabled: bool,
) -> Arc<MemoryIdentityProvider> {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let password_hash = hash_password(&Password::new(password.to_string()))
        .expect("failed to hash test password")
        .into_string();
    provider.insert(
        username,
        StoredIdentity {
            user: test_user(username),
            password_hash,
            mfa_enabled,
        },
    );
    provider
}

/// Build a state machine backed by in-memory collaborators, seeded with a
/// single user.
pub fn harness_with_user(
    config: AuthConfig,
    username: &str,
    password: &str,
    mfa_enabled: bool,
) -> TestHarness {
    init_tracing();

    let provider = seeded_provider(username, password, mfa_enabled);
    let store = Arc::new(MemorySessionStore::new());
    let codes = Arc::new(Mutex::new(Vec::new()));
    let mfa = Arc::new(CapturingMfaDelivery {
        codes: codes.clone(),
    });

    let machine = SessionStateMachine::new(config, provider, mfa, store.clone())
        .expect("failed to build state machine");

    TestHarness {
        machine,
        store,
        mfa_codes: codes,
    }
}

pub fn credentials(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }
}

pub fn device(fingerprint: &str) -> DeviceMetadata {
    DeviceMetadata {
        fingerprint: Some(fingerprint.to_string()),
        source_address: Some("203.0.113.7".to_string()),
    }
}
