use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User identity as seen by the core; the surrounding system owns the full
/// user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

/// Login input from the controller layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Device metadata captured at login time and bound to the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub fingerprint: Option<String>,
    pub source_address: Option<String>,
}

/// Credential material handed back by the identity collaborator.
#[derive(Debug, Clone)]
pub struct StoredIdentity {
    pub user: UserProfile,
    /// PHC-format password hash; never a reversible secret.
    pub password_hash: String,
    pub mfa_enabled: bool,
}

/// Persisted session layout, written exclusively by the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub last_activity: DateTime<Utc>,
    pub device_fingerprint: Option<String>,
}

impl SessionRecord {
    pub fn new(
        user_id: String,
        access_token: String,
        refresh_token: String,
        device_fingerprint: Option<String>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id,
            access_token,
            refresh_token,
            last_activity: Utc::now(),
            device_fingerprint,
        }
    }
}
