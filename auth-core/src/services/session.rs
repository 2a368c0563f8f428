//! Session lifecycle state machine.
//!
//! Orchestrates login, MFA challenge, token issuance/refresh, inactivity
//! timeout, and logout. The machine is the only component with mutable
//! state; every transition takes `&mut self`, which enforces the
//! single-writer contract at compile time. Callers that share a machine
//! across tasks must wrap it in their own mutex.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::crypto::{verify_password, Password, PasswordHashString};
use crate::error::{AuthError, RateLimitError, SessionError};
use crate::models::{Credentials, DeviceMetadata, SessionRecord, UserProfile};
use crate::services::audit::{SecurityAuditTracker, SecurityContext, ViolationKind};
use crate::services::identity::{IdentityProvider, MfaDelivery, SessionStore};
use crate::services::token::{TokenResponse, TokenService};

/// Lifecycle states of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    AwaitingMfa,
    Authenticated,
}

/// Per-session activity context. Cleared on logout, expiry, or forced
/// termination.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub last_activity: Option<DateTime<Utc>>,
    pub device_fingerprint: Option<String>,
    pub source_address: Option<String>,
    pub session_timeout_seconds: i64,
}

/// Outcome of a successful `login` call.
#[derive(Debug)]
pub enum LoginOutcome {
    TokenIssued {
        tokens: TokenResponse,
        user: UserProfile,
    },
    MfaRequired {
        challenge_id: String,
    },
}

/// Message sent when the armed refresh timer fires.
#[derive(Debug, Clone)]
pub struct RefreshDue {
    pub user_id: String,
    pub due_at: DateTime<Utc>,
}

/// Cancellable handle for the scheduled refresh task. Dropping the handle
/// aborts the task, so replacing it can never leave two timers running.
struct RefreshTimer {
    handle: tokio::task::JoinHandle<()>,
}

impl RefreshTimer {
    fn arm(delay: std::time::Duration, user_id: String, tx: mpsc::UnboundedSender<RefreshDue>) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let due = RefreshDue {
                user_id,
                due_at: Utc::now(),
            };
            if tx.send(due).is_err() {
                tracing::debug!("Refresh timer fired but the session machine is gone");
            }
        });
        Self { handle }
    }

    fn is_armed(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct MfaChallenge {
    id: String,
    code: String,
    user: UserProfile,
    expires_at: DateTime<Utc>,
}

/// The session/credential lifecycle state machine.
///
/// Construct once per session and pass into every core operation; there is
/// no hidden global instance.
pub struct SessionStateMachine {
    config: AuthConfig,
    tokens: TokenService,
    provider: Arc<dyn IdentityProvider>,
    mfa_delivery: Arc<dyn MfaDelivery>,
    store: Arc<dyn SessionStore>,
    audit: SecurityAuditTracker,

    state: SessionState,
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
    current_identity: Option<String>,
    session: SessionContext,
    session_id: Option<String>,
    pending_mfa: Option<MfaChallenge>,

    refresh_timer: Option<RefreshTimer>,
    refresh_tx: mpsc::UnboundedSender<RefreshDue>,
    refresh_rx: mpsc::UnboundedReceiver<RefreshDue>,
}

impl SessionStateMachine {
    pub fn new(
        config: AuthConfig,
        provider: Arc<dyn IdentityProvider>,
        mfa_delivery: Arc<dyn MfaDelivery>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, anyhow::Error> {
        config.validate()?;
        let tokens = TokenService::new(&config.jwt)?;
        let audit = SecurityAuditTracker::new(&config.security);
        let session_timeout_seconds = config.security.session_timeout_seconds;
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            tokens,
            provider,
            mfa_delivery,
            store,
            audit,
            state: SessionState::Anonymous,
            access_token: None,
            refresh_token: None,
            user: None,
            current_identity: None,
            session: SessionContext {
                last_activity: None,
                device_fingerprint: None,
                source_address: None,
                session_timeout_seconds,
            },
            session_id: None,
            pending_mfa: None,
            refresh_timer: None,
            refresh_tx,
            refresh_rx,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn session_context(&self) -> &SessionContext {
        &self.session
    }

    /// Read access to the audit tracker's per-identity state.
    pub fn security_context(&self, identity: &str) -> Option<&SecurityContext> {
        self.audit.context(identity)
    }

    pub fn refresh_timer_armed(&self) -> bool {
        self.refresh_timer
            .as_ref()
            .map(RefreshTimer::is_armed)
            .unwrap_or(false)
    }

    /// Await the next refresh-timer firing. The caller drives the actual
    /// `refresh` call; the timer only signals that it is due.
    pub async fn refresh_due(&mut self) -> Option<RefreshDue> {
        self.refresh_rx.recv().await
    }

    /// Authenticate with username/password.
    ///
    /// Lockout is checked before any credential lookup or hash work, so a
    /// locked identity cannot distinguish "locked" from "wrong password" by
    /// timing, and the stored hash is never touched during a window.
    pub async fn login(
        &mut self,
        credentials: Credentials,
        device: DeviceMetadata,
    ) -> Result<LoginOutcome, AuthError> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::Validation(
                "username and password are required".to_string(),
            ));
        }

        let identity = credentials.username.clone();

        if let Some(retry_after_seconds) = self.audit.locked_out(&identity) {
            tracing::warn!(identity = %identity, retry_after_seconds, "Login rejected: active lockout");
            return Err(RateLimitError {
                retry_after_seconds,
            }
            .into());
        }

        let stored = self.provider.find_identity(&identity).await?;

        let stored = match stored {
            Some(stored) => stored,
            None => {
                self.audit.record_failure(&identity);
                return Err(AuthError::InvalidCredentials);
            }
        };

        let matched = verify_password(
            &Password::new(credentials.password),
            &PasswordHashString::new(stored.password_hash.clone()),
        )?;

        if !matched {
            self.audit.record_failure(&identity);
            return Err(AuthError::InvalidCredentials);
        }

        self.audit.record_success(&identity);
        self.current_identity = Some(identity.clone());
        self.session.device_fingerprint = device.fingerprint.clone();
        self.session.source_address = device.source_address.clone();
        self.session.last_activity = Some(Utc::now());

        if stored.mfa_enabled {
            let challenge_id = self.create_mfa_challenge(stored.user).await?;
            self.state = SessionState::AwaitingMfa;
            return Ok(LoginOutcome::MfaRequired { challenge_id });
        }

        let tokens = self.establish_session(stored.user.clone()).await?;
        tracing::info!(user_id = %stored.user.id, "Login succeeded");

        Ok(LoginOutcome::TokenIssued {
            tokens,
            user: stored.user,
        })
    }

    /// Verify a one-time MFA code against the pending challenge.
    ///
    /// MFA failures are a separate, narrower channel: they are rate-limited
    /// through the tracker under the challenge's own key and never touch
    /// the login failure counter.
    pub async fn validate_mfa(
        &mut self,
        code: &str,
        challenge_id: &str,
    ) -> Result<TokenResponse, AuthError> {
        let mfa_key = format!("mfa:{}", challenge_id);
        if let Some(retry_after_seconds) = self.audit.locked_out(&mfa_key) {
            return Err(RateLimitError {
                retry_after_seconds,
            }
            .into());
        }

        let challenge = match self.pending_mfa.take() {
            Some(challenge) if challenge.id == challenge_id => challenge,
            other => {
                self.pending_mfa = other;
                return Err(AuthError::MfaChallengeNotFound);
            }
        };

        if Utc::now() > challenge.expires_at {
            // Nothing is persisted during the challenge window, so this only
            // resets in-memory fields; no stale device or activity data may
            // survive into the anonymous state.
            self.clear_auth_state();
            return Err(AuthError::MfaChallengeExpired);
        }

        if !codes_match(code, &challenge.code) {
            self.pending_mfa = Some(challenge);
            self.audit.record_failure(&mfa_key);
            return Err(AuthError::InvalidMfaCode);
        }

        self.session.last_activity = Some(Utc::now());

        let tokens = self.establish_session(challenge.user.clone()).await?;
        tracing::info!(user_id = %challenge.user.id, "MFA challenge passed");

        Ok(tokens)
    }

    /// Rotate the access/refresh pair using the stored refresh token.
    pub async fn refresh(&mut self) -> Result<TokenResponse, AuthError> {
        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or(AuthError::InvalidRefreshToken)?;

        self.tokens
            .decode_refresh(&refresh_token)
            .map_err(|e| {
                tracing::warn!(error = %e, "Refresh token rejected");
                AuthError::InvalidRefreshToken
            })?;

        let user = self.user.clone().ok_or(AuthError::NotAuthenticated)?;

        let issued = self
            .tokens
            .issue_pair(&user, self.session.device_fingerprint.as_deref())?;
        let now = Utc::now();

        let session_id = self
            .save_record(&user, &issued.access_token, &issued.refresh_token, now)
            .await?;

        self.access_token = Some(issued.access_token.clone());
        self.refresh_token = Some(issued.refresh_token.clone());
        self.session.last_activity = Some(now);
        self.session_id = Some(session_id);
        self.arm_refresh_timer(&user.id, issued.expires_in);

        tracing::debug!(user_id = %user.id, "Token pair rotated");

        Ok(TokenResponse {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in,
        })
    }

    /// Pull-based inactivity check. Returns true if the session is still
    /// live; a passing check counts as activity and stamps the timestamp.
    ///
    /// On expiry the session is torn down and a `session_timeout` violation
    /// recorded, whether or not the caller looks at the result.
    pub fn validate_session(&mut self) -> bool {
        self.validate_session_at(Utc::now())
    }

    pub fn validate_session_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != SessionState::Authenticated {
            return false;
        }

        let last_activity = match self.session.last_activity {
            Some(ts) => ts,
            None => return false,
        };

        let idle = now - last_activity;
        if idle > Duration::seconds(self.session.session_timeout_seconds) {
            let error = SessionError {
                idle_seconds: idle.num_seconds(),
            };
            tracing::warn!(idle_seconds = error.idle_seconds, "Session expired by inactivity");

            if let Some(identity) = self.current_identity.clone() {
                self.audit.record_violation(
                    &identity,
                    ViolationKind::SessionTimeout,
                    error.to_string(),
                );
            }
            self.teardown_session();
            return false;
        }

        self.session.last_activity = Some(now);
        true
    }

    /// Pure token check: no state mutation, never errors.
    pub fn validate_token(&self, token: &str) -> bool {
        self.tokens
            .check_access(token, self.session.device_fingerprint.as_deref())
    }

    /// Clear the session. Security history in the audit tracker survives
    /// logout.
    pub async fn logout(&mut self, reason: Option<&str>) {
        tracing::info!(reason = reason.unwrap_or("user_initiated"), "Logging out");

        let session_id = self.clear_auth_state();
        if let Some(session_id) = session_id {
            if let Err(e) = self.store.clear(&session_id).await {
                tracing::warn!(error = %e, "Failed to clear persisted session on logout");
            }
        }
    }

    /// Forced security termination, independent of the normal logout path:
    /// records the violation and immediately drops to Anonymous.
    pub fn report_violation(&mut self, kind: ViolationKind, detail: impl Into<String>) {
        let identity = self
            .current_identity
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());
        self.audit.record_violation(&identity, kind, detail);
        self.teardown_session();
    }

    async fn create_mfa_challenge(&mut self, user: UserProfile) -> Result<String, AuthError> {
        let code = generate_mfa_code();
        let challenge_id = Uuid::new_v4().to_string();

        self.mfa_delivery.deliver_code(&user, &code).await?;

        self.pending_mfa = Some(MfaChallenge {
            id: challenge_id.clone(),
            code,
            user,
            expires_at: Utc::now() + Duration::seconds(self.config.security.mfa_code_ttl_seconds),
        });

        tracing::info!(challenge_id = %challenge_id, "MFA challenge issued");
        Ok(challenge_id)
    }

    /// Two-phase transition to Authenticated: the session record is written
    /// first, and the in-memory state flips only after the store confirms.
    /// A failed save leaves the machine exactly as it was.
    async fn establish_session(&mut self, user: UserProfile) -> Result<TokenResponse, AuthError> {
        let issued = self
            .tokens
            .issue_pair(&user, self.session.device_fingerprint.as_deref())?;
        let now = Utc::now();

        let session_id = self
            .save_record(&user, &issued.access_token, &issued.refresh_token, now)
            .await?;

        self.state = SessionState::Authenticated;
        self.access_token = Some(issued.access_token.clone());
        self.refresh_token = Some(issued.refresh_token.clone());
        self.user = Some(user.clone());
        self.session.last_activity = Some(now);
        self.session_id = Some(session_id);
        self.arm_refresh_timer(&user.id, issued.expires_in);

        Ok(TokenResponse {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in,
        })
    }

    /// Write the session record without touching machine state. Returns the
    /// record's session ID for the caller to adopt once the write succeeds.
    async fn save_record(
        &self,
        user: &UserProfile,
        access_token: &str,
        refresh_token: &str,
        last_activity: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let mut record = SessionRecord::new(
            user.id.clone(),
            access_token.to_string(),
            refresh_token.to_string(),
            self.session.device_fingerprint.clone(),
        );
        if let Some(session_id) = &self.session_id {
            record.session_id = session_id.clone();
        }
        record.last_activity = last_activity;

        self.store.save(&record).await?;
        Ok(record.session_id)
    }

    /// Arm the refresh timer to fire a safety margin before token expiry.
    /// Any previously armed timer is cancelled first.
    fn arm_refresh_timer(&mut self, user_id: &str, expires_in: i64) {
        let margin = self.config.jwt.refresh_margin_seconds;
        let delay_seconds = (expires_in - margin).max(0) as u64;

        self.refresh_timer = Some(RefreshTimer::arm(
            std::time::Duration::from_secs(delay_seconds),
            user_id.to_string(),
            self.refresh_tx.clone(),
        ));
    }

    fn teardown_session(&mut self) {
        let session_id = self.clear_auth_state();
        if let Some(session_id) = session_id {
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = store.clear(&session_id).await {
                    tracing::warn!(error = %e, "Failed to clear persisted session");
                }
            });
        }
    }

    /// Reset to the anonymous configuration. Returns the persisted session
    /// ID, if any, so the caller can clear storage.
    fn clear_auth_state(&mut self) -> Option<String> {
        self.state = SessionState::Anonymous;
        self.access_token = None;
        self.refresh_token = None;
        self.user = None;
        self.pending_mfa = None;
        self.refresh_timer = None;
        self.session.last_activity = None;
        self.session.device_fingerprint = None;
        self.session.source_address = None;
        self.session_id.take()
    }
}

fn generate_mfa_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", code)
}

fn codes_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}
