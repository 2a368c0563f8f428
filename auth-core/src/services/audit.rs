//! Security audit tracking: failed-attempt counting, lockout windows, and
//! the append-only violation log.
//!
//! Single source of truth for per-identity security context. State is keyed
//! per credential identity, so one account's failures never lock out
//! another.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SecurityPolicyConfig;

/// Security violation kinds recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Failure counter reached the lockout threshold
    ExcessiveLoginFailures,
    /// Session terminated by the inactivity timeout
    SessionTimeout,
    /// Suspicious request or usage pattern detected
    SuspiciousActivity,
    /// Token presented from a device it was not issued to
    DeviceMismatch,
}

/// One recorded security-relevant event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Per-identity security state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityContext {
    pub failed_attempts: u32,
    pub last_failed_at: Option<DateTime<Utc>>,
    /// Ordered, append-only violation history.
    pub violations: Vec<Violation>,
    pub lockout_until: Option<DateTime<Utc>>,
}

impl SecurityContext {
    fn locked_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lockout_until.filter(|until| *until > now)
    }
}

/// Tracks security events per credential identity and decides lockout.
#[derive(Debug)]
pub struct SecurityAuditTracker {
    max_failed_attempts: u32,
    lockout_window: Duration,
    contexts: HashMap<String, SecurityContext>,
}

impl SecurityAuditTracker {
    pub fn new(policy: &SecurityPolicyConfig) -> Self {
        Self {
            max_failed_attempts: policy.max_failed_attempts,
            lockout_window: Duration::seconds(policy.lockout_window_seconds as i64),
            contexts: HashMap::new(),
        }
    }

    /// Record a failed authentication attempt. Returns true if the identity
    /// is locked out after this failure.
    pub fn record_failure(&mut self, identity: &str) -> bool {
        self.record_failure_at(identity, Utc::now())
    }

    pub fn record_failure_at(&mut self, identity: &str, now: DateTime<Utc>) -> bool {
        let window = self.lockout_window;
        let threshold = self.max_failed_attempts;
        let ctx = self.contexts.entry(identity.to_string()).or_default();

        ctx.failed_attempts += 1;
        ctx.last_failed_at = Some(now);

        if ctx.failed_attempts < threshold {
            tracing::debug!(
                identity = %identity,
                failed_attempts = ctx.failed_attempts,
                "Authentication failure recorded"
            );
            return false;
        }

        if ctx.locked_until(now).is_some() {
            // Already inside a lockout episode: extend the window, do not
            // append a duplicate violation entry.
            ctx.lockout_until = Some(now + window);
            tracing::warn!(
                identity = %identity,
                failed_attempts = ctx.failed_attempts,
                "Failure during active lockout; window extended"
            );
            return true;
        }

        ctx.lockout_until = Some(now + window);
        ctx.violations.push(Violation {
            kind: ViolationKind::ExcessiveLoginFailures,
            detail: format!("{} consecutive failed attempts", ctx.failed_attempts),
            at: now,
        });
        tracing::warn!(
            identity = %identity,
            failed_attempts = ctx.failed_attempts,
            lockout_seconds = window.num_seconds(),
            "Lockout threshold reached"
        );
        true
    }

    /// Record a successful authentication: resets the failure counter and
    /// clears any lockout window. Violation history is preserved.
    pub fn record_success(&mut self, identity: &str) {
        if let Some(ctx) = self.contexts.get_mut(identity) {
            ctx.failed_attempts = 0;
            ctx.last_failed_at = None;
            ctx.lockout_until = None;
        }
    }

    /// Append a violation outside the failure-counting path.
    pub fn record_violation(&mut self, identity: &str, kind: ViolationKind, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::warn!(identity = %identity, kind = ?kind, detail = %detail, "Security violation recorded");
        self.contexts
            .entry(identity.to_string())
            .or_default()
            .violations
            .push(Violation {
                kind,
                detail,
                at: Utc::now(),
            });
    }

    /// Remaining seconds of an active lockout window, if any.
    pub fn locked_out(&self, identity: &str) -> Option<u64> {
        self.locked_out_at(identity, Utc::now())
    }

    pub fn locked_out_at(&self, identity: &str, now: DateTime<Utc>) -> Option<u64> {
        let until = self.contexts.get(identity)?.locked_until(now)?;
        let remaining = (until - now).num_seconds();
        Some(remaining.max(1) as u64)
    }

    pub fn context(&self, identity: &str) -> Option<&SecurityContext> {
        self.contexts.get(identity)
    }
}
