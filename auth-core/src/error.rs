use thiserror::Error;

/// Failures from the cryptographic primitives.
///
/// Underlying library errors are never surfaced directly; every failure is
/// normalized into one of these variants.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("authentication tag mismatch")]
    TagMismatch,

    #[error("invalid credential hash format: {0}")]
    InvalidHashFormat(String),

    #[error("cipher failure: {0}")]
    Cipher(String),

    #[error("payload encoding error: {0}")]
    Encoding(String),
}

/// An active lockout window rejected the attempt.
#[derive(Debug, Clone, Error)]
#[error("too many failed attempts; retry in {retry_after_seconds}s")]
pub struct RateLimitError {
    /// Seconds until the lockout window closes.
    pub retry_after_seconds: u64,
}

/// The session was terminated by the inactivity timeout.
#[derive(Debug, Clone, Error)]
#[error("session expired after {idle_seconds}s of inactivity")]
pub struct SessionError {
    /// How long the session had been idle when it was checked.
    pub idle_seconds: i64,
}

/// Failures from the session state machine.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid MFA code")]
    InvalidMfaCode,

    #[error("unknown MFA challenge")]
    MfaChallengeNotFound,

    #[error("MFA challenge expired")]
    MfaChallengeExpired,

    #[error("invalid or missing refresh token")]
    InvalidRefreshToken,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    SessionExpired(#[from] SessionError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
