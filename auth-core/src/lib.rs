//! Authentication security core.
//!
//! Three components, leaves first:
//!
//! - [`crypto`] — stateless primitives: authenticated encryption
//!   (AES-256-GCM), credential hashing (Argon2id), and HMAC-SHA256
//!   signatures.
//! - [`services::audit`] — per-identity security event tracking and lockout
//!   decisions.
//! - [`services::SessionStateMachine`] — the login / MFA / refresh /
//!   timeout / logout lifecycle; the only component with mutable state.
//!
//! The HTTP layer, credential storage, and UI are external collaborators:
//! they call into this crate through [`services::IdentityProvider`],
//! [`services::MfaDelivery`], and [`services::SessionStore`].

pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod services;

pub use config::AuthConfig;
pub use error::{AuthError, CryptoError, RateLimitError, SessionError};
