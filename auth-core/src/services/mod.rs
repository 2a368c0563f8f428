//! Services layer for the authentication core.
//!
//! Audit tracking, token issuance, collaborator seams, and the session
//! state machine.

pub mod audit;
pub mod identity;
mod session;
mod token;

pub use audit::{SecurityAuditTracker, SecurityContext, Violation, ViolationKind};
pub use identity::{
    IdentityProvider, MemoryIdentityProvider, MemorySessionStore, MfaDelivery, NullMfaDelivery,
    SessionStore,
};
pub use session::{LoginOutcome, RefreshDue, SessionContext, SessionState, SessionStateMachine};
pub use token::{AccessTokenClaims, IssuedTokens, RefreshTokenClaims, TokenResponse, TokenService};
