//! OAuth 2.0 sign-in for the session core
//!
//! Implements the authorization-code flow against a single identity
//! provider (Google by default).
//!
//! Features:
//! - Single-use, time-bounded CSRF state tokens
//! - Authorization URL construction
//! - Code exchange and user-info lookup with a bounded timeout
//! - Validated identity assertions

mod callback;
mod client;
mod identity;
mod vault;

pub use callback::{AuthorizationGrant, CallbackParams};
pub use client::OAuthClient;
pub use identity::{IdentityAssertion, validate_email};
pub use vault::{StateToken, StateTokenVault};
