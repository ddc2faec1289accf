//! Error types for the Asha session core

use std::io;

use thiserror::Error;

use crate::conversation::ThreadId;

/// Result type alias for the session core
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// OAuth handshake failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Generative backend failure
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Conversation store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unknown or expired session handle
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a CSRF state value is rejected by the vault
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// The token exists but outlived its time-to-live
    #[error("state token expired")]
    Expired,

    /// The token was never issued, was already consumed, or was tampered with
    #[error("state token unknown")]
    Unknown,
}

/// OAuth handshake errors
///
/// `CsrfMismatch` and `Expired` are terminal for the attempt: the caller
/// restarts the authorization flow instead of retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The returned `state` does not match any outstanding token
    #[error("OAuth state mismatch - possible CSRF attack")]
    CsrfMismatch,

    /// The returned `state` was issued too long ago
    #[error("OAuth state expired, restart the sign-in flow")]
    Expired,

    /// Token exchange or user-info lookup failed
    #[error("OAuth exchange failed: {0}")]
    ExchangeFailed(String),
}

impl From<StateError> for AuthError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Expired => Self::Expired,
            StateError::Unknown => Self::CsrfMismatch,
        }
    }
}

/// Classified failures of the generative backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Backend refused the call because of quota or rate limits
    #[error("Generative backend rate limited: {0}")]
    RateLimited(String),

    /// Backend unreachable, overloaded, or timed out
    #[error("Generative backend unavailable: {0}")]
    ServiceUnavailable(String),

    /// Backend answered with something we cannot use
    #[error("Generative backend returned a malformed reply: {0}")]
    Malformed(String),

    /// Anything else
    #[error("Generative backend error: {0}")]
    Unknown(String),
}

impl DispatchError {
    /// Whether another attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::ServiceUnavailable(_))
    }

    /// Stable short name of the failure class
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Malformed(_) => "malformed",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Conversation store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No thread with this id belongs to the identity
    #[error("Thread not found: {0}")]
    NotFound(ThreadId),

    /// The store could not be written to persistence
    #[error("Failed to persist conversations: {0}")]
    PersistFailed(String),
}
