//! Asha Session Core
//!
//! Authentication and conversation-session core for the Asha career
//! assistant.
//!
//! # Features
//!
//! - **OAuth sign-in**: authorization-code flow with single-use, expiring
//!   CSRF state tokens
//! - **Identity sessions**: explicit session handles, per-identity
//!   serialization of conversation changes
//! - **Conversation threads**: create, switch, append, undo and clear,
//!   persisted after every change
//! - **Moderation**: pure policy gate in front of the generative backend
//! - **Dispatch**: bounded context, bounded retry with backoff, typed
//!   failure classes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod failsafe;
pub mod moderation;
pub mod oauth;
pub mod server;
pub mod service;
pub mod session;
pub mod storage;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`.
///
/// # Errors
///
/// Returns `Error::Internal` if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
