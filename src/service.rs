//! Chat service facade
//!
//! Wires the state vault, OAuth client, session registry, moderation gate
//! and response dispatcher together. Every operation the UI needs goes
//! through here, addressed by session handle.

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::conversation::{Message, Role, ThreadId, ThreadSummary};
use crate::dispatch::{GeminiBackend, GenerativeBackend, ResponseDispatcher};
use crate::error::{AuthError, DispatchError, StoreError};
use crate::failsafe::BackendHealth;
use crate::moderation::{BlockReason, ModerationGate, Verdict};
use crate::oauth::{CallbackParams, IdentityAssertion, OAuthClient, StateToken, StateTokenVault};
use crate::session::{IdentitySession, SessionRegistry, Teardown};
use crate::storage::{self, Persistence, Profile, UserRecord};
use crate::{Error, Result};

/// Shown when a change could not be written to persistence
pub const PERSIST_WARNING: &str =
    "Your conversation could not be saved and may not survive a restart.";

/// How a submitted message was answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// The backend answered; both turns are in the thread
    Answered {
        /// The appended assistant message
        message: Message,
    },
    /// Moderation blocked the text; nothing was stored or sent
    Blocked {
        /// Why
        reason: BlockReason,
        /// Fixed refusal to show verbatim
        message: &'static str,
    },
    /// The backend failed; the user message was rolled back
    Failed {
        /// Failure class
        kind: &'static str,
        /// Apologetic text to show
        message: &'static str,
        /// Whether resending soon may succeed
        retryable: bool,
    },
}

impl Reply {
    /// Stable short name of the outcome
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Answered { .. } => "answered",
            Self::Blocked { .. } => "blocked",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of a submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    /// Thread the exchange happened in
    pub thread_id: Option<ThreadId>,
    /// The reply
    #[serde(flatten)]
    pub reply: Reply,
    /// Set when persistence failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

/// Result of a thread operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadChange {
    /// Active thread afterwards
    pub active_thread_id: Option<ThreadId>,
    /// Set when persistence failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

/// Threads of the signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadsView {
    /// Active thread
    pub active_thread_id: Option<ThreadId>,
    /// Every thread, most recent first
    pub threads: Vec<ThreadSummary>,
    /// Messages of the active thread, in order
    pub messages: Vec<Message>,
}

/// Profile fields the person may change
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    /// New career stage
    pub career_stage: Option<String>,
    /// New interest list
    pub interests: Option<Vec<String>>,
}

/// Signed-in identity returned by login
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    /// Session handle for later calls
    pub session_id: String,
    /// Who signed in
    pub identity: IdentityAssertion,
    /// Thread restored as active
    pub active_thread_id: Option<ThreadId>,
}

/// Facade over the session core
pub struct ChatService {
    oauth: OAuthClient,
    sessions: SessionRegistry,
    gate: ModerationGate,
    dispatcher: ResponseDispatcher,
}

impl ChatService {
    /// Build the service from configuration, talking to Gemini
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client, the storage backend, or the
    /// moderation policy cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("asha-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        let persistence = storage::from_config(&config.storage)?;
        let backend = Arc::new(GeminiBackend::new(http_client.clone(), &config.dispatch));
        Self::new(config, http_client, persistence, backend)
    }

    /// Build the service with explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns an error if the OAuth endpoints or moderation patterns in
    /// `config` are invalid.
    pub fn new(
        config: &Config,
        http_client: Client,
        persistence: Arc<dyn Persistence>,
        backend: Arc<dyn GenerativeBackend>,
    ) -> Result<Self> {
        let vault = Arc::new(StateTokenVault::new(config.state.ttl));
        let oauth = OAuthClient::new(http_client, &config.oauth, Arc::clone(&vault))?;
        let sessions = SessionRegistry::new(persistence, vault);
        let gate = ModerationGate::from_config(&config.moderation)?;
        let dispatcher = ResponseDispatcher::new(backend, &config.dispatch);

        Ok(Self {
            oauth,
            sessions,
            gate,
            dispatcher,
        })
    }

    /// Moderation gate in use
    #[must_use]
    pub fn gate(&self) -> &ModerationGate {
        &self.gate
    }

    /// Generative backend health
    #[must_use]
    pub fn backend_health(&self) -> BackendHealth {
        self.dispatcher.health()
    }

    /// Number of live sessions
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Look up a live session
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` for an unknown session.
    pub fn session(&self, session_id: &str) -> Result<Arc<IdentitySession>> {
        self.sessions.get(session_id)
    }

    /// Drop state tokens that outlived their TTL
    pub fn purge_expired_states(&self) -> usize {
        self.oauth.vault().purge_expired()
    }

    /// Start sign-in: provider URL with a fresh state token
    pub fn authorization_url(&self, visit: Option<&str>) -> (Url, StateToken) {
        self.oauth.build_authorization_url(visit)
    }

    /// Finish sign-in from the provider redirect
    ///
    /// No session exists unless the state is valid and the exchange
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` of the failed step.
    pub async fn login(
        &self,
        callback: CallbackParams,
        visit: Option<String>,
    ) -> std::result::Result<LoginOutcome, AuthError> {
        // A provider error still ends the handshake for its state
        if callback.error.is_some() {
            if let Some(state) = callback.state.as_deref() {
                let _ = self.oauth.vault().validate(state);
            }
        }
        let grant = callback.into_grant()?;

        let identity = self.oauth.exchange(&grant.code, &grant.state).await?;
        let session = self.sessions.establish(identity.clone(), visit);

        Ok(LoginOutcome {
            session_id: session.id().to_string(),
            identity,
            active_thread_id: session.active_thread_id().await,
        })
    }

    /// Checkpoint the active thread and start a new one
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` for an unknown session.
    pub async fn create_thread(&self, session_id: &str) -> Result<ThreadChange> {
        let session = self.sessions.get(session_id)?;
        let mut record = session.record().lock().await;

        let id = record.conversations.create_thread();
        let warning = self.persist(&session, &mut record);

        Ok(ThreadChange {
            active_thread_id: Some(id),
            warning,
        })
    }

    /// Make another thread active
    ///
    /// # Errors
    ///
    /// - `Error::SessionNotFound` for an unknown session
    /// - `StoreError::NotFound` for an unknown thread (nothing changes)
    pub async fn switch_thread(&self, session_id: &str, thread_id: &ThreadId) -> Result<ThreadChange> {
        let session = self.sessions.get(session_id)?;
        let mut record = session.record().lock().await;

        record.conversations.switch_thread(thread_id)?;
        let warning = self.persist(&session, &mut record);

        Ok(ThreadChange {
            active_thread_id: Some(thread_id.clone()),
            warning,
        })
    }

    /// Submit a user message
    ///
    /// Blocked text is neither stored nor sent. Allowed text is appended
    /// and persisted, then sent with the preceding context; the reply is
    /// appended, or on failure the user message is rolled back.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` for an unknown session. Backend
    /// failures are reported in the outcome, never as an error.
    pub async fn submit(&self, session_id: &str, text: &str) -> Result<SubmitOutcome> {
        let session = self.sessions.get(session_id)?;

        if let Verdict::Block(reason) = self.gate.check(text) {
            return Ok(SubmitOutcome {
                thread_id: session.active_thread_id().await,
                reply: Reply::Blocked {
                    reason,
                    message: reason.message(),
                },
                warning: None,
            });
        }

        let text = text.trim();
        let mut turn = PendingTurn {
            service: self,
            session: session.as_ref(),
            record: session.record().lock().await,
            settled: false,
        };

        let context = turn
            .record
            .conversations
            .recent_context(self.dispatcher.context_messages())
            .to_vec();
        turn.record.conversations.append_message(Role::User, text);
        let mut warning = self.persist(&session, &mut turn.record);

        let reply = match self.dispatcher.send(text, &context).await {
            Ok(answer) => {
                let message = turn
                    .record
                    .conversations
                    .append_message(Role::Assistant, answer)
                    .clone();
                Reply::Answered { message }
            }
            Err(e) => {
                turn.record.conversations.undo_last_append();
                failure_reply(&e)
            }
        };
        turn.settled = true;
        warning = self.persist(&session, &mut turn.record).or(warning);

        debug!(subject = %session.subject(), status = reply.status(), "Message handled");

        Ok(SubmitOutcome {
            thread_id: turn.record.conversations.active_thread_id().cloned(),
            reply,
            warning,
        })
    }

    /// Empty the active thread in place
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` for an unknown session.
    pub async fn clear_active(&self, session_id: &str) -> Result<ThreadChange> {
        let session = self.sessions.get(session_id)?;
        let mut record = session.record().lock().await;

        let warning = if record.conversations.clear_active() {
            self.persist(&session, &mut record)
        } else {
            None
        };

        Ok(ThreadChange {
            active_thread_id: record.conversations.active_thread_id().cloned(),
            warning,
        })
    }

    /// Change declared profile attributes
    ///
    /// # Errors
    ///
    /// - `Error::SessionNotFound` for an unknown session
    /// - `StoreError::PersistFailed` if the change could not be saved
    pub async fn update_profile(&self, session_id: &str, update: ProfileUpdate) -> Result<Profile> {
        let session = self.sessions.get(session_id)?;
        let mut record = session.record().lock().await;

        if let Some(stage) = update.career_stage {
            record.profile.career_stage = stage.trim().to_string();
        }
        if let Some(interests) = update.interests {
            record.profile.interests = interests
                .into_iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect();
        }

        self.sessions.persist(&session, &mut record)?;
        info!(subject = %session.subject(), "Profile updated");
        Ok(record.profile.clone())
    }

    /// Threads and active conversation of the identity
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` for an unknown session.
    pub async fn threads(&self, session_id: &str) -> Result<ThreadsView> {
        let session = self.sessions.get(session_id)?;
        let record = session.record().lock().await;
        Ok(view(&record))
    }

    /// Sign out
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionNotFound` for an unknown session.
    pub async fn logout(&self, session_id: &str) -> Result<Teardown> {
        self.sessions.teardown(session_id).await
    }

    fn persist(&self, session: &IdentitySession, record: &mut UserRecord) -> Option<&'static str> {
        self.sessions
            .persist(session, record)
            .err()
            .map(|_: StoreError| PERSIST_WARNING)
    }
}

/// A user message waiting for its reply, with the record lock held
///
/// Dropped before it is settled (the submitting future was cancelled), it
/// removes the unanswered message and saves the record again.
struct PendingTurn<'a> {
    service: &'a ChatService,
    session: &'a IdentitySession,
    record: MutexGuard<'a, UserRecord>,
    settled: bool,
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.record.conversations.undo_last_append();
        warn!(subject = %self.session.subject(), "Submit cancelled, unanswered message rolled back");
        let _ = self.service.persist(self.session, &mut self.record);
    }
}

fn view(record: &UserRecord) -> ThreadsView {
    let conversations = &record.conversations;
    ThreadsView {
        active_thread_id: conversations.active_thread_id().cloned(),
        threads: conversations.summaries(),
        messages: conversations
            .active_thread()
            .map(|t| t.messages().to_vec())
            .unwrap_or_default(),
    }
}

fn failure_reply(error: &DispatchError) -> Reply {
    warn!(kind = error.kind(), "Rolled back message after backend failure");
    let message = match error {
        DispatchError::RateLimited(_) => {
            "I'm getting a lot of questions right now. Please try again in a moment."
        }
        DispatchError::ServiceUnavailable(_) => {
            "I couldn't reach the assistant just now. Please try again."
        }
        DispatchError::Malformed(_) => {
            "I didn't get a valid response. Could you try rephrasing your question?"
        }
        DispatchError::Unknown(_) => {
            "Something went wrong on my side. Please try again or rephrase your question."
        }
    };
    Reply::Failed {
        kind: error.kind(),
        message,
        retryable: error.is_retryable(),
    }
}
