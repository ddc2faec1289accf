//! Conversation tests through the service facade
//!
//! Covers moderation before storage, rollback after backend failure,
//! thread checkpointing and switching, and persistence across logins.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pretty_assertions::assert_eq;

use asha_core::Error;
use asha_core::conversation::{Role, ThreadId};
use asha_core::error::{DispatchError, StoreError};
use asha_core::moderation::BlockReason;
use asha_core::service::{PERSIST_WARNING, ProfileUpdate, Reply};
use asha_core::storage::{FileStore, MemoryStore, UserRecord, load_record, save_record};

use common::{
    FailingStore, ScriptedBackend, StalledBackend, config_for, memory_service, service, sign_in, sign_in_from,
    spawn_identity_provider,
};

fn texts(messages: &[asha_core::conversation::Message]) -> Vec<(Role, &str)> {
    messages.iter().map(|m| (m.role, m.text.as_str())).collect()
}

/// A user turn and its reply are stored in order
#[tokio::test]
async fn test_submit_appends_both_turns() {
    let backend = ScriptedBackend::new(vec![Ok("Hi!".to_string())]);
    let service = memory_service(backend.clone()).await;
    let sid = sign_in(&service).await.session_id;

    let outcome = service.submit(&sid, "Hello").await.unwrap();
    assert!(matches!(outcome.reply, Reply::Answered { ref message } if message.text == "Hi!"));
    assert!(outcome.warning.is_none());

    let view = service.threads(&sid).await.unwrap();
    assert_eq!(
        texts(&view.messages),
        vec![(Role::User, "Hello"), (Role::Assistant, "Hi!")]
    );
    assert_eq!(view.threads.len(), 1);
    assert_eq!(view.threads[0].title, "Hello");
    assert_eq!(outcome.thread_id, view.active_thread_id);
}

/// Context sent to the backend excludes the new message and is bounded
#[tokio::test]
async fn test_context_is_previous_turns_only() {
    let backend = ScriptedBackend::new(vec![Ok("Hi!".to_string()), Ok("Sure.".to_string())]);
    let service = memory_service(backend.clone()).await;
    let sid = sign_in(&service).await.session_id;

    service.submit(&sid, "Hello").await.unwrap();
    service.submit(&sid, "Resume tips?").await.unwrap();

    let prompts = backend.prompts();
    assert!(prompts[0].history.is_empty());
    assert_eq!(prompts[1].user_text, "Resume tips?");
    assert_eq!(
        texts(&prompts[1].history),
        vec![(Role::User, "Hello"), (Role::Assistant, "Hi!")]
    );
}

/// Blocked text never reaches the backend or any thread
#[tokio::test]
async fn test_blocked_text_is_not_stored_or_sent() {
    let backend = ScriptedBackend::new(vec![]);
    let service = memory_service(backend.clone()).await;
    let sid = sign_in(&service).await.session_id;
    service.submit(&sid, "Hello").await.unwrap();

    let outcome = service.submit(&sid, "gender war").await.unwrap();
    assert_eq!(
        outcome.reply,
        Reply::Blocked {
            reason: BlockReason::Policy,
            message: BlockReason::Policy.message(),
        }
    );
    assert_eq!(backend.calls(), 1);

    let view = service.threads(&sid).await.unwrap();
    assert!(view.messages.iter().all(|m| !m.text.contains("gender war")));
    assert_eq!(view.messages.len(), 2);
}

/// Malformed input is refused without creating a thread
#[tokio::test]
async fn test_malformed_text_creates_nothing() {
    let backend = ScriptedBackend::new(vec![]);
    let service = memory_service(backend.clone()).await;
    let sid = sign_in(&service).await.session_id;

    let outcome = service.submit(&sid, "  ?!  ").await.unwrap();
    assert!(matches!(
        outcome.reply,
        Reply::Blocked { reason: BlockReason::Malformed, .. }
    ));
    assert_eq!(backend.calls(), 0);
    assert!(service.threads(&sid).await.unwrap().threads.is_empty());
}

/// Three unavailable attempts roll the user message back
#[tokio::test]
async fn test_backend_failure_rolls_back_user_turn() {
    let unavailable = || Err(DispatchError::ServiceUnavailable("503".to_string()));
    let backend = ScriptedBackend::new(vec![
        Ok("Hi!".to_string()),
        unavailable(),
        unavailable(),
        unavailable(),
    ]);
    let service = memory_service(backend.clone()).await;
    let sid = sign_in(&service).await.session_id;
    service.submit(&sid, "Hello").await.unwrap();

    let outcome = service.submit(&sid, "Any openings?").await.unwrap();
    assert!(matches!(
        outcome.reply,
        Reply::Failed { kind: "service_unavailable", retryable: true, .. }
    ));
    assert_eq!(backend.calls(), 4);

    let view = service.threads(&sid).await.unwrap();
    assert_eq!(
        texts(&view.messages),
        vec![(Role::User, "Hello"), (Role::Assistant, "Hi!")]
    );
}

/// A failed first message leaves no empty thread behind
#[tokio::test]
async fn test_failed_first_message_leaves_no_thread() {
    let backend = ScriptedBackend::new(vec![Err(DispatchError::Unknown("400".to_string()))]);
    let service = memory_service(backend).await;
    let sid = sign_in(&service).await.session_id;

    let outcome = service.submit(&sid, "Hello").await.unwrap();
    assert!(matches!(outcome.reply, Reply::Failed { retryable: false, .. }));
    assert_eq!(outcome.thread_id, None);

    let view = service.threads(&sid).await.unwrap();
    assert!(view.threads.is_empty());
    assert_eq!(view.active_thread_id, None);
}

/// A submit abandoned mid-dispatch leaves no unanswered user turn
#[tokio::test]
async fn test_cancelled_submit_rolls_back_user_turn() {
    let store = Arc::new(MemoryStore::new());
    let mut seeded = UserRecord::default();
    seeded.conversations.append_message(Role::User, "Hello");
    seeded.conversations.append_message(Role::Assistant, "Hi!");
    save_record(store.as_ref(), "meera@example.org", &mut seeded).unwrap();

    let idp = spawn_identity_provider("meera@example.org").await;
    let service = service(&config_for(idp), store.clone(), Arc::new(StalledBackend));
    let sid = sign_in(&service).await.session_id;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        service.submit(&sid, "How do I write a resume?"),
    )
    .await;
    assert!(abandoned.is_err());

    let expected = vec![(Role::User, "Hello"), (Role::Assistant, "Hi!")];
    let view = service.threads(&sid).await.unwrap();
    assert_eq!(texts(&view.messages), expected);

    let stored = load_record(store.as_ref(), "meera@example.org");
    let stored_messages = stored.conversations.active_thread().unwrap().messages();
    assert_eq!(texts(stored_messages), expected);
}

/// An abandoned first message leaves no thread behind, in memory or stored
#[tokio::test]
async fn test_cancelled_first_submit_leaves_no_thread() {
    let store = Arc::new(MemoryStore::new());
    let idp = spawn_identity_provider("meera@example.org").await;
    let service = service(&config_for(idp), store.clone(), Arc::new(StalledBackend));
    let sid = sign_in(&service).await.session_id;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), service.submit(&sid, "Hello")).await;
    assert!(abandoned.is_err());

    let view = service.threads(&sid).await.unwrap();
    assert!(view.threads.is_empty());
    assert_eq!(view.active_thread_id, None);
    assert!(load_record(store.as_ref(), "meera@example.org").conversations.is_empty());
}

/// Creating a thread checkpoints the old one under its id
#[tokio::test]
async fn test_new_thread_keeps_previous_one() {
    let service = memory_service(ScriptedBackend::new(vec![Ok("Hi!".to_string())])).await;
    let sid = sign_in(&service).await.session_id;
    service.submit(&sid, "Hello").await.unwrap();
    let old = service.threads(&sid).await.unwrap().active_thread_id.unwrap();

    let change = service.create_thread(&sid).await.unwrap();
    let new = change.active_thread_id.unwrap();
    assert_ne!(new, old);

    let view = service.threads(&sid).await.unwrap();
    assert_eq!(view.active_thread_id, Some(new));
    assert!(view.messages.is_empty());
    let previous = view.threads.iter().find(|t| t.id == old).unwrap();
    assert_eq!(previous.title, "Hello");
    assert_eq!(previous.message_count, 2);

    service.switch_thread(&sid, &old).await.unwrap();
    let view = service.threads(&sid).await.unwrap();
    assert_eq!(view.messages.len(), 2);
}

/// Switching to an unknown thread changes nothing
#[tokio::test]
async fn test_switch_to_unknown_thread_fails() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;
    let sid = sign_in(&service).await.session_id;
    service.submit(&sid, "Hello").await.unwrap();
    let before = service.threads(&sid).await.unwrap();

    let err = service
        .switch_thread(&sid, &ThreadId::from("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::NotFound(_))));
    assert_eq!(service.threads(&sid).await.unwrap(), before);
}

/// Clearing empties the active thread but keeps its id
#[tokio::test]
async fn test_clear_active_keeps_thread() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;
    let sid = sign_in(&service).await.session_id;
    service.submit(&sid, "Hello").await.unwrap();
    let id = service.threads(&sid).await.unwrap().active_thread_id;

    let change = service.clear_active(&sid).await.unwrap();
    assert_eq!(change.active_thread_id, id);

    let view = service.threads(&sid).await.unwrap();
    assert!(view.messages.is_empty());
    assert_eq!(view.active_thread_id, id);
}

/// Conversations and profile survive logout and a fresh login
#[tokio::test]
async fn test_conversations_persist_across_logins() {
    let dir = tempfile::tempdir().unwrap();
    let idp = spawn_identity_provider("meera@example.org").await;
    let config = config_for(idp);
    let store = Arc::new(FileStore::new(dir.path().to_path_buf()).unwrap());

    let first = service(&config, store.clone(), ScriptedBackend::new(vec![]));
    let sid = sign_in_from(&first, Some("visit-1")).await.session_id;
    first.submit(&sid, "Hello").await.unwrap();
    first
        .update_profile(
            &sid,
            ProfileUpdate {
                career_stage: Some("returning after a break".to_string()),
                interests: Some(vec!["data science".to_string(), " ".to_string()]),
            },
        )
        .await
        .unwrap();
    let thread = first.threads(&sid).await.unwrap().active_thread_id;
    first.logout(&sid).await.unwrap();
    assert!(matches!(first.threads(&sid).await, Err(Error::SessionNotFound(_))));

    // A new process sees the same data
    let second = service(&config, store.clone(), ScriptedBackend::new(vec![]));
    let outcome = sign_in(&second).await;
    assert_eq!(outcome.active_thread_id, thread);

    let view = second.threads(&outcome.session_id).await.unwrap();
    assert_eq!(view.messages.len(), 2);

    let record = load_record(store.as_ref(), "meera@example.org");
    assert_eq!(record.profile.career_stage, "returning after a break");
    assert_eq!(record.profile.interests, vec!["data science".to_string()]);
    assert_eq!(record.profile.display_name, "Meera Iyer");
}

/// Logout purges only the state tokens of its own visit
#[tokio::test]
async fn test_logout_purges_visit_states() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;
    let sid = sign_in_from(&service, Some("visit-1")).await.session_id;
    let (_, _) = service.authorization_url(Some("visit-1"));
    let (_, _) = service.authorization_url(Some("visit-2"));

    let teardown = service.logout(&sid).await.unwrap();
    assert_eq!(teardown.purged_states, 1);
    assert!(teardown.persist_error.is_none());
}

/// A broken store warns but keeps the in-memory conversation
#[tokio::test]
async fn test_persist_failure_is_a_warning() {
    let idp = spawn_identity_provider("meera@example.org").await;
    let store = Arc::new(FailingStore::default());
    let service = service(&config_for(idp), store.clone(), ScriptedBackend::new(vec![]));
    let sid = sign_in(&service).await.session_id;

    let outcome = service.submit(&sid, "Hello").await.unwrap();
    assert!(matches!(outcome.reply, Reply::Answered { .. }));
    assert_eq!(outcome.warning, Some(PERSIST_WARNING));
    assert!(store.attempts.load(Ordering::SeqCst) >= 2);
    assert_eq!(service.threads(&sid).await.unwrap().messages.len(), 2);

    let teardown = service.logout(&sid).await.unwrap();
    assert!(teardown.persist_error.is_some());
}

/// Two sessions of one identity see the same threads
#[tokio::test]
async fn test_sessions_of_one_identity_share_threads() {
    let service = memory_service(ScriptedBackend::new(vec![])).await;
    let laptop = sign_in(&service).await.session_id;
    let phone = sign_in(&service).await.session_id;

    service.submit(&laptop, "Hello").await.unwrap();
    assert_eq!(service.threads(&phone).await.unwrap().messages.len(), 2);

    // Logging out one device keeps the other working
    service.logout(&laptop).await.unwrap();
    service.submit(&phone, "Still here").await.unwrap();
    assert_eq!(service.threads(&phone).await.unwrap().messages.len(), 4);
}

/// Concurrent submits of one identity never interleave turns
#[tokio::test]
async fn test_concurrent_submits_are_serialized() {
    let service = Arc::new(memory_service(ScriptedBackend::new(vec![])).await);
    let sid = sign_in(&service).await.session_id;

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let service = Arc::clone(&service);
            let sid = sid.clone();
            tokio::spawn(async move { service.submit(&sid, &format!("question {i}")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let view = service.threads(&sid).await.unwrap();
    assert_eq!(view.messages.len(), 12);
    for pair in view.messages.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
}

/// A memory store starts each identity empty
#[tokio::test]
async fn test_first_login_has_no_threads() {
    let store = Arc::new(MemoryStore::new());
    let idp = spawn_identity_provider("anita@example.org").await;
    let service = service(&config_for(idp), store.clone(), ScriptedBackend::new(vec![]));

    let outcome = sign_in(&service).await;
    assert_eq!(outcome.identity.subject_email(), "anita@example.org");
    assert!(service.threads(&outcome.session_id).await.unwrap().threads.is_empty());
    assert!(store.is_empty());
}
