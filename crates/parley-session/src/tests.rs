use crate::*;
use parley_core::{ChatMessage, Role};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(15 * 60);

fn store() -> SessionStore {
    SessionStore::new(StoreConfig {
        default_system_prompt: "default prompt".into(),
        inactivity_window: WINDOW,
    })
}

fn assert_single_system_first(messages: &[ChatMessage]) {
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages.iter().filter(|m| m.role == Role::System).count(), 1);
}

// ========== Reset Commands ==========

#[test]
fn test_reset_command_variants() {
    assert!(is_reset_command("clear"));
    assert!(is_reset_command("Clear"));
    assert!(is_reset_command("  reset  "));
    assert!(is_reset_command("DELETE"));
    assert!(is_reset_command("\treset\n"));
}

#[test]
fn test_reset_command_rejects_other_prompts() {
    assert!(!is_reset_command("clear the table"));
    assert!(!is_reset_command("please reset"));
    assert!(!is_reset_command(""));
    assert!(!is_reset_command("deleted"));
}

// ========== Session ==========

#[test]
fn test_session_new_seeds_system() {
    let s = Session::new("a", 1, "be brief");
    assert_eq!(s.messages, vec![ChatMessage::system("be brief")]);
    assert_eq!(s.system_prompt, "be brief");
}

#[test]
fn test_session_set_system_prompt_in_place() {
    let mut s = Session::new("a", 1, "old");
    s.push(Role::User, "q");
    s.push(Role::Assistant, "a");
    s.set_system_prompt("new");
    assert_eq!(s.message_count(), 3);
    assert_eq!(s.messages[0], ChatMessage::system("new"));
    assert_eq!(s.messages[1], ChatMessage::user("q"));
    assert_eq!(s.turns(), 1);
}

#[test]
fn test_session_display() {
    let s = Session::new("alice", 7, "p");
    let display = format!("{}", s);
    assert!(display.contains("alice"));
    assert!(display.contains("epoch=7"));
}

// ========== get_or_create ==========

#[test]
fn test_get_or_create_uses_default_prompt() {
    let store = store();
    let s = store.get_or_create("u1", None);
    assert_eq!(s.messages, vec![ChatMessage::system("default prompt")]);
    assert_eq!(store.count(), 1);
}

#[test]
fn test_get_or_create_with_override() {
    let store = store();
    let s = store.get_or_create("u1", Some("pirate"));
    assert_eq!(s.system_prompt, "pirate");
    assert_eq!(s.messages[0].content, "pirate");
}

#[test]
fn test_get_or_create_empty_override_ignored() {
    let store = store();
    store.get_or_create("u1", Some("pirate"));
    let s = store.get_or_create("u1", Some(""));
    assert_eq!(s.system_prompt, "pirate");
}

#[test]
fn test_get_or_create_override_existing_keeps_history() {
    let store = store();
    store.get_or_create("u1", None);
    let ticket = store.append_user("u1", "hello").unwrap();
    store.append_assistant(&ticket, "hi").unwrap();

    let s = store.get_or_create("u1", Some("robot"));
    assert_eq!(s.message_count(), 3);
    assert_eq!(s.messages[0], ChatMessage::system("robot"));
    assert_eq!(s.messages[1], ChatMessage::user("hello"));
    assert_eq!(s.messages[2], ChatMessage::assistant("hi"));
}

#[test]
fn test_get_or_create_same_epoch() {
    let store = store();
    let a = store.get_or_create("u1", None);
    let b = store.get_or_create("u1", Some("x"));
    assert_eq!(a.epoch, b.epoch);
}

#[test]
fn test_get_or_create_does_not_arm_expiry() {
    let store = store();
    store.get_or_create("u1", None);
    assert!(!store.has_pending_expiry("u1"));
}

// ========== Appends ==========

#[test]
fn test_append_user_requires_session() {
    let store = store();
    let err = store.append_user("ghost", "hi").unwrap_err();
    assert_eq!(err, SessionError::NotFound { id: "ghost".into() });
    assert!(!store.contains("ghost"));
}

#[test]
fn test_ticket_carries_full_sequence() {
    let store = store();
    let ticket = store.start_turn("u1", Some("sys"), "first");
    assert_eq!(ticket.messages, vec![ChatMessage::system("sys"), ChatMessage::user("first")]);
}

#[test]
fn test_history_round_trip() {
    let store = store();
    for i in 0..5 {
        let ticket = store.start_turn("u1", None, format!("q{i}"));
        store.append_assistant(&ticket, format!("a{i}")).unwrap();
    }
    let history = store.history("u1").unwrap();
    assert_eq!(history.len(), 1 + 2 * 5);
    assert_single_system_first(&history);
    for i in 0..5 {
        assert_eq!(history[1 + 2 * i], ChatMessage::user(format!("q{i}")));
        assert_eq!(history[2 + 2 * i], ChatMessage::assistant(format!("a{i}")));
    }
}

#[test]
fn test_failed_turn_keeps_user_message() {
    let store = store();
    let ok = store.start_turn("u1", None, "q1");
    store.append_assistant(&ok, "a1").unwrap();
    let _failed = store.start_turn("u1", None, "q2");
    let history = store.history("u1").unwrap();
    assert_eq!(history.last(), Some(&ChatMessage::user("q2")));
    assert_single_system_first(&history);
}

#[test]
fn test_history_unknown_id() {
    assert!(store().history("nobody").is_none());
}

// ========== Reset ==========

#[test]
fn test_reset_idempotent() {
    let store = store();
    assert!(!store.reset("never"));
    store.get_or_create("u1", None);
    assert!(store.reset("u1"));
    assert!(!store.reset("u1"));
    assert!(store.get("u1").is_none());
}

#[test]
fn test_reset_clears_request_count() {
    let store = store();
    store.admit_keyless("u1", 10).unwrap();
    store.admit_keyless("u1", 10).unwrap();
    assert_eq!(store.request_count("u1"), 2);
    store.reset("u1");
    assert_eq!(store.request_count("u1"), 0);
}

#[test]
fn test_reset_during_turn_discards_reply() {
    let store = store();
    let ticket = store.start_turn("u1", None, "slow question");
    store.reset("u1");
    let err = store.append_assistant(&ticket, "late reply").unwrap_err();
    assert_eq!(err, SessionError::Superseded { id: "u1".into() });
    assert!(!store.contains("u1"));
}

#[test]
fn test_recreated_session_rejects_stale_reply() {
    let store = store();
    let stale = store.start_turn("u1", None, "before reset");
    store.reset("u1");
    let fresh = store.start_turn("u1", None, "after reset");
    assert_ne!(stale.epoch, fresh.epoch);

    assert!(store.append_assistant(&stale, "old answer").is_err());
    store.append_assistant(&fresh, "new answer").unwrap();

    let history = store.history("u1").unwrap();
    assert_eq!(
        history,
        vec![
            ChatMessage::system("default prompt"),
            ChatMessage::user("after reset"),
            ChatMessage::assistant("new answer"),
        ]
    );
}

// ========== System Invariant ==========

#[test]
fn test_system_singleton_under_random_interactions() {
    let store = store();
    let mut rng = StdRng::seed_from_u64(7);
    for step in 0..500 {
        let system = match rng.gen_range(0..3) {
            0 => None,
            1 => Some(""),
            _ => Some(if rng.gen_bool(0.5) { "alpha" } else { "beta" }),
        };
        let ticket = store.start_turn("u1", system, format!("q{step}"));
        if rng.gen_bool(0.8) {
            let _ = store.append_assistant(&ticket, format!("a{step}"));
        }
        if rng.gen_ratio(1, 50) {
            store.reset("u1");
        }
        if let Some(history) = store.history("u1") {
            assert_single_system_first(&history);
        }
    }
}

// ========== Turn Guard ==========

#[test]
fn test_begin_turn_rejects_concurrent() {
    let store = store();
    let guard = store.begin_turn("u1").unwrap();
    assert_eq!(guard.id(), "u1");
    assert!(store.is_busy("u1"));
    assert_eq!(store.begin_turn("u1").unwrap_err(), SessionError::Busy { id: "u1".into() });
    // Other ids are independent.
    let _other = store.begin_turn("u2").unwrap();
    drop(guard);
    assert!(!store.is_busy("u1"));
    assert!(store.begin_turn("u1").is_ok());
}

#[test]
fn test_reset_allowed_while_busy() {
    let store = store();
    store.get_or_create("u1", None);
    let _guard = store.begin_turn("u1").unwrap();
    assert!(store.reset("u1"));
}

// ========== Request Counter ==========

#[test]
fn test_admit_keyless_boundary() {
    let store = store();
    assert_eq!(store.admit_keyless("u1", 3).unwrap(), 1);
    assert_eq!(store.admit_keyless("u1", 3).unwrap(), 2);
    assert_eq!(store.admit_keyless("u1", 3).unwrap(), 3);
    let err = store.admit_keyless("u1", 3).unwrap_err();
    assert_eq!(err, SessionError::RateLimited { id: "u1".into(), count: 4, limit: 3 });
    // Counters are per id.
    assert!(store.admit_keyless("u2", 3).is_ok());
}

// ========== Expiry ==========

#[tokio::test(start_paused = true)]
async fn test_expiry_after_window() {
    let store = store();
    store.get_or_create("u1", None);
    assert!(store.touch("u1"));
    assert!(store.has_pending_expiry("u1"));

    tokio::time::sleep(WINDOW - Duration::from_secs(1)).await;
    assert!(store.contains("u1"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!store.contains("u1"));
}

#[tokio::test(start_paused = true)]
async fn test_touch_restarts_countdown() {
    let store = store();
    store.get_or_create("u1", None);
    store.touch("u1");

    tokio::time::sleep(WINDOW - Duration::from_secs(1)).await;
    store.touch("u1");

    // Past the first deadline, inside the second.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(store.contains("u1"));

    tokio::time::sleep(WINDOW).await;
    assert!(!store.contains("u1"));
}

#[tokio::test(start_paused = true)]
async fn test_touch_unknown_id() {
    let store = store();
    assert!(!store.touch("ghost"));
}

#[tokio::test(start_paused = true)]
async fn test_expiry_keeps_request_count() {
    let store = store();
    store.admit_keyless("u1", 10).unwrap();
    store.get_or_create("u1", None);
    store.touch("u1");
    tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
    assert!(!store.contains("u1"));
    assert_eq!(store.request_count("u1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_expiry_of_old_session() {
    let store = store();
    store.get_or_create("u1", None);
    store.touch("u1");
    store.reset("u1");

    // A new session created just before the old deadline must survive it.
    tokio::time::sleep(WINDOW - Duration::from_secs(1)).await;
    store.get_or_create("u1", None);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(store.contains("u1"));
}

#[tokio::test(start_paused = true)]
async fn test_expiry_postponed_while_turn_in_flight() {
    let store = store();
    store.get_or_create("u1", None);
    store.touch("u1");
    let guard = store.begin_turn("u1").unwrap();

    tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
    assert!(store.contains("u1"));
    assert!(store.has_pending_expiry("u1"));

    drop(guard);
    tokio::time::sleep(WINDOW).await;
    assert!(!store.contains("u1"));
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_rejects_pending_reply() {
    let store = store();
    let ticket = store.start_turn("u1", None, "q");
    store.touch("u1");
    tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
    assert!(store.append_assistant(&ticket, "late").is_err());
    assert!(!store.contains("u1"));
}

#[tokio::test(start_paused = true)]
async fn test_store_drop_with_pending_timers() {
    let store = store();
    store.get_or_create("u1", None);
    store.touch("u1");
    drop(store);
    tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_arm_if_unscheduled_arms_fresh_session() {
    let store = store();
    store.start_turn("u1", None, "q");
    assert!(store.arm_if_unscheduled("u1"));
    assert!(!store.arm_if_unscheduled("ghost"));

    tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
    assert!(!store.contains("u1"));
}

#[tokio::test(start_paused = true)]
async fn test_arm_if_unscheduled_keeps_existing_deadline() {
    let store = store();
    store.get_or_create("u1", None);
    store.touch("u1");

    tokio::time::sleep(WINDOW - Duration::from_secs(1)).await;
    assert!(!store.arm_if_unscheduled("u1"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!store.contains("u1"));
}
