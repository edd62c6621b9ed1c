//! Unit tests for `SessionManager`.
//!
//! These tests exercise the session registry directly, without performing
//! any WebSocket upgrades. They verify attach/detach semantics, frame
//! forwarding, and graceful shutdown behaviour.

use axum::extract::ws::Message;
use synchub_api::runner::RunEvent;
use synchub_api::ws::SessionManager;

// ---------------------------------------------------------------------------
// Test: new manager starts with zero sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_manager_has_zero_sessions() {
    let manager = SessionManager::new();

    assert_eq!(manager.count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: attach() registers the session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attach_registers_session() {
    let manager = SessionManager::new();

    let _rx = manager.attach(1).await;

    assert_eq!(manager.count().await, 1);
    assert!(manager.is_attached(1).await);
}

// ---------------------------------------------------------------------------
// Test: detach() removes the session and nothing else
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detach_removes_session() {
    let manager = SessionManager::new();

    let _rx = manager.attach(1).await;
    assert_eq!(manager.count().await, 1);

    manager.detach(1).await;
    assert_eq!(manager.count().await, 0);
    assert!(!manager.is_attached(1).await);
}

// ---------------------------------------------------------------------------
// Test: detach() with unknown run id is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detach_unknown_run_is_noop() {
    let manager = SessionManager::new();

    let _rx = manager.attach(1).await;
    manager.detach(999).await;

    assert_eq!(manager.count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: send_to() delivers to the attached session only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_to_delivers_to_attached_session() {
    let manager = SessionManager::new();

    let mut rx = manager.attach(7).await;

    assert!(manager.send_to(7, Message::Text("hello".into())).await);
    let msg = rx.recv().await.expect("session should receive message");
    assert!(matches!(&msg, Message::Text(t) if *t == "hello"));

    // No session attached for run 8.
    assert!(!manager.send_to(8, Message::Text("nope".into())).await);
}

// ---------------------------------------------------------------------------
// Test: forward() frames events with run id and timestamp
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forward_frames_process_events() {
    let manager = SessionManager::new();

    let mut rx = manager.attach(42).await;

    let delivered = manager
        .forward(42, &RunEvent::Stdout("synced 3 files".to_string()))
        .await;
    assert!(delivered);

    let msg = rx.recv().await.expect("session should receive frame");
    let Message::Text(text) = msg else {
        panic!("Expected text frame, got: {msg:?}");
    };
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["type"], "stdout");
    assert_eq!(json["data"], "synced 3 files");
    assert_eq!(json["runId"], 42);
    assert!(json["timestamp"].is_string());
}

// ---------------------------------------------------------------------------
// Test: forward() to a detached run reports not-delivered
// ---------------------------------------------------------------------------

#[tokio::test]
async fn forward_to_detached_run_is_not_delivered() {
    let manager = SessionManager::new();

    let rx = manager.attach(5).await;
    manager.detach(5).await;
    drop(rx);

    let delivered = manager
        .forward(5, &RunEvent::Stderr("lost line".to_string()))
        .await;
    assert!(!delivered);
}

// ---------------------------------------------------------------------------
// Test: attaching twice replaces the previous session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_attach_replaces_previous_session() {
    let manager = SessionManager::new();

    let _rx_old = manager.attach(3).await;
    assert_eq!(manager.count().await, 1);

    // Re-attach with the same run id -- should replace, not duplicate.
    let mut rx_new = manager.attach(3).await;
    assert_eq!(manager.count().await, 1);

    manager.send_to(3, Message::Text("replaced".into())).await;
    let msg = rx_new.recv().await.expect("new rx should receive message");
    assert!(matches!(&msg, Message::Text(t) if *t == "replaced"));
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = SessionManager::new();

    let mut rx1 = manager.attach(1).await;
    let mut rx2 = manager.attach(2).await;
    assert_eq!(manager.count().await, 2);

    manager.shutdown_all().await;

    assert_eq!(manager.count().await, 0);

    let msg1 = rx1.recv().await.expect("rx1 should receive Close");
    assert!(
        matches!(msg1, Message::Close(None)),
        "Expected Close(None), got: {msg1:?}"
    );

    let msg2 = rx2.recv().await.expect("rx2 should receive Close");
    assert!(
        matches!(msg2, Message::Close(None)),
        "Expected Close(None), got: {msg2:?}"
    );
}
