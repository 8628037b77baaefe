//! Optimistic actions: rollback, notices, deferred-commit undo.

mod common;

use std::time::Duration;

use taskcal_sync::actions::Notice;
use taskcal_sync::error::SyncError;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{api_task_json, harness, local_task, seed};

fn synced_task(server_id: i64, title: &str) -> taskcal_sync::task::Task {
    let mut task = local_task(title, None);
    task.id = server_id.to_string();
    task.server_id = Some(server_id);
    task.dirty = false;
    task
}

#[tokio::test]
async fn test_failed_toggle_rolls_back_and_notifies() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/tasks/5"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    seed(&h.store, vec![synced_task(5, "report")]);
    let mut notices = h.actions.subscribe_notices();

    let err = h.actions.toggle_task("5").await.unwrap_err();
    assert!(matches!(err, SyncError::Http { .. }));

    // The optimistic flip was undone wholesale.
    let task = h.store.find_task("5").unwrap();
    assert!(!task.completed);
    assert!(!task.dirty);
    assert!(matches!(notices.try_recv(), Ok(Notice::Reverted { .. })));
}

#[tokio::test]
async fn test_successful_toggle_sends_single_field_and_clears_dirty() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/tasks/5"))
        .and(body_partial_json(serde_json::json!({ "completed": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(api_task_json(5, "report", None)))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    seed(&h.store, vec![synced_task(5, "report")]);
    let mut notices = h.actions.subscribe_notices();

    h.actions.toggle_task("5").await.unwrap();
    let task = h.store.find_task("5").unwrap();
    assert!(task.completed);
    assert!(!task.dirty);
    // Success is silent; no notice reaches the user.
    assert!(notices.try_recv().is_err());

    let put = &server.received_requests().await.unwrap()[0];
    let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
    assert_eq!(body, serde_json::json!({ "completed": true }));
}

#[tokio::test]
async fn test_failed_edit_restores_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/tasks/5"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    seed(&h.store, vec![synced_task(5, "original")]);

    let err = h
        .actions
        .edit_task(
            "5",
            taskcal_sync::actions::TaskEdit {
                title: Some("renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Http { .. }));
    assert_eq!(h.store.find_task("5").unwrap().title, "original");
}

#[tokio::test]
async fn test_add_task_relinks_to_server_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(api_task_json(77, "new", None)))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    h.actions.add_task(local_task("new", None)).await.unwrap();

    let tasks = taskcal_sync::task::flatten_tasks(&h.store.get());
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "77");
    assert_eq!(tasks[0].server_id, Some(77));
    assert!(!tasks[0].dirty);
}

#[tokio::test]
async fn test_failed_add_keeps_task_local_and_dirty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tasks"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    let task = local_task("stays local", None);
    let id = task.id.clone();
    h.actions.add_task(task).await.unwrap();

    let kept = h.store.find_task(&id).unwrap();
    assert!(kept.dirty);
    assert!(kept.server_id.is_none());
}

#[tokio::test]
async fn test_undo_within_grace_window_cancels_deletion() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/tasks/5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    seed(&h.store, vec![synced_task(5, "keep me")]);
    let mut notices = h.actions.subscribe_notices();

    assert!(h.actions.schedule_delete("5"));
    assert_eq!(h.actions.pending_delete_ids(), vec!["5".to_string()]);
    assert!(h.actions.undo_delete("5"));

    // Wait well past the (shortened) grace window.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.store.find_task("5").is_some());
    assert!(h.actions.pending_delete_ids().is_empty());
    assert!(matches!(notices.try_recv(), Ok(Notice::Deleted { .. })));
    assert!(matches!(notices.try_recv(), Ok(Notice::Restored)));
}

#[tokio::test]
async fn test_elapsed_grace_window_commits_deletion() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/tasks/5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    seed(&h.store, vec![synced_task(5, "goes away")]);

    assert!(h.actions.schedule_delete("5"));
    // The task stays visible in the store until the window elapses.
    assert!(h.store.find_task("5").is_some());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.store.find_task("5").is_none());
    assert!(h.actions.pending_delete_ids().is_empty());
}

#[tokio::test]
async fn test_undo_after_window_is_a_noop() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/tasks/5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    seed(&h.store, vec![synced_task(5, "gone")]);

    assert!(h.actions.schedule_delete("5"));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!h.actions.undo_delete("5"));
    assert!(h.store.find_task("5").is_none());
}

#[tokio::test]
async fn test_failed_remote_delete_restores_the_task() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/tasks/5"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    seed(&h.store, vec![synced_task(5, "resilient")]);
    let mut notices = h.actions.subscribe_notices();

    let err = h.actions.delete_task_now("5").await.unwrap_err();
    assert!(matches!(err, SyncError::Http { .. }));
    assert!(h.store.find_task("5").is_some());
    assert!(matches!(notices.try_recv(), Ok(Notice::Reverted { .. })));
}
