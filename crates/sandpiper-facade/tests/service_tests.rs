//! Service-level tests against the in-memory store. Paths that need a live
//! Chrome are marked ignored, matching the workspace convention.

use sandpiper_config::SandpiperConfig;
use sandpiper_facade::{Sandpiper, ServiceError};
use sandpiper_persistence::Store;
use sandpiper_types::{Action, ActionKind, WorkflowDraft, MAX_WORKFLOW_ACTIONS};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn service() -> Sandpiper {
    let store = Store::open_in_memory().await.expect("in-memory store");
    Sandpiper::start_with_store(SandpiperConfig::default(), store).expect("service")
}

fn click_draft(name: &str, actions: usize) -> WorkflowDraft {
    WorkflowDraft {
        name: name.to_string(),
        url: "https://ex.com/".to_string(),
        actions: (0..actions)
            .map(|_| Action::on(ActionKind::Click, "#go"))
            .collect(),
        tags: vec!["smoke".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn workflow_crud_round_trip() {
    let service = service().await;

    let created = service.create_workflow(click_draft("login", 2)).await.unwrap();
    let fetched = service.get_workflow(created.id).await.unwrap();
    assert_eq!(fetched.name, "login");
    assert_eq!(fetched.actions.len(), 2);

    let updated = service
        .update_workflow(created.id, click_draft("login-v2", 3))
        .await
        .unwrap();
    assert_eq!(updated.name, "login-v2");
    assert_eq!(updated.actions.len(), 3);

    let listed = service.list_workflows().await.unwrap();
    assert_eq!(listed.len(), 1);

    let found = service.search_workflows_by_name("LOGIN").await.unwrap();
    assert_eq!(found.len(), 1);
    let tagged = service.search_workflows_by_tag("smo").await.unwrap();
    assert_eq!(tagged.len(), 1);

    service.delete_workflow(created.id).await.unwrap();
    assert!(service.get_workflow(created.id).await.is_err());

    service.shutdown().await;
}

#[tokio::test]
async fn workflow_validation_boundaries_apply_at_the_facade() {
    let service = service().await;

    // The cap itself is fine.
    let ok = service
        .create_workflow(click_draft("big", MAX_WORKFLOW_ACTIONS))
        .await;
    assert!(ok.is_ok());

    // One past the cap is a validation failure.
    let err = service
        .create_workflow(click_draft("too-big", MAX_WORKFLOW_ACTIONS + 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    service.shutdown().await;
}

#[tokio::test]
async fn extract_raw_rejects_bad_inputs_before_touching_the_pool() {
    let service = service().await;

    let err = service
        .extract_raw("https://ex.com/", "xml", "h1", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = service
        .extract_raw("https://ex.com/", "html", "h1", Some("whenever"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = service
        .extract_raw("", "html", "h1", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    // Unknown option keys are rejected, not ignored.
    let err = service
        .extract_raw(
            "https://ex.com/",
            "html",
            "h1",
            None,
            Some(serde_json::json!({"removeScriptz": true})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    service.shutdown().await;
}

#[tokio::test]
async fn execute_actions_requires_url_and_actions() {
    let service = service().await;
    let cancel = CancellationToken::new();

    let err = service.execute_actions("", &[], &cancel).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = service
        .execute_actions("https://ex.com/", &[], &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    service.shutdown().await;
}

#[tokio::test]
async fn recorder_operations_on_unknown_sessions_fail_cleanly() {
    let service = service().await;
    let id = Uuid::new_v4();

    assert_eq!(
        service.start_recording(id).await.unwrap_err().kind(),
        "recorder"
    );
    assert_eq!(service.recorder_actions(id).unwrap_err().kind(), "recorder");
    assert_eq!(
        service
            .create_recorder_session("", None)
            .await
            .unwrap_err()
            .kind(),
        "validation"
    );

    service.shutdown().await;
}

#[tokio::test]
async fn cache_metrics_start_at_zero() {
    let service = service().await;
    let metrics = service.cache_metrics();
    assert_eq!(metrics.hits, 0);
    assert_eq!(metrics.misses, 0);
    assert_eq!(metrics.hit_rate(), 0.0);

    let stats = service.pool_stats().await;
    assert_eq!(stats.in_use, 0);

    service.shutdown().await;
}

#[tokio::test]
#[ignore = "requires Chrome - run with: cargo test -- --ignored"]
async fn repeated_extraction_hits_the_cache_with_the_same_key() {
    let service = service().await;
    let url = "data:text/html,<h1>Hi</h1>";

    let first = service
        .extract_raw(url, "html", "h1", None, None)
        .await
        .unwrap();
    assert!(!first.cache.hit);
    assert_eq!(first.data, "Hi");
    assert_eq!(first.cache.key.len(), 32);

    let second = service
        .extract_raw(url, "html", "h1", None, None)
        .await
        .unwrap();
    assert!(second.cache.hit);
    assert_eq!(second.cache.key, first.cache.key);
    assert_eq!(second.data, first.data);

    service.shutdown().await;
}

#[tokio::test]
#[ignore = "requires Chrome - run with: cargo test -- --ignored"]
async fn ad_hoc_action_sequence_returns_one_result_per_action() {
    let service = service().await;
    let url = "data:text/html,<input id='q'><button id='go'>go</button>";

    let actions = vec![
        Action::on(ActionKind::Fill { value: "hello".into() }, "#q"),
        Action::on(ActionKind::Click, "#go"),
    ];
    let results = service
        .execute_actions(url, &actions, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), actions.len());
    for (result, action) in results.iter().zip(&actions) {
        assert_eq!(&result.action, action);
        assert!(result.success);
    }

    service.shutdown().await;
}
