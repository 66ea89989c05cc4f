//! End-to-end pipeline tests: ingest -> claim -> evaluate -> finalize.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::*;
use server_core::domains::events::models::{AttemptStatus, EventState};
use server_core::domains::rules::models::ExecutionResult;

#[tokio::test]
async fn successful_pass_applies_matching_rule() {
    let db = setup_db().await;

    make_log_rule(&db.pool, "log paid orders", "order.created").await;
    let event = ingest(
        &db.pool,
        "evt-success",
        "order.created",
        json!({"status": "paid"}),
    )
    .await;
    assert_eq!(event.state, EventState::Pending);

    let (claimed, attempt_id) = tick(&db.pool).await.expect("one event should be claimable");
    assert_eq!(claimed.id, event.id);

    let event = event_by_id(&db.pool, event.id).await;
    assert_eq!(event.state, EventState::Processed);
    assert!(event.processed_at.is_some());
    assert!(event.processing_started_at.is_none());

    let attempt = attempt_by_id(&db.pool, attempt_id).await;
    assert_eq!(attempt.status, Some(AttemptStatus::Success));
    assert!(attempt.error.is_none());

    let executions = executions_for_attempt(&db.pool, attempt_id).await;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].result, ExecutionResult::Applied);
    assert!(executions[0].error.is_none());
}

#[tokio::test]
async fn non_matching_condition_is_skipped() {
    let db = setup_db().await;

    make_log_rule(&db.pool, "log paid orders", "order.created").await;
    ingest(
        &db.pool,
        "evt-unpaid",
        "order.created",
        json!({"status": "draft"}),
    )
    .await;

    let (event, attempt_id) = tick(&db.pool).await.unwrap();

    let executions = executions_for_attempt(&db.pool, attempt_id).await;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].result, ExecutionResult::Skipped);

    // A skipped rule is not a failure.
    let event = event_by_id(&db.pool, event.id).await;
    assert_eq!(event.state, EventState::Processed);
}

#[tokio::test]
async fn failed_webhook_fails_the_attempt() {
    let db = setup_db().await;

    let base = spawn_status_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    make_webhook_rule(
        &db.pool,
        "notify fulfillment",
        "order.created",
        &format!("{base}/hook"),
    )
    .await;
    ingest(
        &db.pool,
        "evt-webhook-500",
        "order.created",
        json!({"status": "paid"}),
    )
    .await;

    let (event, attempt_id) = tick(&db.pool).await.unwrap();

    let event = event_by_id(&db.pool, event.id).await;
    assert_eq!(event.state, EventState::Failed);

    let attempt = attempt_by_id(&db.pool, attempt_id).await;
    assert_eq!(attempt.status, Some(AttemptStatus::Failed));
    let error = attempt.error.expect("failed attempt carries an error");
    assert!(error.contains("Webhook failed with status 500"), "error was: {error}");

    let executions = executions_for_attempt(&db.pool, attempt_id).await;
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].result, ExecutionResult::Failed);
}

#[tokio::test]
async fn rule_failures_do_not_stop_sibling_rules() {
    let db = setup_db().await;

    let base = spawn_status_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    // Three rules on the same type: log, failing webhook, log.
    make_log_rule(&db.pool, "first log", "order.created").await;
    make_webhook_rule(
        &db.pool,
        "broken webhook",
        "order.created",
        &format!("{base}/hook"),
    )
    .await;
    make_log_rule(&db.pool, "second log", "order.created").await;

    ingest(
        &db.pool,
        "evt-isolation",
        "order.created",
        json!({"status": "paid"}),
    )
    .await;

    let (event, attempt_id) = tick(&db.pool).await.unwrap();

    let executions = executions_for_attempt(&db.pool, attempt_id).await;
    let results: Vec<_> = executions.iter().map(|x| x.result).collect();
    assert_eq!(
        results,
        vec![
            ExecutionResult::Applied,
            ExecutionResult::Failed,
            ExecutionResult::Applied
        ]
    );

    let attempt = attempt_by_id(&db.pool, attempt_id).await;
    assert_eq!(attempt.status, Some(AttemptStatus::Failed));

    let event = event_by_id(&db.pool, event.id).await;
    assert_eq!(event.state, EventState::Failed);
}

#[tokio::test]
async fn eval_error_is_recorded_and_isolated() {
    let db = setup_db().await;

    // Arithmetic on a string payload field raises at evaluation time.
    make_rule(
        &db.pool,
        "bad arithmetic",
        "order.created",
        json!({">": [{"+": [{"var": "status"}, 1]}, 5]}),
        json!({"type": "noop"}),
    )
    .await;
    make_log_rule(&db.pool, "healthy rule", "order.created").await;

    ingest(
        &db.pool,
        "evt-eval-error",
        "order.created",
        json!({"status": "paid"}),
    )
    .await;

    let (_, attempt_id) = tick(&db.pool).await.unwrap();

    let executions = executions_for_attempt(&db.pool, attempt_id).await;
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].result, ExecutionResult::Failed);
    assert!(executions[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("non-numeric"));
    assert_eq!(executions[1].result, ExecutionResult::Applied);
}

#[tokio::test]
async fn attempt_duration_is_consistent() {
    let db = setup_db().await;

    make_log_rule(&db.pool, "log", "order.created").await;
    ingest(&db.pool, "evt-duration", "order.created", json!({"status": "paid"})).await;

    let (_, attempt_id) = tick(&db.pool).await.unwrap();

    let attempt = attempt_by_id(&db.pool, attempt_id).await;
    let finished = attempt.finished_at.expect("finalized attempt has finished_at");
    assert!(finished >= attempt.started_at);

    let duration = attempt.duration_ms.expect("finalized attempt has duration_ms");
    let wall = (finished - attempt.started_at).num_milliseconds();
    assert!(duration >= 0);
    assert!((duration - wall).abs() <= 1000, "duration {duration} vs wall {wall}");
}

#[tokio::test]
async fn rules_for_other_event_types_are_not_considered() {
    let db = setup_db().await;

    make_log_rule(&db.pool, "order rule", "order.created").await;
    make_log_rule(&db.pool, "user rule", "user.created").await;

    ingest(&db.pool, "evt-scoped", "order.created", json!({"status": "paid"})).await;

    let (_, attempt_id) = tick(&db.pool).await.unwrap();

    let executions = executions_for_attempt(&db.pool, attempt_id).await;
    assert_eq!(executions.len(), 1);
}

#[tokio::test]
async fn inactive_rules_are_excluded() {
    let db = setup_db().await;

    let created = make_log_rule(&db.pool, "soon inactive", "order.created").await;
    server_core::domains::rules::actions::deactivate_rule(created.rule.id, &db.pool)
        .await
        .unwrap();

    ingest(&db.pool, "evt-inactive", "order.created", json!({"status": "paid"})).await;

    let (event, attempt_id) = tick(&db.pool).await.unwrap();

    let executions = executions_for_attempt(&db.pool, attempt_id).await;
    assert!(executions.is_empty());

    // No rules considered still finalizes the event cleanly.
    let event = event_by_id(&db.pool, event.id).await;
    assert_eq!(event.state, EventState::Processed);
}
