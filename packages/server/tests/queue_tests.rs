//! Claim/lease coordination: idempotent ingest, concurrent claiming,
//! stuck recovery, and the timeout abort path.

mod common;

use serde_json::json;

use common::*;
use server_core::domains::events::actions::{ingest_event, requeue_stuck};
use server_core::domains::events::models::{AttemptStatus, EventState};
use server_core::kernel::claim_next;

#[tokio::test]
async fn duplicate_ingest_increments_received_count_only() {
    let db = setup_db().await;

    let first = ingest(&db.pool, "dup-1", "order.created", json!({"foo": 1})).await;
    assert_eq!(first.received_count, 1);

    let second = ingest(&db.pool, "dup-1", "order.created", json!({"foo": 999})).await;
    assert_eq!(second.id, first.id);
    assert_eq!(second.received_count, 2);
    // The payload from the first call wins.
    assert_eq!(second.payload["foo"], json!(1));
    assert_eq!(second.state, EventState::Pending);
}

#[tokio::test]
async fn ingest_validates_input_shape() {
    let db = setup_db().await;

    assert!(ingest_event("", "order.created", &json!({}), &db.pool)
        .await
        .is_err());
    assert!(ingest_event("evt-1", "", &json!({}), &db.pool).await.is_err());
    assert!(
        ingest_event("evt-1", "order.created", &json!([1, 2]), &db.pool)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn claim_creates_attempt_and_marks_processing() {
    let db = setup_db().await;

    let event = ingest(&db.pool, "evt-claim", "order.created", json!({})).await;

    let claimed = claim_next(&db.pool).await.unwrap().expect("event is claimable");
    assert_eq!(claimed.event.id, event.id);
    assert_eq!(claimed.event.state, EventState::Processing);
    assert!(claimed.event.processing_started_at.is_some());

    let attempt = attempt_by_id(&db.pool, claimed.attempt_id).await;
    assert_eq!(attempt.event_id, event.id);
    assert_eq!(attempt.status, None);
    assert!(attempt.finished_at.is_none());
}

#[tokio::test]
async fn claims_follow_created_at_order() {
    let db = setup_db().await;

    let first = ingest(&db.pool, "evt-order-1", "order.created", json!({})).await;
    let second = ingest(&db.pool, "evt-order-2", "order.created", json!({})).await;
    // Make the ordering unambiguous regardless of clock resolution.
    sqlx::query("UPDATE events SET created_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
        .bind(first.id)
        .execute(&db.pool)
        .await
        .unwrap();

    let a = claim_next(&db.pool).await.unwrap().unwrap();
    let b = claim_next(&db.pool).await.unwrap().unwrap();
    assert_eq!(a.event.id, first.id);
    assert_eq!(b.event.id, second.id);
}

#[tokio::test]
async fn concurrent_claims_cannot_share_an_event() {
    let db = setup_db().await;

    ingest(&db.pool, "evt-contended", "order.created", json!({})).await;

    let (a, b) = tokio::join!(claim_next(&db.pool), claim_next(&db.pool));
    let a = a.unwrap();
    let b = b.unwrap();

    // Exactly one claimant wins; the other sees no work.
    assert!(a.is_some() != b.is_some(), "exactly one claim should succeed");
}

#[tokio::test]
async fn processing_events_are_not_reclaimed() {
    let db = setup_db().await;

    ingest(&db.pool, "evt-held", "order.created", json!({})).await;

    let first = claim_next(&db.pool).await.unwrap();
    assert!(first.is_some());

    let second = claim_next(&db.pool).await.unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn stuck_events_are_requeued_and_orphan_attempts_finalized() {
    let db = setup_db().await;

    let event = ingest(&db.pool, "evt-stuck", "order.created", json!({})).await;
    let claimed = claim_next(&db.pool).await.unwrap().unwrap();

    // Simulate a lease abandoned ten minutes ago.
    sqlx::query(
        "UPDATE events SET processing_started_at = NOW() - INTERVAL '600 seconds' WHERE id = $1",
    )
    .bind(event.id)
    .execute(&db.pool)
    .await
    .unwrap();

    let response = requeue_stuck(Some(300), std::time::Duration::from_secs(300), &db.pool)
        .await
        .unwrap();
    assert_eq!(response.count, 1);
    assert_eq!(response.events[0].id, event.id);

    let event = event_by_id(&db.pool, event.id).await;
    assert_eq!(event.state, EventState::Pending);
    assert!(event.processing_started_at.is_none());

    let attempt = attempt_by_id(&db.pool, claimed.attempt_id).await;
    assert_eq!(attempt.status, Some(AttemptStatus::Failed));
    assert_eq!(attempt.error.as_deref(), Some("exceeded timeout"));
    assert!(attempt.finished_at.is_some());
}

#[tokio::test]
async fn fresh_leases_are_not_requeued() {
    let db = setup_db().await;

    ingest(&db.pool, "evt-fresh", "order.created", json!({})).await;
    claim_next(&db.pool).await.unwrap().unwrap();

    let response = requeue_stuck(Some(300), std::time::Duration::from_secs(300), &db.pool)
        .await
        .unwrap();
    assert_eq!(response.count, 0);
}

#[tokio::test]
async fn requeue_rejects_non_positive_threshold() {
    let db = setup_db().await;

    assert!(
        requeue_stuck(Some(0), std::time::Duration::from_secs(300), &db.pool)
            .await
            .is_err()
    );
    assert!(
        requeue_stuck(Some(-5), std::time::Duration::from_secs(300), &db.pool)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn timed_out_pass_returns_event_to_pending() {
    let db = setup_db().await;

    let event = ingest(&db.pool, "evt-timeout", "order.created", json!({})).await;
    let claimed = claim_next(&db.pool).await.unwrap().unwrap();

    let processor = test_processor(&db.pool);
    processor
        .abort_timed_out(&claimed.event, claimed.attempt_id)
        .await
        .unwrap();

    let event = event_by_id(&db.pool, event.id).await;
    assert_eq!(event.state, EventState::Pending);
    assert!(event.processing_started_at.is_none());

    let attempt = attempt_by_id(&db.pool, claimed.attempt_id).await;
    assert_eq!(attempt.status, Some(AttemptStatus::Failed));
    assert!(attempt
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("exceeded timeout"));
}

#[tokio::test]
async fn cascading_delete_removes_attempts_and_executions() {
    let db = setup_db().await;

    make_log_rule(&db.pool, "log", "order.created").await;
    let event = ingest(&db.pool, "evt-cascade", "order.created", json!({"status": "paid"})).await;
    let (_, attempt_id) = tick(&db.pool).await.unwrap();
    assert_eq!(executions_for_attempt(&db.pool, attempt_id).await.len(), 1);

    sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(event.id)
        .execute(&db.pool)
        .await
        .unwrap();

    let attempts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM event_attempts WHERE event_id = $1")
            .bind(event.id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(attempts, 0);

    let executions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM rule_executions WHERE attempt_id = $1")
            .bind(attempt_id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(executions, 0);
}
