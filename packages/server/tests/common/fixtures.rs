//! Shared fixtures: rules, events, and a single worker tick.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::any;
use axum::Router;
use serde_json::{json, Value};
use sqlx::PgPool;

use server_core::domains::events::actions::ingest_event;
use server_core::domains::events::models::{Event, EventAttempt};
use server_core::domains::rules::actions::{create_rule, CreateRuleInput, RuleWithVersion};
use server_core::domains::rules::models::RuleExecution;
use server_core::kernel::{claim_next, ActionDispatcher, EmailMode, EventProcessor, StreamHub};

pub fn test_processor(pool: &PgPool) -> EventProcessor {
    let dispatcher = Arc::new(ActionDispatcher::new(Duration::from_secs(2), EmailMode::Log));
    EventProcessor::new(pool.clone(), dispatcher, StreamHub::new())
}

/// One worker tick: claim the next pending event and run the engine over it.
/// Returns the claimed event and attempt id, or `None` when idle.
pub async fn tick(pool: &PgPool) -> Option<(Event, i64)> {
    let claimed = claim_next(pool).await.expect("claim should not fail")?;
    let processor = test_processor(pool);
    processor
        .process(&claimed.event, claimed.attempt_id)
        .await
        .expect("engine pass should not fault");
    Some((claimed.event, claimed.attempt_id))
}

pub async fn make_rule(
    pool: &PgPool,
    name: &str,
    event_type: &str,
    condition: Value,
    action: Value,
) -> RuleWithVersion {
    create_rule(
        CreateRuleInput {
            name: name.to_string(),
            event_type: event_type.to_string(),
            condition,
            action,
            active: true,
        },
        pool,
    )
    .await
    .expect("rule creation should succeed")
}

/// A rule matching `status == "paid"` with a log action.
pub async fn make_log_rule(pool: &PgPool, name: &str, event_type: &str) -> RuleWithVersion {
    make_rule(
        pool,
        name,
        event_type,
        json!({"==": [{"var": "status"}, "paid"]}),
        json!({"type": "log", "params": {"level": "info", "message": "ok"}}),
    )
    .await
}

pub async fn make_email_rule(pool: &PgPool, name: &str, event_type: &str) -> RuleWithVersion {
    make_rule(
        pool,
        name,
        event_type,
        json!({"==": [{"var": "status"}, "paid"]}),
        json!({
            "type": "send_email",
            "params": {"to": "ops@example.com", "subject": "paid", "template": "receipt"}
        }),
    )
    .await
}

pub async fn make_webhook_rule(
    pool: &PgPool,
    name: &str,
    event_type: &str,
    url: &str,
) -> RuleWithVersion {
    make_rule(
        pool,
        name,
        event_type,
        json!({"==": [{"var": "status"}, "paid"]}),
        json!({"type": "call_webhook", "params": {"url": url, "method": "POST"}}),
    )
    .await
}

pub async fn ingest(pool: &PgPool, external_id: &str, event_type: &str, data: Value) -> Event {
    ingest_event(external_id, event_type, &data, pool)
        .await
        .expect("ingest should succeed")
}

pub async fn attempt_by_id(pool: &PgPool, id: i64) -> EventAttempt {
    EventAttempt::find_by_id(id, pool)
        .await
        .expect("attempt query should succeed")
        .expect("attempt should exist")
}

pub async fn event_by_id(pool: &PgPool, id: i64) -> Event {
    Event::find_by_id(id, pool)
        .await
        .expect("event query should succeed")
        .expect("event should exist")
}

pub async fn executions_for_attempt(pool: &PgPool, attempt_id: i64) -> Vec<RuleExecution> {
    sqlx::query_as::<_, RuleExecution>(
        r#"
        SELECT id, attempt_id, rule_id, rule_version_id, result, error, executed_at
        FROM rule_executions
        WHERE attempt_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(attempt_id)
    .fetch_all(pool)
    .await
    .expect("execution query should succeed")
}

/// Spin up a throwaway HTTP server that answers every request with the given
/// status. Returns its base URL.
pub async fn spawn_status_server(status: StatusCode) -> String {
    let app = Router::new().route("/*path", any(move || async move { status }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port should bind");
    let addr: SocketAddr = listener.local_addr().expect("listener has an address");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{addr}")
}
