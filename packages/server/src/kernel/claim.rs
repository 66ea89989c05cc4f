//! Claim/lease coordination over the events table.
//!
//! `FOR UPDATE SKIP LOCKED` on the oldest pending row is the single
//! concurrency primitive: concurrent workers never block on each other and
//! never observe the same event in `processing`.

use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::domains::events::models::{event::EVENT_COLUMNS, Event};

/// An event reserved for processing together with its in-flight attempt.
#[derive(Debug)]
pub struct ClaimedEvent {
    pub event: Event,
    pub attempt_id: i64,
}

/// Atomically reserve the next pending event.
///
/// In one transaction: lock the oldest pending row (skipping rows locked by
/// other sessions), flip it to `processing`, and open a new attempt.
/// Returns `None` when there is no work.
pub async fn claim_next(pool: &PgPool) -> Result<Option<ClaimedEvent>> {
    let mut tx = pool.begin().await?;

    let id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM events
        WHERE state = 'pending'
        ORDER BY created_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some(id) = id else {
        tx.commit().await?;
        return Ok(None);
    };

    let event = sqlx::query_as::<_, Event>(&format!(
        r#"
        UPDATE events
        SET state = 'processing', processing_started_at = NOW()
        WHERE id = $1
        RETURNING {EVENT_COLUMNS}
        "#
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    let attempt_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO event_attempts (event_id, status, started_at)
        VALUES ($1, NULL, NOW())
        RETURNING id
        "#,
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some(ClaimedEvent { event, attempt_id }))
}

/// Return events whose processing lease expired to `pending`.
///
/// Backstop for missed timeouts (worker crash, host reset). The orphaned
/// in-flight attempts are finalized as failed so they do not read as
/// forever-running in the audit history.
pub async fn recover_stuck(pool: &PgPool, older_than: Duration) -> Result<Vec<Event>> {
    let mut tx = pool.begin().await?;

    let events = sqlx::query_as::<_, Event>(&format!(
        r#"
        UPDATE events
        SET state = 'pending', processing_started_at = NULL
        WHERE state = 'processing'
          AND processing_started_at < NOW() - ($1 || ' seconds')::INTERVAL
        RETURNING {EVENT_COLUMNS}
        "#
    ))
    .bind(older_than.as_secs().to_string())
    .fetch_all(&mut *tx)
    .await?;

    if !events.is_empty() {
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        sqlx::query(
            r#"
            UPDATE event_attempts
            SET status = 'failed',
                error = 'exceeded timeout',
                finished_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE event_id = ANY($1) AND status IS NULL
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        info!(count = events.len(), "recovered stuck events");
    }

    tx.commit().await?;

    Ok(events)
}
