//! Operator-invoked recovery of events stuck in `processing`.

use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;

use crate::common::ApiError;
use crate::domains::events::models::Event;
use crate::kernel::claim::recover_stuck;

#[derive(Debug, Serialize)]
pub struct RequeueStuckResponse {
    pub count: usize,
    pub events: Vec<Event>,
}

/// Requeue events whose lease expired more than `older_than_seconds` ago.
/// Falls back to the deployment default when the caller does not override.
pub async fn requeue_stuck(
    older_than_seconds: Option<i64>,
    default_older_than: Duration,
    pool: &PgPool,
) -> Result<RequeueStuckResponse, ApiError> {
    let older_than = match older_than_seconds {
        Some(secs) if secs <= 0 => {
            return Err(ApiError::validation(
                "older_than_seconds must be greater than zero",
            ))
        }
        Some(secs) => Duration::from_secs(secs as u64),
        None => default_older_than,
    };

    let events = recover_stuck(pool, older_than).await?;

    Ok(RequeueStuckResponse {
        count: events.len(),
        events,
    })
}
