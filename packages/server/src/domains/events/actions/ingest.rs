//! Idempotent event intake.

use serde_json::Value;
use sqlx::PgPool;
use tracing::info;

use crate::common::ApiError;
use crate::domains::events::models::Event;

/// Ingest one event by external id.
///
/// A new id inserts a pending row; a duplicate only increments
/// `received_count` — payload, type and state are left untouched, so the
/// caller can detect duplication from `received_count > 1`.
pub async fn ingest_event(
    external_id: &str,
    event_type: &str,
    payload: &Value,
    pool: &PgPool,
) -> Result<Event, ApiError> {
    if external_id.trim().is_empty() {
        return Err(ApiError::validation("id must not be empty"));
    }
    if event_type.trim().is_empty() {
        return Err(ApiError::validation("type must not be empty"));
    }
    if !payload.is_object() {
        return Err(ApiError::validation("data must be a JSON object"));
    }

    let event = Event::ingest(external_id, event_type, payload, pool).await?;

    info!(
        event_id = event.id,
        external_id = %event.external_id,
        received_count = event.received_count,
        "event ingested"
    );

    Ok(event)
}
