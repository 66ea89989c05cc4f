//! Replay of terminal events.

use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use crate::common::ApiError;
use crate::domains::events::models::Event;

/// The two documented replay hazards, returned with every replay response.
pub const REPLAY_WARNING: &str = "Replay uses the current rule versions; \
non-idempotent actions already applied by the same rule version will be \
skipped as deduped.";

pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub event: Event,
    pub warning: &'static str,
}

#[derive(Debug, Serialize)]
pub struct BatchReplayResponse {
    pub requested: usize,
    pub replayed: usize,
    pub events: Vec<Event>,
    pub warning: &'static str,
}

/// Replay a single event. Fails with not-found if the id is unknown and
/// conflict if the event is not in a terminal state.
pub async fn replay_event(id: i64, pool: &PgPool) -> Result<ReplayResponse, ApiError> {
    match Event::replay_terminal(id, pool).await? {
        Some(event) => {
            info!(event_id = event.id, "event queued for replay");
            Ok(ReplayResponse {
                event,
                warning: REPLAY_WARNING,
            })
        }
        None => match Event::find_by_id(id, pool).await? {
            Some(event) => Err(ApiError::conflict(format!(
                "Event {} is in state '{}' and cannot be replayed",
                id,
                event.state.as_str()
            ))),
            None => Err(ApiError::not_found(format!("Event {id} not found"))),
        },
    }
}

/// Replay a batch of events. Ids not currently terminal are silently
/// excluded; there is no per-id error.
pub async fn replay_batch(ids: &[i64], pool: &PgPool) -> Result<BatchReplayResponse, ApiError> {
    if ids.is_empty() {
        return Err(ApiError::validation("event_ids must not be empty"));
    }
    if ids.len() > MAX_BATCH_SIZE {
        return Err(ApiError::validation(format!(
            "event_ids must contain at most {MAX_BATCH_SIZE} ids"
        )));
    }

    let events = Event::replay_batch(ids, pool).await?;

    info!(
        requested = ids.len(),
        replayed = events.len(),
        "batch replay queued"
    );

    Ok(BatchReplayResponse {
        requested: ids.len(),
        replayed: events.len(),
        events,
        warning: REPLAY_WARNING,
    })
}
