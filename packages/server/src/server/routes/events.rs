//! Event intake, reads, replay, and stuck-recovery endpoints.

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::common::{ApiError, PageParams};
use crate::domains::events::actions::{
    event_stats, get_event, get_event_attempts, ingest_event, list_events, replay_batch,
    replay_event, requeue_stuck, BatchReplayResponse, EventFilterParams, EventListResponse,
    ReplayResponse, RequeueStuckResponse,
};
use crate::domains::events::models::{AttemptWithExecutions, Event, EventStats};
use crate::server::app::AppState;

/// `POST /events` intake body. `id` is the caller-supplied external id.
#[derive(Debug, Deserialize)]
pub struct IngestBody {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub state: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl EventListQuery {
    fn page_params(&self) -> PageParams {
        PageParams {
            limit: self.limit,
            offset: self.offset,
        }
    }

    fn filter_params(&self) -> EventFilterParams {
        EventFilterParams {
            state: self.state.clone(),
            event_type: self.event_type.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplayBatchBody {
    pub event_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequeueStuckBody {
    pub older_than_seconds: Option<i64>,
}

/// Duplicates also return 201 with the existing row; the client infers
/// duplication from `received_count > 1`.
pub async fn ingest_event_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<IngestBody>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let event = ingest_event(&body.id, &body.event_type, &body.data, &state.db_pool).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn list_events_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<EventListResponse>, ApiError> {
    let page = query.page_params().validate()?;
    let response = list_events(&query.filter_params(), page, &state.db_pool).await?;
    Ok(Json(response))
}

pub async fn event_stats_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<EventStats>, ApiError> {
    let stats = event_stats(&query.filter_params(), &state.db_pool).await?;
    Ok(Json(stats))
}

pub async fn get_event_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    let event = get_event(id, &state.db_pool).await?;
    Ok(Json(event))
}

pub async fn event_attempts_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AttemptWithExecutions>>, ApiError> {
    let attempts = get_event_attempts(id, &state.db_pool).await?;
    Ok(Json(attempts))
}

pub async fn replay_event_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let response = replay_event(id, &state.db_pool).await?;
    state.hub.publish_event_id(response.event.id);
    Ok(Json(response))
}

pub async fn replay_batch_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<ReplayBatchBody>,
) -> Result<Json<BatchReplayResponse>, ApiError> {
    let response = replay_batch(&body.event_ids, &state.db_pool).await?;
    for event in &response.events {
        state.hub.publish_event_id(event.id);
    }
    Ok(Json(response))
}

pub async fn requeue_stuck_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<RequeueStuckBody>>,
) -> Result<Json<RequeueStuckResponse>, ApiError> {
    let older_than_seconds = body.and_then(|b| b.0.older_than_seconds);
    let response = requeue_stuck(
        older_than_seconds,
        state.config.requeue_stuck_after,
        &state.db_pool,
    )
    .await?;
    Ok(Json(response))
}
