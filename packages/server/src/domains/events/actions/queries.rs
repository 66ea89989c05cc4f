//! Read-side queries for events: get, list, attempt history, stats.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::common::{ApiError, Page};
use crate::domains::events::models::{
    AttemptWithExecutions, Event, EventAttempt, EventFilter, EventState, EventStats,
};

/// Raw filter strings as they arrive on the query string.
#[derive(Debug, Clone, Default)]
pub struct EventFilterParams {
    pub state: Option<String>,
    pub event_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<Event>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilterParams {
    pub fn validate(&self) -> Result<EventFilter, ApiError> {
        let state = match &self.state {
            Some(raw) => Some(
                EventState::parse(raw)
                    .ok_or_else(|| ApiError::validation(format!("Unknown event state: {raw}")))?,
            ),
            None => None,
        };

        Ok(EventFilter {
            state,
            event_type: self.event_type.clone(),
            start_date: parse_date_bound(self.start_date.as_deref(), false)?,
            end_date: parse_date_bound(self.end_date.as_deref(), true)?,
        })
    }
}

/// Accept RFC 3339 timestamps or bare dates; a bare end date is inclusive
/// (end of day).
fn parse_date_bound(raw: Option<&str>, end_of_day: bool) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = raw else { return Ok(None) };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    if let Ok(date) = raw.parse::<NaiveDate>() {
        let time = if end_of_day {
            date.and_hms_opt(23, 59, 59).expect("valid wall-clock time")
        } else {
            date.and_hms_opt(0, 0, 0).expect("valid wall-clock time")
        };
        return Ok(Some(DateTime::from_naive_utc_and_offset(time, Utc)));
    }

    Err(ApiError::validation(format!("Invalid date: {raw}")))
}

pub async fn get_event(id: i64, pool: &PgPool) -> Result<Event, ApiError> {
    Event::find_by_id(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Event {id} not found")))
}

pub async fn list_events(
    params: &EventFilterParams,
    page: Page,
    pool: &PgPool,
) -> Result<EventListResponse, ApiError> {
    let filter = params.validate()?;
    let events = Event::list(&filter, page, pool).await?;
    Ok(EventListResponse {
        events,
        limit: page.limit,
        offset: page.offset,
    })
}

pub async fn event_stats(params: &EventFilterParams, pool: &PgPool) -> Result<EventStats, ApiError> {
    let filter = params.validate()?;
    Ok(Event::stats(&filter, pool).await?)
}

/// Attempt history for one event, with rule executions joined for display.
pub async fn get_event_attempts(
    id: i64,
    pool: &PgPool,
) -> Result<Vec<AttemptWithExecutions>, ApiError> {
    // 404 on an unknown event rather than an empty history.
    if Event::find_by_id(id, pool).await?.is_none() {
        return Err(ApiError::not_found(format!("Event {id} not found")));
    }

    Ok(EventAttempt::history_for_event(id, pool).await?)
}
