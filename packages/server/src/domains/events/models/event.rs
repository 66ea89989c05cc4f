//! Event model and queries.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::common::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "event_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    #[default]
    Pending,
    Processing,
    Processed,
    Failed,
}

impl EventState {
    /// Terminal states are the only replayable ones.
    pub fn is_replayable(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    /// The allowed transitions of the event state machine.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Processed)
                | (Self::Processing, Self::Failed)
                | (Self::Processing, Self::Pending)
                | (Self::Processed, Self::Pending)
                | (Self::Failed, Self::Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub external_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub state: EventState,
    pub received_count: i32,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub replayed_at: Option<DateTime<Utc>>,
}

/// Column list shared by every query that returns full event rows.
pub(crate) const EVENT_COLUMNS: &str = "id, external_id, type, payload, state, received_count, \
     created_at, processing_started_at, processed_at, replayed_at";

/// Filters shared by the list and stats queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub state: Option<EventState>,
    pub event_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl EventFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        let mut prefix = " WHERE ";
        if let Some(state) = self.state {
            builder.push(prefix).push("state = ").push_bind(state);
            prefix = " AND ";
        }
        if let Some(event_type) = &self.event_type {
            builder
                .push(prefix)
                .push("type = ")
                .push_bind(event_type.clone());
            prefix = " AND ";
        }
        if let Some(start) = self.start_date {
            builder.push(prefix).push("created_at >= ").push_bind(start);
            prefix = " AND ";
        }
        if let Some(end) = self.end_date {
            builder.push(prefix).push("created_at <= ").push_bind(end);
        }
    }
}

/// Aggregate event counts for the stats endpoint.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub processed: i64,
    pub failed: i64,
    pub failed_last_24h: i64,
}

impl Event {
    /// Idempotent intake by external id: a duplicate only increments
    /// `received_count`; payload, type and state are never touched again.
    pub async fn ingest(
        external_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
        pool: &PgPool,
    ) -> Result<Self> {
        let event = sqlx::query_as::<_, Self>(&format!(
            r#"
            INSERT INTO events (external_id, type, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id) DO UPDATE
                SET received_count = events.received_count + 1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(external_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(pool)
        .await?;

        Ok(event)
    }

    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let event = sqlx::query_as::<_, Self>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(event)
    }

    pub async fn list(filter: &EventFilter, page: Page, pool: &PgPool) -> Result<Vec<Self>> {
        let mut builder = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events"));
        filter.push_where(&mut builder);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let events = builder
            .build_query_as::<Self>()
            .fetch_all(pool)
            .await?;

        Ok(events)
    }

    /// Aggregate counts; `failed_last_24h` is computed over
    /// `COALESCE(processed_at, created_at)` so failures that never completed
    /// still surface.
    pub async fn stats(filter: &EventFilter, pool: &PgPool) -> Result<EventStats> {
        let mut builder = QueryBuilder::new(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE state = 'pending') AS pending,
                   COUNT(*) FILTER (WHERE state = 'processing') AS processing,
                   COUNT(*) FILTER (WHERE state = 'processed') AS processed,
                   COUNT(*) FILTER (WHERE state = 'failed') AS failed,
                   COUNT(*) FILTER (
                       WHERE state = 'failed'
                         AND COALESCE(processed_at, created_at) > NOW() - INTERVAL '24 hours'
                   ) AS failed_last_24h
            FROM events
            "#,
        );
        filter.push_where(&mut builder);

        let stats = builder
            .build_query_as::<EventStats>()
            .fetch_one(pool)
            .await?;

        Ok(stats)
    }

    /// Return a terminal event to `pending` for reprocessing.
    ///
    /// `Ok(None)` means the event exists but is not in a replayable state;
    /// callers distinguish that from absence for the 404/409 split.
    pub async fn replay_terminal(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let event = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE events
            SET state = 'pending',
                replayed_at = NOW(),
                processing_started_at = NULL
            WHERE id = $1 AND state IN ('processed', 'failed')
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(event)
    }

    /// Batch variant: ids not currently terminal are silently excluded.
    pub async fn replay_batch(ids: &[i64], pool: &PgPool) -> Result<Vec<Self>> {
        let events = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE events
            SET state = 'pending',
                replayed_at = NOW(),
                processing_started_at = NULL
            WHERE id = ANY($1) AND state IN ('processed', 'failed')
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(ids)
        .fetch_all(pool)
        .await?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayable_states_are_terminal_only() {
        assert!(EventState::Processed.is_replayable());
        assert!(EventState::Failed.is_replayable());
        assert!(!EventState::Pending.is_replayable());
        assert!(!EventState::Processing.is_replayable());
    }

    #[test]
    fn allowed_transitions_match_state_machine() {
        use EventState::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Pending));
        assert!(Processed.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
    }

    #[test]
    fn forbidden_transitions_are_rejected() {
        use EventState::*;
        assert!(!Pending.can_transition_to(Processed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Processed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processed));
        assert!(!Processed.can_transition_to(Failed));
    }

    #[test]
    fn state_parses_from_query_strings() {
        assert_eq!(EventState::parse("pending"), Some(EventState::Pending));
        assert_eq!(EventState::parse("processed"), Some(EventState::Processed));
        assert_eq!(EventState::parse("bogus"), None);
    }

    #[test]
    fn event_serializes_type_field_name() {
        let event = Event {
            id: 1,
            external_id: "evt-1".into(),
            event_type: "order.created".into(),
            payload: serde_json::json!({"status": "paid"}),
            state: EventState::Pending,
            received_count: 1,
            created_at: Utc::now(),
            processing_started_at: None,
            processed_at: None,
            replayed_at: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order.created");
        assert_eq!(json["state"], "pending");
    }
}
