//! Event attempt model and the joined attempt history view.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::domains::rules::models::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
}

/// One pass of the engine over one claim of one event.
/// `status = None` means the attempt is still in flight.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventAttempt {
    pub id: i64,
    pub event_id: i64,
    pub status: Option<AttemptStatus>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// A rule execution row enriched with the rule's display name and version
/// number. The joins are LEFT because history survives rule deletion.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExecutionView {
    pub id: i64,
    #[serde(skip_serializing)]
    pub attempt_id: i64,
    pub rule_id: i64,
    pub rule_version_id: i64,
    pub rule_name: Option<String>,
    pub rule_version: Option<i32>,
    pub result: ExecutionResult,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// An attempt with its rule executions, as served by the attempts endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptWithExecutions {
    #[serde(flatten)]
    pub attempt: EventAttempt,
    pub rule_executions: Vec<ExecutionView>,
}

impl EventAttempt {
    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let attempt = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, event_id, status, error, started_at, finished_at, duration_ms
            FROM event_attempts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(attempt)
    }

    /// Full attempt history for an event, oldest first, each attempt joined
    /// with its rule executions for display.
    pub async fn history_for_event(
        event_id: i64,
        pool: &PgPool,
    ) -> Result<Vec<AttemptWithExecutions>> {
        let attempts = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, event_id, status, error, started_at, finished_at, duration_ms
            FROM event_attempts
            WHERE event_id = $1
            ORDER BY started_at ASC, id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await?;

        if attempts.is_empty() {
            return Ok(Vec::new());
        }

        let attempt_ids: Vec<i64> = attempts.iter().map(|a| a.id).collect();
        let executions = sqlx::query_as::<_, ExecutionView>(
            r#"
            SELECT x.id, x.attempt_id, x.rule_id, x.rule_version_id,
                   r.name AS rule_name, v.version AS rule_version,
                   x.result, x.error, x.executed_at
            FROM rule_executions x
            LEFT JOIN rules r ON r.id = x.rule_id
            LEFT JOIN rule_versions v ON v.id = x.rule_version_id
            WHERE x.attempt_id = ANY($1)
            ORDER BY x.id ASC
            "#,
        )
        .bind(&attempt_ids)
        .fetch_all(pool)
        .await?;

        let mut by_attempt: HashMap<i64, Vec<ExecutionView>> = HashMap::new();
        for execution in executions {
            by_attempt
                .entry(execution.attempt_id)
                .or_default()
                .push(execution);
        }

        Ok(attempts
            .into_iter()
            .map(|attempt| {
                let rule_executions = by_attempt.remove(&attempt.id).unwrap_or_default();
                AttemptWithExecutions {
                    attempt,
                    rule_executions,
                }
            })
            .collect())
    }
}
