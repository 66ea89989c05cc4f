//! Per-attempt rule execution records and the replay dedup predicate.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_result", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Applied,
    Skipped,
    Failed,
    Deduped,
}

/// One record per rule considered per attempt. Immutable after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RuleExecution {
    pub id: i64,
    pub attempt_id: i64,
    pub rule_id: i64,
    pub rule_version_id: i64,
    pub result: ExecutionResult,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl RuleExecution {
    pub async fn record(
        attempt_id: i64,
        rule_id: i64,
        rule_version_id: i64,
        result: ExecutionResult,
        error: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO rule_executions (attempt_id, rule_id, rule_version_id, result, error)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, attempt_id, rule_id, rule_version_id, result, error, executed_at
            "#,
        )
        .bind(attempt_id)
        .bind(rule_id)
        .bind(rule_version_id)
        .bind(result)
        .bind(error)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// The replay dedup predicate: has this rule version already executed an
    /// action to completion for this event? Editing a rule creates a new
    /// version id and therefore disables dedup on purpose.
    pub async fn version_already_applied(
        event_id: i64,
        rule_version_id: i64,
        pool: &PgPool,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM rule_executions x
                JOIN event_attempts a ON a.id = x.attempt_id
                WHERE a.event_id = $1
                  AND x.rule_version_id = $2
                  AND x.result IN ('applied', 'deduped')
            )
            "#,
        )
        .bind(event_id)
        .bind(rule_version_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }
}
