//! Immutable rule versions.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RuleVersion {
    pub id: i64,
    pub rule_id: i64,
    pub condition: serde_json::Value,
    pub action: serde_json::Value,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

const VERSION_COLUMNS: &str = "id, rule_id, condition, action, version, created_at";

impl RuleVersion {
    pub async fn insert(
        rule_id: i64,
        condition: &serde_json::Value,
        action: &serde_json::Value,
        version: i32,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(&format!(
            r#"
            INSERT INTO rule_versions (rule_id, condition, action, version)
            VALUES ($1, $2, $3, $4)
            RETURNING {VERSION_COLUMNS}
            "#
        ))
        .bind(rule_id)
        .bind(condition)
        .bind(action)
        .bind(version)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(&format!(
            "SELECT {VERSION_COLUMNS} FROM rule_versions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id_tx(
        id: i64,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(&format!(
            "SELECT {VERSION_COLUMNS} FROM rule_versions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }

    /// All versions of a rule, newest first.
    pub async fn list_for_rule(rule_id: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(&format!(
            "SELECT {VERSION_COLUMNS} FROM rule_versions WHERE rule_id = $1 ORDER BY version DESC"
        ))
        .bind(rule_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}
