//! Rule header model.
//!
//! The header is mutable; the condition/action pair lives on immutable
//! versions, with `current_version_id` pointing at the latest one.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::common::Page;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub event_type: String,
    pub active: bool,
    pub current_version_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const RULE_COLUMNS: &str =
    "id, name, event_type, active, current_version_id, created_at, updated_at";

/// An active rule joined with its current version, as loaded by the engine.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveRule {
    pub rule_id: i64,
    pub name: String,
    pub version_id: i64,
    pub condition: serde_json::Value,
    pub action: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub active: Option<bool>,
    pub event_type: Option<String>,
}

impl Rule {
    /// Insert the header only; version 1 is inserted by the caller inside
    /// the same transaction before the pointer is set.
    pub async fn insert_header(
        name: &str,
        event_type: &str,
        active: bool,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Self> {
        let rule = sqlx::query_as::<_, Self>(&format!(
            r#"
            INSERT INTO rules (name, event_type, active)
            VALUES ($1, $2, $3)
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(event_type)
        .bind(active)
        .fetch_one(&mut **tx)
        .await?;

        Ok(rule)
    }

    pub async fn set_current_version(
        rule_id: i64,
        version_id: i64,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Self> {
        let rule = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE rules
            SET current_version_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(rule_id)
        .bind(version_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(rule)
    }

    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let rule = sqlx::query_as::<_, Self>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(rule)
    }

    /// Lock the header row for the duration of an update transaction so
    /// concurrent edits cannot both read the same current version.
    pub async fn find_for_update(
        id: i64,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Option<Self>> {
        let rule = sqlx::query_as::<_, Self>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(rule)
    }

    pub async fn update_header(
        id: i64,
        name: &str,
        event_type: &str,
        active: bool,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Self> {
        let rule = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE rules
            SET name = $2, event_type = $3, active = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(event_type)
        .bind(active)
        .fetch_one(&mut **tx)
        .await?;

        Ok(rule)
    }

    /// Soft delete: excluded from evaluation, history kept.
    pub async fn deactivate(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let rule = sqlx::query_as::<_, Self>(&format!(
            r#"
            UPDATE rules
            SET active = FALSE, updated_at = NOW()
            WHERE id = $1
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(rule)
    }

    pub async fn list(filter: &RuleFilter, page: Page, pool: &PgPool) -> Result<Vec<Self>> {
        let mut builder = QueryBuilder::new(format!("SELECT {RULE_COLUMNS} FROM rules"));

        let mut prefix = " WHERE ";
        if let Some(active) = filter.active {
            builder.push(prefix).push("active = ").push_bind(active);
            prefix = " AND ";
        }
        if let Some(event_type) = &filter.event_type {
            builder
                .push(prefix)
                .push("event_type = ")
                .push_bind(event_type.clone());
        }

        builder
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let rules = builder.build_query_as::<Self>().fetch_all(pool).await?;

        Ok(rules)
    }

    /// Active rules for an event type, joined with their current versions,
    /// in deterministic rule-id order.
    pub async fn load_active_for_type(event_type: &str, pool: &PgPool) -> Result<Vec<ActiveRule>> {
        let rules = sqlx::query_as::<_, ActiveRule>(
            r#"
            SELECT r.id AS rule_id, r.name, v.id AS version_id, v.condition, v.action
            FROM rules r
            JOIN rule_versions v ON v.id = r.current_version_id
            WHERE r.active AND r.event_type = $1
            ORDER BY r.id ASC
            "#,
        )
        .bind(event_type)
        .fetch_all(pool)
        .await?;

        Ok(rules)
    }
}
