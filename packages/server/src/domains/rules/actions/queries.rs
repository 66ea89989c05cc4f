//! Read-side queries and soft deletion for rules.

use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use crate::common::{ApiError, Page};
use crate::domains::rules::models::{Rule, RuleFilter, RuleVersion};

#[derive(Debug, Serialize)]
pub struct RuleListResponse {
    pub rules: Vec<Rule>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn get_rule(id: i64, pool: &PgPool) -> Result<Rule, ApiError> {
    Rule::find_by_id(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Rule {id} not found")))
}

pub async fn list_rules(
    filter: &RuleFilter,
    page: Page,
    pool: &PgPool,
) -> Result<RuleListResponse, ApiError> {
    let rules = Rule::list(filter, page, pool).await?;
    Ok(RuleListResponse {
        rules,
        limit: page.limit,
        offset: page.offset,
    })
}

/// Soft delete: the rule stops matching but its history remains readable.
pub async fn deactivate_rule(id: i64, pool: &PgPool) -> Result<Rule, ApiError> {
    let rule = Rule::deactivate(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Rule {id} not found")))?;

    info!(rule_id = rule.id, "rule deactivated");

    Ok(rule)
}

pub async fn list_rule_versions(id: i64, pool: &PgPool) -> Result<Vec<RuleVersion>, ApiError> {
    if Rule::find_by_id(id, pool).await?.is_none() {
        return Err(ApiError::not_found(format!("Rule {id} not found")));
    }

    Ok(RuleVersion::list_for_rule(id, pool).await?)
}
