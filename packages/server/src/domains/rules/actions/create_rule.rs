//! Rule creation: header plus version 1 in one transaction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;

use crate::common::ApiError;
use crate::domains::rules::condition;
use crate::domains::rules::models::{Rule, RuleVersion};
use crate::kernel::dispatch::RuleAction;

#[derive(Debug, Deserialize)]
pub struct CreateRuleInput {
    pub name: String,
    pub event_type: String,
    pub condition: Value,
    pub action: Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A rule joined with its current version, as returned by create/update.
#[derive(Debug, Serialize)]
pub struct RuleWithVersion {
    #[serde(flatten)]
    pub rule: Rule,
    pub current_version: RuleVersion,
}

pub(super) fn validate_condition(condition: &Value) -> Result<(), ApiError> {
    condition::validate(condition).map_err(|e| ApiError::validation(e.to_string()))
}

pub(super) fn validate_action(action: &Value) -> Result<(), ApiError> {
    RuleAction::parse(action)
        .map(|_| ())
        .map_err(|e| ApiError::validation(e.to_string()))
}

pub async fn create_rule(input: CreateRuleInput, pool: &PgPool) -> Result<RuleWithVersion, ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    if input.event_type.trim().is_empty() {
        return Err(ApiError::validation("event_type must not be empty"));
    }
    validate_condition(&input.condition)?;
    validate_action(&input.action)?;

    let mut tx = pool.begin().await?;

    let rule = Rule::insert_header(&input.name, &input.event_type, input.active, &mut tx).await?;
    let version = RuleVersion::insert(rule.id, &input.condition, &input.action, 1, &mut tx).await?;
    let rule = Rule::set_current_version(rule.id, version.id, &mut tx).await?;

    tx.commit().await?;

    info!(rule_id = rule.id, name = %rule.name, "rule created");

    Ok(RuleWithVersion {
        rule,
        current_version: version,
    })
}
