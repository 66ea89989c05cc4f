//! Rule updates with version-on-change semantics.
//!
//! Header fields update in place; a changed condition or action creates a
//! new immutable version and retargets `current_version_id`. Metadata-only
//! edits bump `updated_at` without creating a version.

use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;

use crate::common::ApiError;
use crate::domains::rules::models::{Rule, RuleVersion};

use super::create_rule::{validate_action, validate_condition, RuleWithVersion};

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRuleInput {
    pub name: Option<String>,
    pub event_type: Option<String>,
    pub active: Option<bool>,
    pub condition: Option<Value>,
    pub action: Option<Value>,
}

pub async fn update_rule(
    id: i64,
    input: UpdateRuleInput,
    pool: &PgPool,
) -> Result<RuleWithVersion, ApiError> {
    if let Some(name) = &input.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("name must not be empty"));
        }
    }
    if let Some(event_type) = &input.event_type {
        if event_type.trim().is_empty() {
            return Err(ApiError::validation("event_type must not be empty"));
        }
    }
    if let Some(condition) = &input.condition {
        validate_condition(condition)?;
    }
    if let Some(action) = &input.action {
        validate_action(action)?;
    }

    let mut tx = pool.begin().await?;

    let rule = Rule::find_for_update(id, &mut tx)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Rule {id} not found")))?;

    let current_version_id = rule
        .current_version_id
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("rule {id} has no current version")))?;
    let current = RuleVersion::find_by_id_tx(current_version_id, &mut tx)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("rule {id} current version row is missing"))
        })?;

    let condition = input.condition.as_ref().unwrap_or(&current.condition);
    let action = input.action.as_ref().unwrap_or(&current.action);
    let version_changed = condition != &current.condition || action != &current.action;

    let name = input.name.as_deref().unwrap_or(&rule.name);
    let event_type = input.event_type.as_deref().unwrap_or(&rule.event_type);
    let active = input.active.unwrap_or(rule.active);

    let rule = Rule::update_header(id, name, event_type, active, &mut tx).await?;

    let current_version = if version_changed {
        let next = RuleVersion::insert(id, condition, action, current.version + 1, &mut tx).await?;
        let _ = Rule::set_current_version(id, next.id, &mut tx).await?;
        next
    } else {
        current
    };

    let rule = Rule {
        current_version_id: Some(current_version.id),
        ..rule
    };

    tx.commit().await?;

    info!(
        rule_id = rule.id,
        version = current_version.version,
        new_version = version_changed,
        "rule updated"
    );

    Ok(RuleWithVersion {
        rule,
        current_version,
    })
}
