//! Rule CRUD endpoints.

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::common::{ApiError, PageParams};
use crate::domains::rules::actions::{
    create_rule, deactivate_rule, get_rule, list_rule_versions, list_rules, update_rule,
    CreateRuleInput, RuleListResponse, RuleWithVersion, UpdateRuleInput,
};
use crate::domains::rules::models::{Rule, RuleFilter, RuleVersion};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct RuleListQuery {
    pub active: Option<bool>,
    pub event_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_rule_handler(
    Extension(state): Extension<AppState>,
    Json(input): Json<CreateRuleInput>,
) -> Result<(StatusCode, Json<RuleWithVersion>), ApiError> {
    let created = create_rule(input, &state.db_pool).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_rules_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<RuleListQuery>,
) -> Result<Json<RuleListResponse>, ApiError> {
    let page = PageParams {
        limit: query.limit,
        offset: query.offset,
    }
    .validate()?;
    let filter = RuleFilter {
        active: query.active,
        event_type: query.event_type,
    };
    let response = list_rules(&filter, page, &state.db_pool).await?;
    Ok(Json(response))
}

pub async fn get_rule_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Rule>, ApiError> {
    let rule = get_rule(id, &state.db_pool).await?;
    Ok(Json(rule))
}

pub async fn update_rule_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateRuleInput>,
) -> Result<Json<RuleWithVersion>, ApiError> {
    let updated = update_rule(id, input, &state.db_pool).await?;
    Ok(Json(updated))
}

pub async fn deactivate_rule_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Rule>, ApiError> {
    let rule = deactivate_rule(id, &state.db_pool).await?;
    Ok(Json(rule))
}

pub async fn rule_versions_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RuleVersion>>, ApiError> {
    let versions = list_rule_versions(id, &state.db_pool).await?;
    Ok(Json(versions))
}
