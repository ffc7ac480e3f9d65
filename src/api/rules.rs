use axum::{ extract::{ Path, State }, http::StatusCode, Json };

use crate::error::Result;
use crate::rules::{ NewRule, Rule };

use super::AppState;

pub async fn list_rules(
    State(state): State<AppState>,
    Path(entity_id): Path<String>
) -> Result<Json<Vec<Rule>>> {
    Ok(Json(state.price_alert_service.list_rules(&entity_id).await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
    Json(request): Json<NewRule>
) -> Result<(StatusCode, Json<Rule>)> {
    let rule = state.price_alert_service.create_rule(&entity_id, request).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path((entity_id, rule_id)): Path<(String, i64)>
) -> Result<Json<Rule>> {
    Ok(Json(state.price_alert_service.delete_rule(&entity_id, rule_id).await?))
}

pub async fn pause_rule(
    State(state): State<AppState>,
    Path((entity_id, rule_id)): Path<(String, i64)>
) -> Result<Json<Rule>> {
    Ok(Json(state.price_alert_service.pause_rule(&entity_id, rule_id).await?))
}

pub async fn resume_rule(
    State(state): State<AppState>,
    Path((entity_id, rule_id)): Path<(String, i64)>
) -> Result<Json<Rule>> {
    Ok(Json(state.price_alert_service.resume_rule(&entity_id, rule_id).await?))
}
