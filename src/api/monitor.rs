use axum::{ extract::State, Json };
use serde::{ Deserialize, Serialize };

use crate::alert_checker::{ MonitorHealth, PollScope };
use crate::credentials::PoolStatus;
use crate::enums::DataSource;
use crate::error::{ AppError, Result };

use super::AppState;

#[derive(Serialize, Deserialize)]
pub struct DataSourceBody {
    pub source: DataSource,
}

#[derive(Serialize)]
pub struct DataSourceResponse {
    pub source: DataSource,
    pub name: &'static str,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub health: MonitorHealth,
    pub prices: MonitorHealth,
    pub transactions: MonitorHealth,
    pub storage_backend: &'static str,
    pub storage_degraded: bool,
    pub data_source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PoolStatus>,
}

pub async fn health_check() -> &'static str {
    "OK"
}

async fn data_source_response(state: &AppState, source: DataSource) -> DataSourceResponse {
    DataSourceResponse {
        source,
        name: source.display_name(),
        poll_interval_secs: state.scheduler.price_period().await.map(|p| p.as_secs()),
    }
}

pub async fn get_data_source(State(state): State<AppState>) -> Json<DataSourceResponse> {
    let source = state.watchlist_service.data_source().await;
    Json(data_source_response(&state, source).await)
}

/// Switching the source also restarts price polling at the new source's cadence.
pub async fn set_data_source(
    State(state): State<AppState>,
    Json(body): Json<DataSourceBody>
) -> Result<Json<DataSourceResponse>> {
    let source = if state.watchlist_service.set_data_source(body.source).await? {
        state.scheduler.reschedule_prices().await
    } else {
        body.source
    };
    Ok(Json(data_source_response(&state, source).await))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let credentials = match &state.credentials {
        Some(pool) => Some(pool.status().await),
        None => None,
    };

    Json(StatusResponse {
        health: state.checker.health().await,
        prices: state.checker.scope_health(PollScope::Prices).await,
        transactions: state.checker.scope_health(PollScope::Transactions).await,
        storage_backend: state.store.backend_name(),
        storage_degraded: state.store.is_degraded(),
        data_source: state.watchlist_service.data_source().await,
        credentials,
    })
}

pub async fn reset_credentials(State(state): State<AppState>) -> Result<Json<PoolStatus>> {
    let pool = state.credentials
        .as_ref()
        .ok_or_else(|| AppError::Validation("No API credentials configured".to_string()))?;
    pool.reset().await;
    Ok(Json(pool.status().await))
}
