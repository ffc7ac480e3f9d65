use axum::{ extract::{ Path, Query, State }, http::StatusCode, Json };
use serde::Deserialize;

use crate::error::Result;
use crate::models::TrackedEntity;
use crate::providers::CoinSearchResult;
use crate::services::watchlist_service::{ AddAddressRequest, AddCoinRequest, EntityView };

use super::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

pub async fn list_entities(State(state): State<AppState>) -> Json<Vec<EntityView>> {
    Json(state.watchlist_service.list().await)
}

pub async fn add_coin(
    State(state): State<AppState>,
    Json(request): Json<AddCoinRequest>
) -> Result<(StatusCode, Json<TrackedEntity>)> {
    let entity = state.watchlist_service.add_coin(request).await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

pub async fn add_address(
    State(state): State<AppState>,
    Json(request): Json<AddAddressRequest>
) -> Result<(StatusCode, Json<TrackedEntity>)> {
    let entity = state.watchlist_service.add_address(request).await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

pub async fn remove_entity(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<TrackedEntity>> {
    Ok(Json(state.watchlist_service.remove(&id).await?))
}

pub async fn search_coins(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>
) -> Result<Json<Vec<CoinSearchResult>>> {
    Ok(Json(state.watchlist_service.search(&params.query).await?))
}
