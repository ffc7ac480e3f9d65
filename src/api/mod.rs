use std::sync::Arc;

use axum::{ routing::{ get, post }, Router };
use tower_http::{ cors::CorsLayer, trace::TraceLayer };

pub mod entities;
pub mod monitor;
pub mod rules;

use crate::alert_checker::AlertChecker;
use crate::credentials::CredentialRotator;
use crate::scheduler::MonitorScheduler;
use crate::services::{ PriceAlertService, WatchlistService };
use crate::store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub watchlist_service: Arc<WatchlistService>,
    pub price_alert_service: Arc<PriceAlertService>,
    pub checker: Arc<AlertChecker>,
    pub scheduler: Arc<MonitorScheduler>,
    /// Absent when no Moralis keys are configured.
    pub credentials: Option<Arc<CredentialRotator>>,
}

impl AppState {
    pub fn new(
        store: Arc<StateStore>,
        watchlist_service: Arc<WatchlistService>,
        price_alert_service: Arc<PriceAlertService>,
        checker: Arc<AlertChecker>,
        scheduler: Arc<MonitorScheduler>,
        credentials: Option<Arc<CredentialRotator>>
    ) -> Self {
        Self {
            store,
            watchlist_service,
            price_alert_service,
            checker,
            scheduler,
            credentials,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(monitor::health_check))
        .route("/api/entities", get(entities::list_entities))
        .route("/api/entities/coins", post(entities::add_coin))
        .route("/api/entities/addresses", post(entities::add_address))
        .route("/api/entities/{id}", axum::routing::delete(entities::remove_entity))
        .route("/api/entities/{id}/rules", get(rules::list_rules).post(rules::create_rule))
        .route("/api/entities/{id}/rules/{rule_id}", axum::routing::delete(rules::delete_rule))
        .route("/api/entities/{id}/rules/{rule_id}/pause", post(rules::pause_rule))
        .route("/api/entities/{id}/rules/{rule_id}/resume", post(rules::resume_rule))
        .route("/api/search", get(entities::search_coins))
        .route("/api/data-source", get(monitor::get_data_source).put(monitor::set_data_source))
        .route("/api/status", get(monitor::status))
        .route("/api/credentials/reset", post(monitor::reset_credentials))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
