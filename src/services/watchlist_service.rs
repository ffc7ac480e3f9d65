use std::sync::Arc;

use chrono::Utc;
use serde::{ Deserialize, Serialize };

use crate::enums::DataSource;
use crate::error::{ AppError, Result };
use crate::models::{ IconRefs, NormalizedResult, TrackedEntity };
use crate::providers::{ CoinGeckoProvider, CoinSearchResult };
use crate::store::StateStore;

#[derive(Debug, Clone, Deserialize)]
pub struct AddCoinRequest {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddAddressRequest {
    pub name: String,
    pub address: String,
}

/// A tracked entity together with what the monitor last saw for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
    #[serde(flatten)]
    pub entity: TrackedEntity,
    pub last_value: Option<f64>,
    pub latest: Option<NormalizedResult>,
    pub rule_count: usize,
}

/// Adds, removes and lists tracked coins and wallets.
pub struct WatchlistService {
    store: Arc<StateStore>,
    coingecko: Arc<CoinGeckoProvider>,
}

impl WatchlistService {
    pub fn new(store: Arc<StateStore>, coingecko: Arc<CoinGeckoProvider>) -> Self {
        Self { store, coingecko }
    }

    pub async fn list(&self) -> Vec<EntityView> {
        self.store.read(|state| {
            state.entities
                .iter()
                .map(|entity| EntityView {
                    entity: entity.clone(),
                    last_value: state.last_values.get(&entity.id).copied(),
                    latest: state.latest.get(&entity.id).cloned(),
                    rule_count: state.rules_for(&entity.id).len(),
                })
                .collect()
        }).await
    }

    pub async fn add_coin(&self, request: AddCoinRequest) -> Result<TrackedEntity> {
        let icon = match (request.thumb, request.large) {
            (None, None) => None,
            (thumb, large) => Some(IconRefs { thumb, large }),
        };
        let entity = TrackedEntity::coin(
            request.id,
            &request.symbol,
            request.name,
            icon,
            Utc::now().timestamp_millis()
        )?;

        self.store.mutate(|state| state.add_entity(entity.clone())).await?;
        tracing::info!(id = %entity.id, symbol = %entity.symbol_or_chain, "Coin added");
        Ok(entity)
    }

    pub async fn add_address(&self, request: AddAddressRequest) -> Result<TrackedEntity> {
        let entity = TrackedEntity::address(
            &request.name,
            &request.address,
            Utc::now().timestamp_millis()
        )?;

        self.store.mutate(|state| state.add_entity(entity.clone())).await?;
        tracing::info!(address = %entity.short_id(), kind = %entity.kind, "Wallet added");
        Ok(entity)
    }

    pub async fn remove(&self, id: &str) -> Result<TrackedEntity> {
        let removed = self.store.mutate(|state| state.remove_entity(id)).await?;
        tracing::info!(id = %removed.short_id(), "Entity removed");
        Ok(removed)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<CoinSearchResult>> {
        self.coingecko
            .search(query).await
            .map_err(|e| AppError::External(format!("Coin search failed: {}", e)))
    }

    pub async fn data_source(&self) -> DataSource {
        self.store.read(|state| state.data_source).await
    }

    /// Returns whether the source changed.
    pub async fn set_data_source(&self, source: DataSource) -> Result<bool> {
        let changed = self.store.mutate(|state| Ok(state.set_data_source(source))).await?;
        if changed {
            tracing::info!(source = %source, "Data source switched");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKeyValueStore;

    async fn service() -> WatchlistService {
        let store = Arc::new(
            StateStore::load(Arc::new(MemoryKeyValueStore::new()), DataSource::CoinGecko).await
        );
        let coingecko = Arc::new(
            CoinGeckoProvider::new(reqwest::Client::new(), "http://127.0.0.1:1", None)
        );
        WatchlistService::new(store, coingecko)
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let service = service().await;
        service
            .add_coin(AddCoinRequest {
                id: "bitcoin".to_string(),
                symbol: "btc".to_string(),
                name: "Bitcoin".to_string(),
                thumb: Some("https://img/btc.png".to_string()),
                large: None,
            }).await
            .unwrap();
        service
            .add_address(AddAddressRequest {
                name: "Cold".to_string(),
                address: "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh".to_string(),
            }).await
            .unwrap();

        let list = service.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].entity.icon.as_ref().and_then(|i| i.best()), Some("https://img/btc.png"));
        assert_eq!(list[0].last_value, None);

        service.remove("bitcoin").await.unwrap();
        assert_eq!(service.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let service = service().await;
        let err = service
            .add_address(AddAddressRequest {
                name: "Typo".to_string(),
                address: "0x123".to_string(),
            }).await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAddress));
        assert!(service.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_data_source_reports_change() {
        let service = service().await;
        assert!(service.set_data_source(DataSource::Binance).await.unwrap());
        assert!(!service.set_data_source(DataSource::Binance).await.unwrap());
        assert_eq!(service.data_source().await, DataSource::Binance);
    }
}
