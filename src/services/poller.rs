use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::enums::DataSource;
use crate::error::{ PollError, PollResult };
use crate::models::{ NormalizedResult, TrackedEntity };
use crate::providers::{ PriceProviders, TransactionProvider };

/// Per-entity result of one poll, keyed by entity id.
pub type PollOutcome = HashMap<String, PollResult<NormalizedResult>>;

/// Fetches fresh values for tracked entities and normalizes them.
///
/// Coins go out in one batch to the active price provider. Addresses are fetched
/// concurrently, each from the first transaction provider that supports its kind.
pub struct Poller {
    price_providers: PriceProviders,
    transaction_providers: Vec<Arc<dyn TransactionProvider>>,
}

impl Poller {
    pub fn new(
        price_providers: PriceProviders,
        transaction_providers: Vec<Arc<dyn TransactionProvider>>
    ) -> Self {
        Self {
            price_providers,
            transaction_providers,
        }
    }

    pub async fn poll_once(&self, entities: &[TrackedEntity], source: DataSource) -> PollOutcome {
        let (addresses, coins): (Vec<TrackedEntity>, Vec<TrackedEntity>) = entities
            .iter()
            .cloned()
            .partition(|e| e.is_address());

        let (mut prices, transactions) = tokio::join!(
            self.poll_prices(&coins, source),
            self.poll_transactions(&addresses)
        );
        prices.extend(transactions);
        prices
    }

    pub async fn poll_prices(&self, coins: &[TrackedEntity], source: DataSource) -> PollOutcome {
        if coins.is_empty() {
            return HashMap::new();
        }

        let provider = match self.price_providers.get(source) {
            Some(provider) => provider,
            None => {
                let err = PollError::Unsupported(format!("price source {}", source));
                return coins
                    .iter()
                    .map(|c| (c.id.clone(), Err(err.clone())))
                    .collect();
            }
        };

        match provider.fetch_prices(coins).await {
            Ok(mut prices) => {
                coins
                    .iter()
                    .map(|coin| {
                        let result = match prices.remove(&coin.id) {
                            Some(price) => finite(price),
                            None => Err(PollError::Missing),
                        };
                        (coin.id.clone(), result)
                    })
                    .collect()
            }
            Err(e) => {
                tracing::warn!(source = %source, coins = coins.len(), error = %e, "Price fetch failed");
                coins
                    .iter()
                    .map(|c| (c.id.clone(), Err(e.clone())))
                    .collect()
            }
        }
    }

    pub async fn poll_transactions(&self, addresses: &[TrackedEntity]) -> PollOutcome {
        let fetches = addresses.iter().map(|entity| async move {
            let result = match self.transaction_providers.iter().find(|p| p.supports(entity.kind)) {
                Some(provider) => {
                    provider
                        .fetch_activity(&entity.id).await
                        .map(NormalizedResult::activity)
                }
                None => Err(PollError::Unsupported(entity.kind.to_string())),
            };

            if let Err(e) = &result {
                tracing::warn!(address = %entity.short_id(), error = %e, "Transaction fetch failed");
            }
            (entity.id.clone(), result)
        });

        join_all(fetches).await.into_iter().collect()
    }
}

fn finite(result: NormalizedResult) -> PollResult<NormalizedResult> {
    if result.value.is_finite() {
        Ok(result)
    } else {
        Err(PollError::Parse(format!("non-finite value {}", result.value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::EntityKind;
    use crate::models::AddressActivity;
    use crate::providers::PriceProvider;
    use async_trait::async_trait;

    struct FixedPrices(HashMap<String, f64>);

    #[async_trait]
    impl PriceProvider for FixedPrices {
        fn source(&self) -> DataSource {
            DataSource::CoinGecko
        }

        async fn fetch_prices(
            &self,
            _coins: &[TrackedEntity]
        ) -> PollResult<HashMap<String, NormalizedResult>> {
            Ok(
                self.0
                    .iter()
                    .map(|(id, v)| (id.clone(), NormalizedResult::price(*v, None)))
                    .collect()
            )
        }
    }

    struct DownPrices;

    #[async_trait]
    impl PriceProvider for DownPrices {
        fn source(&self) -> DataSource {
            DataSource::Binance
        }

        async fn fetch_prices(
            &self,
            _coins: &[TrackedEntity]
        ) -> PollResult<HashMap<String, NormalizedResult>> {
            Err(PollError::Transport("connection refused".to_string()))
        }
    }

    struct EmptyEvm;

    #[async_trait]
    impl TransactionProvider for EmptyEvm {
        fn supports(&self, kind: EntityKind) -> bool {
            kind == EntityKind::EvmAddress
        }

        async fn fetch_activity(&self, _address: &str) -> PollResult<AddressActivity> {
            Ok(AddressActivity::default())
        }
    }

    fn poller() -> Poller {
        let prices = HashMap::from([
            ("bitcoin".to_string(), 65_000.0),
            ("broken".to_string(), f64::NAN),
        ]);
        Poller::new(
            PriceProviders::new(vec![Arc::new(FixedPrices(prices)), Arc::new(DownPrices)]),
            vec![Arc::new(EmptyEvm)]
        )
    }

    fn entities() -> Vec<TrackedEntity> {
        vec![
            TrackedEntity::coin("bitcoin", "btc", "Bitcoin", None, 0).unwrap(),
            TrackedEntity::coin("broken", "brk", "Broken", None, 0).unwrap(),
            TrackedEntity::coin("unknown", "unk", "Unknown", None, 0).unwrap(),
            TrackedEntity::address("Main", "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045", 0).unwrap(),
            TrackedEntity::address("Cold", "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh", 0).unwrap()
        ]
    }

    #[tokio::test]
    async fn test_poll_once_reports_per_entity() {
        let outcome = poller().poll_once(&entities(), DataSource::CoinGecko).await;

        assert_eq!(outcome.len(), 5);
        assert_eq!(outcome["bitcoin"].as_ref().unwrap().value, 65_000.0);
        assert!(matches!(outcome["broken"], Err(PollError::Parse(_))));
        assert_eq!(outcome["unknown"], Err(PollError::Missing));
        assert_eq!(
            outcome["0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"].as_ref().unwrap().value,
            0.0
        );
        assert!(
            matches!(
                outcome["bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh"],
                Err(PollError::Unsupported(_))
            )
        );
    }

    #[tokio::test]
    async fn test_batch_failure_is_reported_for_every_coin() {
        let outcome = poller().poll_once(&entities(), DataSource::Binance).await;

        for id in ["bitcoin", "broken", "unknown"] {
            assert_eq!(outcome[id], Err(PollError::Transport("connection refused".to_string())));
        }
        // Address fetches are unaffected.
        assert!(outcome["0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"].is_ok());
    }
}
