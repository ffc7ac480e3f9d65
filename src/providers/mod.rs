use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::enums::{ DataSource, EntityKind };
use crate::error::{ AppError, PollError, PollResult, Result };
use crate::models::{ AddressActivity, NormalizedResult, TrackedEntity };

pub mod binance;
pub mod coingecko;
pub mod mempool;
pub mod moralis;

pub use binance::BinanceProvider;
pub use coingecko::{ CoinGeckoProvider, CoinSearchResult };
pub use mempool::MempoolProvider;
pub use moralis::MoralisProvider;

/// A price source for tracked coins.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn source(&self) -> DataSource;

    /// Fetches prices for all given coins in one batch, keyed by entity id.
    ///
    /// Coins the upstream does not know are simply absent from the map.
    async fn fetch_prices(
        &self,
        coins: &[TrackedEntity]
    ) -> PollResult<HashMap<String, NormalizedResult>>;
}

/// A transaction feed for wallet addresses.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    fn supports(&self, kind: EntityKind) -> bool;

    /// Recent transactions plus the address's cumulative transaction count.
    async fn fetch_activity(&self, address: &str) -> PollResult<AddressActivity>;
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client
        ::builder()
        .timeout(timeout)
        .user_agent(concat!("crypto-watch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Maps a non-success status to a poll error.
///
/// Only keyed providers treat 401/403/429 as a credential problem; elsewhere those are
/// ordinary upstream failures.
pub(crate) fn check_status(status: StatusCode, keyed: bool) -> PollResult<()> {
    if status.is_success() {
        return Ok(());
    }

    let code = status.as_u16();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if keyed => {
            Err(PollError::Credential(code))
        }
        _ => Err(PollError::Upstream(code)),
    }
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> PollResult<T> {
    serde_json::from_str(body).map_err(|e| PollError::Parse(e.to_string()))
}

/// Explorers report counts either as JSON numbers or as decimal strings.
#[derive(serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum Count {
    Number(u64),
    Text(String),
}

impl Count {
    pub(crate) fn value(&self) -> PollResult<u64> {
        match self {
            Count::Number(n) => Ok(*n),
            Count::Text(s) =>
                s.trim().parse().map_err(|_| PollError::Parse(format!("invalid count: {}", s))),
        }
    }
}

/// Price providers keyed by source, so the active one can be switched at runtime.
pub struct PriceProviders {
    providers: HashMap<DataSource, Arc<dyn PriceProvider>>,
}

impl PriceProviders {
    pub fn new(list: Vec<Arc<dyn PriceProvider>>) -> Self {
        Self {
            providers: list
                .into_iter()
                .map(|p| (p.source(), p))
                .collect(),
        }
    }

    pub fn get(&self, source: DataSource) -> Option<Arc<dyn PriceProvider>> {
        self.providers.get(&source).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        assert_eq!(check_status(StatusCode::OK, true), Ok(()));
        assert_eq!(check_status(StatusCode::UNAUTHORIZED, true), Err(PollError::Credential(401)));
        assert_eq!(
            check_status(StatusCode::TOO_MANY_REQUESTS, true),
            Err(PollError::Credential(429))
        );
        assert_eq!(
            check_status(StatusCode::TOO_MANY_REQUESTS, false),
            Err(PollError::Upstream(429))
        );
        assert_eq!(
            check_status(StatusCode::INTERNAL_SERVER_ERROR, true),
            Err(PollError::Upstream(500))
        );
    }

    #[test]
    fn test_count_accepts_numbers_and_strings() {
        let counts: Vec<Count> = parse_json(r#"[12, "345", "x"]"#).unwrap();
        assert_eq!(counts[0].value(), Ok(12));
        assert_eq!(counts[1].value(), Ok(345));
        assert!(matches!(counts[2].value(), Err(PollError::Parse(_))));
    }
}
