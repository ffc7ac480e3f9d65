use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::enums::DataSource;
use crate::error::PollResult;
use crate::models::{ NormalizedResult, TrackedEntity };

use super::{ check_status, parse_json, PriceProvider };

pub const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";
const QUOTE_ASSET: &str = "USDT";
const USD_STABLECOINS: &[&str] = &["USDT", "USDC", "DAI", "BUSD", "FDUSD", "TUSD"];

#[derive(Deserialize)]
struct Ticker24hr {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

pub struct BinanceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Binance trading pair for a coin symbol, `None` for USD stablecoins.
pub fn trading_pair(symbol: &str) -> Option<String> {
    let symbol = symbol.trim().to_uppercase();
    if USD_STABLECOINS.contains(&symbol.as_str()) {
        None
    } else {
        Some(format!("{}{}", symbol, QUOTE_ASSET))
    }
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn source(&self) -> DataSource {
        DataSource::Binance
    }

    async fn fetch_prices(
        &self,
        coins: &[TrackedEntity]
    ) -> PollResult<HashMap<String, NormalizedResult>> {
        let needs_ticker = coins.iter().any(|c| trading_pair(&c.symbol_or_chain).is_some());
        if !needs_ticker {
            return Ok(match_tickers(coins, &[]));
        }

        // The unfiltered endpoint tolerates symbols Binance does not list.
        let url = format!("{}/ticker/24hr", self.base_url);
        let response = self.client.get(&url).send().await?;
        check_status(response.status(), false)?;

        let body = response.text().await?;
        let tickers: Vec<Ticker24hr> = parse_json(&body)?;
        let prices = match_tickers(coins, &tickers);
        tracing::debug!(requested = coins.len(), received = prices.len(), "Binance prices fetched");
        Ok(prices)
    }
}

fn match_tickers(coins: &[TrackedEntity], tickers: &[Ticker24hr]) -> HashMap<String, NormalizedResult> {
    let by_symbol: HashMap<&str, &Ticker24hr> = tickers
        .iter()
        .map(|t| (t.symbol.as_str(), t))
        .collect();

    coins
        .iter()
        .filter_map(|coin| {
            let result = match trading_pair(&coin.symbol_or_chain) {
                None => NormalizedResult::price(1.0, Some(0.0)),
                Some(pair) => {
                    let ticker = by_symbol.get(pair.as_str())?;
                    let price = ticker.last_price.parse::<f64>().ok()?;
                    NormalizedResult::price(price, ticker.price_change_percent.parse().ok())
                }
            };
            Some((coin.id.clone(), result))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Auxiliary;

    fn coin(id: &str, symbol: &str) -> TrackedEntity {
        TrackedEntity::coin(id, symbol, id, None, 0).unwrap()
    }

    #[test]
    fn test_trading_pair() {
        assert_eq!(trading_pair("btc"), Some("BTCUSDT".to_string()));
        assert_eq!(trading_pair("USDC"), None);
    }

    #[test]
    fn test_match_tickers() {
        let body =
            r#"[
            {"symbol":"BTCUSDT","lastPrice":"65000.10","priceChangePercent":"2.5"},
            {"symbol":"ETHUSDT","lastPrice":"not-a-number","priceChangePercent":"1"}
        ]"#;
        let tickers: Vec<Ticker24hr> = parse_json(body).unwrap();
        let coins = vec![
            coin("bitcoin", "btc"),
            coin("ethereum", "eth"),
            coin("tether", "usdt"),
            coin("obscure", "zzz")
        ];

        let prices = match_tickers(&coins, &tickers);
        assert_eq!(prices["bitcoin"].value, 65000.1);
        assert_eq!(prices["bitcoin"].auxiliary, Some(Auxiliary::Change24h(2.5)));
        assert_eq!(prices["tether"].value, 1.0);
        assert!(!prices.contains_key("ethereum"));
        assert!(!prices.contains_key("obscure"));
    }

    #[tokio::test]
    async fn test_stablecoins_only_skip_request() {
        let provider = BinanceProvider::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let prices = provider.fetch_prices(&[coin("usd-coin", "usdc")]).await.unwrap();
        assert_eq!(prices["usd-coin"].value, 1.0);
    }
}
