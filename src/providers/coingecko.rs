use std::collections::HashMap;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };

use crate::enums::DataSource;
use crate::error::PollResult;
use crate::models::{ NormalizedResult, TrackedEntity };

use super::{ check_status, parse_json, PriceProvider };

pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
const SEARCH_LIMIT: usize = 10;
const MIN_QUERY_LEN: usize = 2;

#[derive(Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<CoinSearchResult>,
}

/// A coin suggestion returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSearchResult {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

pub struct CoinGeckoProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get(&self, url: &str) -> PollResult<String> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await?;
        check_status(response.status(), false)?;
        Ok(response.text().await?)
    }

    /// Coin lookup for the add-coin flow. Queries shorter than two characters return nothing.
    pub async fn search(&self, query: &str) -> PollResult<Vec<CoinSearchResult>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }

        let url = format!("{}/search?query={}", self.base_url, urlencoding::encode(query));
        let body = self.get(&url).await?;
        parse_search(&body)
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn source(&self) -> DataSource {
        DataSource::CoinGecko
    }

    async fn fetch_prices(
        &self,
        coins: &[TrackedEntity]
    ) -> PollResult<HashMap<String, NormalizedResult>> {
        if coins.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<&str> = coins
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_24hr_change=true",
            self.base_url,
            urlencoding::encode(&ids.join(","))
        );

        let body = self.get(&url).await?;
        let prices = parse_simple_price(&body)?;
        tracing::debug!(requested = coins.len(), received = prices.len(), "CoinGecko prices fetched");
        Ok(prices)
    }
}

pub(crate) fn parse_simple_price(body: &str) -> PollResult<HashMap<String, NormalizedResult>> {
    let raw: HashMap<String, SimplePrice> = parse_json(body)?;

    Ok(
        raw
            .into_iter()
            .filter_map(|(id, entry)| {
                entry.usd.map(|usd| (id, NormalizedResult::price(usd, entry.usd_24h_change)))
            })
            .collect()
    )
}

pub(crate) fn parse_search(body: &str) -> PollResult<Vec<CoinSearchResult>> {
    let response: SearchResponse = parse_json(body)?;
    Ok(response.coins.into_iter().take(SEARCH_LIMIT).collect())
}
