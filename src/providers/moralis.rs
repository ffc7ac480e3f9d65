use std::sync::Arc;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use serde::Deserialize;

use crate::credentials::{ CredentialLease, CredentialRotator };
use crate::enums::{ Chain, EntityKind, TxDirection };
use crate::error::{ PollError, PollResult };
use crate::models::{ AddressActivity, Transaction };

use super::{ check_status, parse_json, Count, TransactionProvider };

pub const MORALIS_API_BASE: &str = "https://deep-index.moralis.io";
const WEI_PER_NATIVE: f64 = 1e18;

#[derive(Deserialize)]
struct WalletHistory {
    #[serde(default)]
    result: Vec<RawTransaction>,
}

#[derive(Deserialize)]
struct WalletStats {
    transactions: StatsTotal,
}

#[derive(Deserialize)]
struct StatsTotal {
    total: Count,
}

#[derive(Deserialize)]
struct RawTransaction {
    hash: String,
    from_address: String,
    #[serde(default)]
    to_address: Option<String>,
    value: String,
    block_timestamp: String,
    #[serde(default)]
    block_number: Option<String>,
}

/// EVM transaction history across Ethereum and BSC, authenticated from a rotating key pool.
pub struct MoralisProvider {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialRotator>,
}

impl MoralisProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<CredentialRotator>
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    async fn get(&self, url: &str, chain: Chain, lease: &CredentialLease) -> PollResult<String> {
        let response = self.client.get(url).header("X-API-Key", &lease.secret).send().await?;
        let status = response.status();
        if let Err(e) = check_status(status, true) {
            tracing::debug!(chain = %chain, index = lease.index, status = status.as_u16(), "Moralis request failed");
            return Err(e);
        }
        Ok(response.text().await?)
    }

    /// History page first, then the wallet stats for the cumulative count. Both use one lease.
    async fn request_chain(
        &self,
        address: &str,
        chain: Chain,
        lease: CredentialLease
    ) -> PollResult<AddressActivity> {
        let chain_id = chain
            .moralis_id()
            .ok_or_else(|| PollError::Unsupported(chain.to_string()))?;

        let history_url = format!("{}/api/v2.2/{}?chain={}", self.base_url, address, chain_id);
        let history = self.get(&history_url, chain, &lease).await?;
        let transactions = parse_history(&history, address, chain)?;

        let stats_url = format!(
            "{}/api/v2.2/wallets/{}/stats?chain={}",
            self.base_url,
            address,
            chain_id
        );
        let stats = self.get(&stats_url, chain, &lease).await?;

        Ok(AddressActivity::new(parse_stats(&stats)?, transactions))
    }

    /// Fetches one chain, rotating keys on credential failures.
    pub async fn fetch_chain(&self, address: &str, chain: Chain) -> PollResult<AddressActivity> {
        self.credentials.execute(|lease| self.request_chain(address, chain, lease)).await
    }
}

#[async_trait]
impl TransactionProvider for MoralisProvider {
    fn supports(&self, kind: EntityKind) -> bool {
        kind == EntityKind::EvmAddress
    }

    /// A failure on either chain fails the whole address for this cycle.
    async fn fetch_activity(&self, address: &str) -> PollResult<AddressActivity> {
        let (eth, bsc) = tokio::join!(
            self.fetch_chain(address, Chain::Eth),
            self.fetch_chain(address, Chain::Bsc)
        );

        let mut activity = eth?;
        activity.merge(bsc?);
        Ok(activity)
    }
}

pub(crate) fn parse_stats(body: &str) -> PollResult<u64> {
    let stats: WalletStats = parse_json(body)?;
    stats.transactions.total.value()
}

pub(crate) fn parse_history(body: &str, address: &str, chain: Chain) -> PollResult<Vec<Transaction>> {
    let history: WalletHistory = parse_json(body)?;

    Ok(
        history.result
            .into_iter()
            .filter_map(|raw| {
                let timestamp = match DateTime::parse_from_rfc3339(&raw.block_timestamp) {
                    Ok(ts) => ts.with_timezone(&Utc),
                    Err(e) => {
                        tracing::debug!(hash = %raw.hash, error = %e, "Skipping transaction with bad timestamp");
                        return None;
                    }
                };

                let direction = if raw.from_address.eq_ignore_ascii_case(address) {
                    TxDirection::Out
                } else {
                    TxDirection::In
                };

                let wei = raw.value.parse::<f64>().unwrap_or_else(|e| {
                    tracing::debug!(hash = %raw.hash, value = %raw.value, error = %e, "Treating unparsable value as zero");
                    0.0
                });

                Some(Transaction {
                    explorer_url: chain.tx_explorer_url(&raw.hash),
                    hash: raw.hash,
                    chain: chain.display_name().to_string(),
                    direction,
                    from: raw.from_address,
                    to: raw.to_address.unwrap_or_default(),
                    value: wei / WEI_PER_NATIVE,
                    symbol: chain.native_symbol().to_string(),
                    timestamp,
                    block_number: raw.block_number.and_then(|n| n.parse().ok()),
                })
            })
            .collect()
    )
}
