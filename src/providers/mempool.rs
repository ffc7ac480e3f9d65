use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use serde::Deserialize;

use crate::enums::{ Chain, EntityKind, TxDirection };
use crate::error::PollResult;
use crate::models::{ AddressActivity, Transaction };

use super::{ check_status, parse_json, TransactionProvider };

pub const MEMPOOL_API_BASE: &str = "https://mempool.space";
const SATS_PER_BTC: f64 = 1e8;

#[derive(Deserialize)]
struct AddressStats {
    chain_stats: TxStats,
    #[serde(default)]
    mempool_stats: TxStats,
}

#[derive(Deserialize, Default)]
struct TxStats {
    #[serde(default)]
    tx_count: u64,
}

#[derive(Deserialize)]
struct RawTx {
    txid: String,
    #[serde(default)]
    vin: Vec<RawInput>,
    #[serde(default)]
    vout: Vec<RawOutput>,
    status: RawStatus,
}

#[derive(Deserialize)]
struct RawInput {
    #[serde(default)]
    prevout: Option<RawOutput>,
}

#[derive(Deserialize)]
struct RawOutput {
    #[serde(default)]
    scriptpubkey_address: Option<String>,
    #[serde(default)]
    value: u64,
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    block_height: Option<u64>,
    #[serde(default)]
    block_time: Option<i64>,
}

/// Bitcoin address history from a mempool.space-compatible explorer. No key needed.
pub struct MempoolProvider {
    client: reqwest::Client,
    base_url: String,
}

impl MempoolProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str) -> PollResult<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        check_status(response.status(), false)?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl TransactionProvider for MempoolProvider {
    fn supports(&self, kind: EntityKind) -> bool {
        kind == EntityKind::BtcAddress
    }

    /// The txs endpoint pages at 25 confirmed entries, so the count comes from the address stats.
    async fn fetch_activity(&self, address: &str) -> PollResult<AddressActivity> {
        let stats_path = format!("/api/address/{}", address);
        let txs_path = format!("/api/address/{}/txs", address);
        let (stats, txs) = tokio::try_join!(self.get(&stats_path), self.get(&txs_path))?;

        let total = parse_address_stats(&stats)?;
        let transactions = parse_address_txs(&txs, address, Utc::now())?;
        Ok(AddressActivity::new(total, transactions))
    }
}

/// Confirmed plus unconfirmed transaction count.
pub(crate) fn parse_address_stats(body: &str) -> PollResult<u64> {
    let stats: AddressStats = parse_json(body)?;
    Ok(stats.chain_stats.tx_count + stats.mempool_stats.tx_count)
}

/// Unconfirmed transactions have no block time and are stamped with `now`.
pub(crate) fn parse_address_txs(
    body: &str,
    address: &str,
    now: DateTime<Utc>
) -> PollResult<Vec<Transaction>> {
    let raw: Vec<RawTx> = parse_json(body)?;

    Ok(
        raw
            .into_iter()
            .map(|tx| {
                let is_ours = |o: &RawOutput| o.scriptpubkey_address.as_deref() == Some(address);

                let spent_from_us = tx.vin
                    .iter()
                    .filter_map(|i| i.prevout.as_ref())
                    .any(is_ours);

                let (direction, sats, from, to) = if spent_from_us {
                    let sent: u64 = tx.vout
                        .iter()
                        .filter(|o| !is_ours(*o))
                        .map(|o| o.value)
                        .sum();
                    let to = tx.vout
                        .iter()
                        .find(|o| !is_ours(*o))
                        .and_then(|o| o.scriptpubkey_address.clone())
                        .unwrap_or_default();
                    (TxDirection::Out, sent, address.to_string(), to)
                } else {
                    let received: u64 = tx.vout
                        .iter()
                        .filter(|o| is_ours(*o))
                        .map(|o| o.value)
                        .sum();
                    let from = tx.vin
                        .iter()
                        .filter_map(|i| i.prevout.as_ref())
                        .find_map(|o| o.scriptpubkey_address.clone())
                        .unwrap_or_default();
                    (TxDirection::In, received, from, address.to_string())
                };

                let timestamp = tx.status.block_time
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .unwrap_or(now);

                Transaction {
                    explorer_url: Chain::Btc.tx_explorer_url(&tx.txid),
                    hash: tx.txid,
                    chain: Chain::Btc.display_name().to_string(),
                    direction,
                    from,
                    to,
                    value: (sats as f64) / SATS_PER_BTC,
                    symbol: Chain::Btc.native_symbol().to_string(),
                    timestamp,
                    block_number: tx.status.block_height,
                }
            })
            .collect()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedResult;
    use chrono::TimeZone;

    const ADDRESS: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";

    #[test]
    fn test_parse_address_txs() {
        let body = format!(
            r#"[
            {{"txid":"in1","vin":[{{"prevout":{{"scriptpubkey_address":"1Other","value":90000}}}}],
              "vout":[{{"scriptpubkey_address":"{a}","value":50000}},{{"scriptpubkey_address":"1Other","value":39000}}],
              "status":{{"confirmed":true,"block_height":840000,"block_time":1713571767}}}},
            {{"txid":"out1","vin":[{{"prevout":{{"scriptpubkey_address":"{a}","value":50000}}}}],
              "vout":[{{"scriptpubkey_address":"1Dest","value":30000}},{{"scriptpubkey_address":"{a}","value":19000}}],
              "status":{{"confirmed":false}}}}
        ]"#,
            a = ADDRESS
        );
        let now = Utc.timestamp_opt(1_800_000_000, 0).unwrap();

        let txs = parse_address_txs(&body, ADDRESS, now).unwrap();
        assert_eq!(txs.len(), 2);

        assert_eq!(txs[0].direction, TxDirection::In);
        assert_eq!(txs[0].value, 0.0005);
        assert_eq!(txs[0].from, "1Other");
        assert_eq!(txs[0].block_number, Some(840_000));
        assert_eq!(txs[0].timestamp.timestamp(), 1_713_571_767);

        assert_eq!(txs[1].direction, TxDirection::Out);
        assert_eq!(txs[1].value, 0.0003);
        assert_eq!(txs[1].to, "1Dest");
        assert_eq!(txs[1].timestamp, now);
        assert_eq!(txs[1].explorer_url, "https://mempool.space/tx/out1");
    }

    #[test]
    fn test_full_page_reports_stats_count() {
        let entry = format!(
            r#"{{"txid":"t","vin":[],"vout":[{{"scriptpubkey_address":"{}","value":1000}}],
              "status":{{"confirmed":true,"block_height":1,"block_time":1713571767}}}}"#,
            ADDRESS
        );
        let page = format!("[{}]", vec![entry; 25].join(","));
        let stats =
            r#"{"address":"bc1q","chain_stats":{"funded_txo_count":480,"tx_count":500},
               "mempool_stats":{"funded_txo_count":1,"tx_count":2}}"#;

        let txs = parse_address_txs(&page, ADDRESS, Utc::now()).unwrap();
        assert_eq!(txs.len(), 25);
        let total = parse_address_stats(stats).unwrap();
        assert_eq!(total, 502);

        let result = NormalizedResult::activity(AddressActivity::new(total, txs));
        assert_eq!(result.value, 502.0);
    }

    #[test]
    fn test_stats_without_mempool_section() {
        assert_eq!(parse_address_stats(r#"{"chain_stats":{"tx_count":7}}"#).unwrap(), 7);
        assert!(parse_address_stats("[]").is_err());
    }
}
