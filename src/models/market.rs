use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

use crate::enums::TxDirection;

/// A transaction normalized across explorers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub chain: String,
    pub direction: TxDirection,
    pub from: String,
    pub to: String,
    pub value: f64,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub explorer_url: String,
}

/// Recent transactions of an address plus its all-time transaction count.
///
/// Explorers return one page of history, so `total` comes from their stats endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressActivity {
    pub total: u64,
    pub transactions: Vec<Transaction>,
}

impl AddressActivity {
    pub fn new(total: u64, transactions: Vec<Transaction>) -> Self {
        Self { total, transactions }
    }

    /// Merges another chain's activity into this one.
    pub fn merge(&mut self, other: AddressActivity) {
        self.total += other.total;
        self.transactions.extend(other.transactions);
    }
}

/// Secondary metric carried next to the primary value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Auxiliary {
    /// 24h change in percent.
    Change24h(f64),
    /// Newest first.
    Transactions(Vec<Transaction>),
}

/// Provider-agnostic result for one entity in one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Auxiliary>,
}

impl NormalizedResult {
    pub fn price(price: f64, change_24h: Option<f64>) -> Self {
        Self {
            value: price,
            auxiliary: change_24h.map(Auxiliary::Change24h),
        }
    }

    /// The value of an address is its cumulative transaction count, never less than the
    /// number of transactions actually returned.
    pub fn activity(activity: AddressActivity) -> Self {
        let AddressActivity { total, transactions: mut txs } = activity;
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self {
            value: total.max(txs.len() as u64) as f64,
            auxiliary: Some(Auxiliary::Transactions(txs)),
        }
    }
}

/// `$0.000123` below one dollar, `$1234.50` otherwise.
pub fn format_price(price: f64) -> String {
    if price.abs() < 1.0 { format!("${:.6}", price) } else { format!("${:.2}", price) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tx(hash: &str, secs: i64) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            chain: "Ethereum".to_string(),
            direction: TxDirection::In,
            from: "a".to_string(),
            to: "b".to_string(),
            value: 1.0,
            symbol: "ETH".to_string(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            block_number: None,
            explorer_url: String::new(),
        }
    }

    #[test]
    fn test_transactions_sorted_newest_first() {
        let result = NormalizedResult::activity(
            AddressActivity::new(0, vec![tx("old", 10), tx("new", 30), tx("mid", 20)])
        );
        assert_eq!(result.value, 3.0);
        match result.auxiliary {
            Some(Auxiliary::Transactions(txs)) => {
                let hashes: Vec<_> = txs.iter().map(|t| t.hash.as_str()).collect();
                assert_eq!(hashes, vec!["new", "mid", "old"]);
            }
            other => panic!("unexpected auxiliary: {:?}", other),
        }
    }

    #[test]
    fn test_activity_value_is_the_cumulative_count() {
        let page: Vec<Transaction> = (0..25).map(|i| tx(&format!("tx{}", i), i)).collect();
        let result = NormalizedResult::activity(AddressActivity::new(500, page));
        assert_eq!(result.value, 500.0);

        let mut eth = AddressActivity::new(40, vec![tx("a", 1)]);
        eth.merge(AddressActivity::new(2, vec![tx("b", 2)]));
        assert_eq!(eth.total, 42);
        assert_eq!(eth.transactions.len(), 2);
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0.5), "$0.500000");
        assert_eq!(format_price(65000.123), "$65000.12");
    }
}
