use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ─── Condition ───────────────────────────────────────────────────────

/// Price alert trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Above,
    Below,
    Crosses,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Above => "above",
            Condition::Below => "below",
            Condition::Crosses => "crosses",
        }
    }

    /// Phrase used in notification text.
    pub fn describe(&self) -> &'static str {
        match self {
            Condition::Above => "rose to",
            Condition::Below => "fell to",
            Condition::Crosses => "crossed",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Condition::Above => "\u{1f4c8}", // 📈
            Condition::Below => "\u{1f4c9}", // 📉
            Condition::Crosses => "\u{26a1}", // ⚡
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "above" => Ok(Condition::Above),
            "below" => Ok(Condition::Below),
            "crosses" | "cross" => Ok(Condition::Crosses),
            _ => Err(AppError::Validation(format!(
                "Invalid condition: {}. Supported: above, below, crosses",
                s
            ))),
        }
    }
}

// ─── DataSource ──────────────────────────────────────────────────────

/// Upstream price provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    CoinGecko,
    Binance,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::CoinGecko => "coingecko",
            DataSource::Binance => "binance",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DataSource::CoinGecko => "CoinGecko",
            DataSource::Binance => "Binance",
        }
    }

    /// Default refresh period; Binance tolerates a much faster cadence.
    pub fn default_poll_interval(&self) -> Duration {
        match self {
            DataSource::CoinGecko => Duration::from_secs(30),
            DataSource::Binance => Duration::from_secs(5),
        }
    }

    pub fn all() -> &'static [DataSource] {
        &[DataSource::CoinGecko, DataSource::Binance]
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coingecko" | "cg" => Ok(DataSource::CoinGecko),
            "binance" => Ok(DataSource::Binance),
            _ => Err(AppError::Validation(format!(
                "Unsupported data source: {}. Supported: coingecko, binance",
                s
            ))),
        }
    }
}

// ─── EntityKind ──────────────────────────────────────────────────────

/// What a tracked entity is, which decides how it is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Coin,
    EvmAddress,
    BtcAddress,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Coin => "coin",
            EntityKind::EvmAddress => "evm_address",
            EntityKind::BtcAddress => "btc_address",
        }
    }

    pub fn is_address(&self) -> bool {
        !matches!(self, EntityKind::Coin)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Chain ───────────────────────────────────────────────────────────

/// Chains whose transactions are monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Eth,
    Bsc,
    Btc,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Bsc => "BSC",
            Chain::Btc => "BTC",
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Bsc => "BNB",
            Chain::Btc => "BTC",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Chain::Eth => "Ethereum",
            Chain::Bsc => "BSC",
            Chain::Btc => "Bitcoin",
        }
    }

    /// Hex chain id used by the Moralis `chain` query parameter.
    pub fn moralis_id(&self) -> Option<&'static str> {
        match self {
            Chain::Eth => Some("0x1"),
            Chain::Bsc => Some("0x38"),
            Chain::Btc => None,
        }
    }

    pub fn explorer_url(&self) -> &'static str {
        match self {
            Chain::Eth => "https://etherscan.io",
            Chain::Bsc => "https://bscscan.com",
            Chain::Btc => "https://mempool.space",
        }
    }

    pub fn tx_explorer_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url(), tx_hash)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── TxDirection ─────────────────────────────────────────────────────

/// Direction of a transaction relative to the monitored address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    In,
    Out,
}

impl TxDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxDirection::In => "in",
            TxDirection::Out => "out",
        }
    }
}

impl fmt::Display for TxDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_parsing() {
        assert_eq!("ABOVE".parse::<Condition>().unwrap(), Condition::Above);
        assert_eq!("crosses".parse::<Condition>().unwrap(), Condition::Crosses);
        assert!("sideways".parse::<Condition>().is_err());
    }

    #[test]
    fn test_data_source_serde_matches_as_str() {
        for source in DataSource::all() {
            let json = serde_json::to_string(source).unwrap();
            assert_eq!(json, format!("\"{}\"", source.as_str()));
            assert_eq!(source.as_str().parse::<DataSource>().unwrap(), *source);
        }
    }

    #[test]
    fn test_poll_intervals() {
        assert_eq!(DataSource::Binance.default_poll_interval(), Duration::from_secs(5));
        assert_eq!(DataSource::CoinGecko.default_poll_interval(), Duration::from_secs(30));
    }
}
