use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::enums::DataSource;
use crate::providers::{ binance, coingecko, mempool, moralis };

type ConfigResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Poll cadence per data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub coingecko: Duration,
    pub binance: Duration,
    pub transactions: Duration,
}

impl PollIntervals {
    pub fn for_source(&self, source: DataSource) -> Duration {
        match source {
            DataSource::CoinGecko => self.coingecko,
            DataSource::Binance => self.binance,
        }
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            coingecko: DataSource::CoinGecko.default_poll_interval(),
            binance: DataSource::Binance.default_poll_interval(),
            transactions: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub coingecko: String,
    pub binance: String,
    pub moralis: String,
    pub mempool: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            coingecko: coingecko::COINGECKO_API_BASE.to_string(),
            binance: binance::BINANCE_API_BASE.to_string(),
            moralis: moralis::MORALIS_API_BASE.to_string(),
            mempool: mempool::MEMPOOL_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub data_source: DataSource,
    pub moralis_api_keys: Vec<String>,
    pub coingecko_api_key: Option<String>,
    pub poll_intervals: PollIntervals,
    pub request_timeout: Duration,
    pub warning_interval: Duration,
    pub server_host: String,
    pub server_port: u16,
    pub telegram: Option<TelegramConfig>,
    pub endpoints: Endpoints,
}

impl Config {
    pub fn from_env() -> ConfigResult<Self> {
        dotenv::dotenv().ok();
        Self::from_map(&env::vars().collect())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> ConfigResult<Self> {
        let get = |key: &str| {
            vars
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_source = match get("DATA_SOURCE") {
            Some(raw) => raw.parse::<DataSource>()?,
            None => DataSource::default(),
        };

        let moralis_api_keys = get("MORALIS_API_KEYS")
            .map(|raw| Self::parse_list(&raw))
            .unwrap_or_default();

        let defaults = PollIntervals::default();
        let poll_intervals = PollIntervals {
            coingecko: Self::parse_secs(get("COINGECKO_POLL_SECS"), defaults.coingecko, "COINGECKO_POLL_SECS")?,
            binance: Self::parse_secs(get("BINANCE_POLL_SECS"), defaults.binance, "BINANCE_POLL_SECS")?,
            transactions: Self::parse_secs(
                get("TRANSACTION_POLL_SECS"),
                defaults.transactions,
                "TRANSACTION_POLL_SECS"
            )?,
        };

        let request_timeout = Self::parse_secs(
            get("REQUEST_TIMEOUT_SECS"),
            Duration::from_secs(15),
            "REQUEST_TIMEOUT_SECS"
        )?;
        let warning_interval = Self::parse_secs(
            get("WARNING_INTERVAL_SECS"),
            Duration::from_secs(60),
            "WARNING_INTERVAL_SECS"
        )?;

        let server_host = get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = get("SERVER_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|_| "SERVER_PORT must be a valid port number")?;

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) =>
                Some(TelegramConfig {
                    bot_token,
                    chat_id: chat_id.parse().map_err(|_| "TELEGRAM_CHAT_ID must be an integer")?,
                }),
            (Some(_), None) => {
                return Err("TELEGRAM_CHAT_ID is required when TELEGRAM_BOT_TOKEN is set".into());
            }
            (None, _) => None,
        };

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            coingecko: get("COINGECKO_API_URL").unwrap_or(defaults.coingecko),
            binance: get("BINANCE_API_URL").unwrap_or(defaults.binance),
            moralis: get("MORALIS_API_URL").unwrap_or(defaults.moralis),
            mempool: get("MEMPOOL_API_URL").unwrap_or(defaults.mempool),
        };

        Ok(Config {
            database_url: get("DATABASE_URL"),
            data_source,
            moralis_api_keys,
            coingecko_api_key: get("COINGECKO_API_KEY"),
            poll_intervals,
            request_timeout,
            warning_interval,
            server_host,
            server_port,
            telegram,
            endpoints,
        })
    }

    fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn parse_secs(raw: Option<String>, default: Duration, key: &str) -> ConfigResult<Duration> {
        match raw {
            None => Ok(default),
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| format!("{} must be a whole number of seconds", key))?;
                if secs == 0 {
                    return Err(format!("{} must be greater than zero", key).into());
                }
                Ok(Duration::from_secs(secs))
            }
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_map(&HashMap::new()).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.data_source, DataSource::CoinGecko);
        assert!(config.moralis_api_keys.is_empty());
        assert_eq!(config.poll_intervals, PollIntervals::default());
        assert_eq!(config.poll_intervals.for_source(DataSource::Binance), Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.warning_interval, Duration::from_secs(60));
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.telegram, None);
        assert_eq!(config.endpoints, Endpoints::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_map(
            &vars(
                &[
                    ("DATA_SOURCE", "binance"),
                    ("MORALIS_API_KEYS", "k1, k2,,k3 "),
                    ("BINANCE_POLL_SECS", "2"),
                    ("TELEGRAM_BOT_TOKEN", "123:abc"),
                    ("TELEGRAM_CHAT_ID", "-1001"),
                    ("MEMPOOL_API_URL", "http://localhost:9000"),
                ]
            )
        ).unwrap();

        assert_eq!(config.data_source, DataSource::Binance);
        assert_eq!(config.moralis_api_keys, vec!["k1", "k2", "k3"]);
        assert_eq!(config.poll_intervals.binance, Duration::from_secs(2));
        assert_eq!(
            config.telegram,
            Some(TelegramConfig { bot_token: "123:abc".to_string(), chat_id: -1001 })
        );
        assert_eq!(config.endpoints.mempool, "http://localhost:9000");
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_map(&vars(&[("DATA_SOURCE", "kraken")])).is_err());
        assert!(Config::from_map(&vars(&[("COINGECKO_POLL_SECS", "0")])).is_err());
        assert!(Config::from_map(&vars(&[("REQUEST_TIMEOUT_SECS", "soon")])).is_err());
        assert!(Config::from_map(&vars(&[("SERVER_PORT", "99999")])).is_err());
        assert!(Config::from_map(&vars(&[("TELEGRAM_BOT_TOKEN", "123:abc")])).is_err());
    }
}
