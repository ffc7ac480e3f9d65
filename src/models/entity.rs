use lazy_static::lazy_static;
use regex::Regex;
use serde::{ Deserialize, Serialize };

use crate::enums::EntityKind;
use crate::error::{ AppError, Result };

lazy_static! {
    static ref EVM_ADDRESS: Regex = Regex::new(r"^0x[a-fA-F0-9]{40}$").unwrap();
    static ref BTC_LEGACY_ADDRESS: Regex = Regex::new(
        r"^[13][a-km-zA-HJ-NP-Z1-9]{25,34}$"
    ).unwrap();
    static ref BTC_BECH32_ADDRESS: Regex = Regex::new(r"^bc1[a-z0-9]{39,59}$").unwrap();
}

pub fn is_evm_address(address: &str) -> bool {
    EVM_ADDRESS.is_match(address)
}

pub fn is_btc_address(address: &str) -> bool {
    BTC_LEGACY_ADDRESS.is_match(address) || BTC_BECH32_ADDRESS.is_match(address)
}

/// Classify a wallet address, rejecting anything that is neither EVM nor BTC.
pub fn classify_address(address: &str) -> Result<EntityKind> {
    if is_evm_address(address) {
        Ok(EntityKind::EvmAddress)
    } else if is_btc_address(address) {
        Ok(EntityKind::BtcAddress)
    } else {
        Err(AppError::InvalidAddress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconRefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large: Option<String>,
}

impl IconRefs {
    pub fn best(&self) -> Option<&str> {
        self.thumb.as_deref().or(self.large.as_deref())
    }
}

/// A tracked coin or wallet address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    pub id: String,
    pub display_name: String,
    /// Ticker for coins, chain family (`EVM` / `BTC`) for addresses.
    pub symbol_or_chain: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<IconRefs>,
    /// Creation time in ms; distinguishes a re-added entity from the one it replaced.
    #[serde(default)]
    pub added_at: i64,
}

impl TrackedEntity {
    pub fn coin(
        id: impl Into<String>,
        symbol: &str,
        name: impl Into<String>,
        icon: Option<IconRefs>,
        added_at: i64
    ) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(AppError::Validation("Coin id cannot be empty".to_string()));
        }
        if symbol.trim().is_empty() {
            return Err(AppError::Validation("Coin symbol cannot be empty".to_string()));
        }

        Ok(Self {
            id: id.trim().to_string(),
            display_name: if name.trim().is_empty() {
                symbol.to_uppercase()
            } else {
                name.trim().to_string()
            },
            symbol_or_chain: symbol.trim().to_uppercase(),
            kind: EntityKind::Coin,
            icon,
            added_at,
        })
    }

    pub fn address(name: &str, address: &str, added_at: i64) -> Result<Self> {
        let name = name.trim();
        let address = address.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Wallet name cannot be empty".to_string()));
        }

        let kind = classify_address(address)?;
        let family = match kind {
            EntityKind::BtcAddress => "BTC",
            _ => "EVM",
        };

        Ok(Self {
            id: address.to_string(),
            display_name: name.to_string(),
            symbol_or_chain: family.to_string(),
            kind,
            icon: None,
            added_at,
        })
    }

    pub fn is_address(&self) -> bool {
        self.kind.is_address()
    }

    /// Shortened form used in logs and messages: `0x12345678...9abcdef0`.
    pub fn short_id(&self) -> String {
        if self.is_address() && self.id.len() > 18 {
            format!("{}...{}", &self.id[..10], &self.id[self.id.len() - 8..])
        } else {
            self.id.clone()
        }
    }
}
