//! YAML-backed session configuration.
//!
//! Decimal amounts are written as quoted strings so they survive the
//! round trip without binary-float drift.

use common::types::SwapDirection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Gas price unit conversion for the fallback knob.
const WEI_PER_GWEI: u128 = 1_000_000_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// One rebalancing pair. Directions are spelled like `usdtToEth`; the
/// reverse must be the exact inverse of the forward leg.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairConfig {
    pub name: String,
    pub forward: String,
    pub reverse: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenAddressConfig {
    pub usdt: String,
    pub eth: String,
    pub btc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerTokenAmounts {
    pub usdt: Decimal,
    pub eth: Decimal,
    pub btc: Decimal,
}

/// Delay overrides, all optional. Omitted fields keep the built-in
/// production pacing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PacingConfig {
    pub approve_settle_ms: Option<u64>,
    pub swap_settle_ms: Option<u64>,
    pub cycle_pause_min_secs: Option<u64>,
    pub cycle_pause_max_secs: Option<u64>,
    pub pair_pause_secs: Option<u64>,
    pub drain_poll_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    pub network_name: String,
    pub wallet_address: String,
    pub router_address: String,
    pub tokens: TokenAddressConfig,
    /// Session refuses to start below this native balance.
    pub min_native_reserve: Decimal,
    /// Per-token floors never spent by return or replenishment legs.
    pub min_reserves: PerTokenAmounts,
    /// Fixed forward-leg amounts, keyed by the input token.
    pub swap_amounts: PerTokenAmounts,
    pub swaps_per_pair: u32,
    /// Legacy gas price, in gwei, used when the chain reports no fee data.
    pub fallback_gas_price_gwei: Option<u64>,
    /// Swap output floor. Zero disables slippage protection.
    #[serde(default)]
    pub min_amount_out: Decimal,
    pub pairs: Vec<PairConfig>,
    #[serde(default)]
    pub pacing: Option<PacingConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl BotConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: BotConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let require = |value: &str, field: &str| {
            if value.trim().is_empty() {
                Err(ConfigError::ValidationError(format!(
                    "{} must not be empty",
                    field
                )))
            } else {
                Ok(())
            }
        };
        require(&self.wallet_address, "wallet_address")?;
        require(&self.router_address, "router_address")?;
        require(&self.tokens.usdt, "tokens.usdt")?;
        require(&self.tokens.eth, "tokens.eth")?;
        require(&self.tokens.btc, "tokens.btc")?;

        if self.swaps_per_pair == 0 {
            return Err(ConfigError::ValidationError(
                "swaps_per_pair must be at least 1".to_string(),
            ));
        }
        if self.pairs.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one pair must be configured".to_string(),
            ));
        }
        if self.min_amount_out < Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "min_amount_out must not be negative".to_string(),
            ));
        }
        for (label, amount) in [
            ("swap_amounts.usdt", self.swap_amounts.usdt),
            ("swap_amounts.eth", self.swap_amounts.eth),
            ("swap_amounts.btc", self.swap_amounts.btc),
        ] {
            if amount <= Decimal::ZERO {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be positive",
                    label
                )));
            }
        }
        for (label, floor) in [
            ("min_reserves.usdt", self.min_reserves.usdt),
            ("min_reserves.eth", self.min_reserves.eth),
            ("min_reserves.btc", self.min_reserves.btc),
        ] {
            if floor < Decimal::ZERO {
                return Err(ConfigError::ValidationError(format!(
                    "{} must not be negative",
                    label
                )));
            }
        }

        if let Some(pacing) = &self.pacing {
            if let (Some(min), Some(max)) =
                (pacing.cycle_pause_min_secs, pacing.cycle_pause_max_secs)
            {
                if min > max {
                    return Err(ConfigError::ValidationError(format!(
                        "cycle_pause_min_secs {} exceeds cycle_pause_max_secs {}",
                        min, max
                    )));
                }
            }
        }

        for pair in &self.pairs {
            require(&pair.name, "pairs[].name")?;
            let forward: SwapDirection = pair.forward.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "pair '{}': unknown forward direction '{}'",
                    pair.name, pair.forward
                ))
            })?;
            let reverse: SwapDirection = pair.reverse.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "pair '{}': unknown reverse direction '{}'",
                    pair.name, pair.reverse
                ))
            })?;
            if reverse != forward.invert() {
                return Err(ConfigError::ValidationError(format!(
                    "pair '{}': reverse '{}' is not the inverse of forward '{}'",
                    pair.name, pair.reverse, pair.forward
                )));
            }
        }
        Ok(())
    }

    /// Fallback legacy gas price converted to wei.
    pub fn fallback_gas_price_wei(&self) -> Option<u128> {
        self.fallback_gas_price_gwei
            .map(|gwei| u128::from(gwei) * WEI_PER_GWEI)
    }
}
