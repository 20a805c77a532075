use crate::errors::CommonError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A token amount in human units. Decimal scaling to on-chain base units
/// is the chain client's concern.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// `max(0, self - other)`. Used for every "surplus over a floor"
    /// computation so a reserve can never go negative.
    pub fn saturating_sub(self, other: Amount) -> Amount {
        if self.0 > other.0 {
            Amount(self.0 - other.0)
        } else {
            Amount::ZERO
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed set of swappable assets. The native gas asset is tracked
/// separately and is never swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Token {
    Usdt,
    Eth,
    Btc,
}

impl Token {
    /// All swappable tokens, in replenishment priority order.
    pub const ALL: [Token; 3] = [Token::Usdt, Token::Eth, Token::Btc];

    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Usdt => "USDT",
            Token::Eth => "ETH",
            Token::Btc => "BTC",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Token {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usdt" => Ok(Token::Usdt),
            "eth" => Ok(Token::Eth),
            "btc" => Ok(Token::Btc),
            other => Err(CommonError::UnknownToken(other.to_string())),
        }
    }
}

/// An ordered (input, output) pair identifying one single-hop exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapDirection {
    UsdtToEth,
    EthToUsdt,
    UsdtToBtc,
    BtcToUsdt,
    BtcToEth,
    EthToBtc,
}

impl SwapDirection {
    pub fn token_in(&self) -> Token {
        match self {
            SwapDirection::UsdtToEth | SwapDirection::UsdtToBtc => Token::Usdt,
            SwapDirection::EthToUsdt | SwapDirection::EthToBtc => Token::Eth,
            SwapDirection::BtcToUsdt | SwapDirection::BtcToEth => Token::Btc,
        }
    }

    pub fn token_out(&self) -> Token {
        match self {
            SwapDirection::EthToUsdt | SwapDirection::BtcToUsdt => Token::Usdt,
            SwapDirection::UsdtToEth | SwapDirection::BtcToEth => Token::Eth,
            SwapDirection::UsdtToBtc | SwapDirection::EthToBtc => Token::Btc,
        }
    }

    /// The direction for a given ordered token pair. Same-token pairs do
    /// not exist on the router and are rejected.
    pub fn between(input: Token, output: Token) -> Result<Self, CommonError> {
        match (input, output) {
            (Token::Usdt, Token::Eth) => Ok(SwapDirection::UsdtToEth),
            (Token::Eth, Token::Usdt) => Ok(SwapDirection::EthToUsdt),
            (Token::Usdt, Token::Btc) => Ok(SwapDirection::UsdtToBtc),
            (Token::Btc, Token::Usdt) => Ok(SwapDirection::BtcToUsdt),
            (Token::Btc, Token::Eth) => Ok(SwapDirection::BtcToEth),
            (Token::Eth, Token::Btc) => Ok(SwapDirection::EthToBtc),
            (a, b) => Err(CommonError::UnknownDirection(format!("{}->{}", a, b))),
        }
    }

    pub fn invert(&self) -> SwapDirection {
        match self {
            SwapDirection::UsdtToEth => SwapDirection::EthToUsdt,
            SwapDirection::EthToUsdt => SwapDirection::UsdtToEth,
            SwapDirection::UsdtToBtc => SwapDirection::BtcToUsdt,
            SwapDirection::BtcToUsdt => SwapDirection::UsdtToBtc,
            SwapDirection::BtcToEth => SwapDirection::EthToBtc,
            SwapDirection::EthToBtc => SwapDirection::BtcToEth,
        }
    }
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.token_in(), self.token_out())
    }
}

impl FromStr for SwapDirection {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usdtToEth" => Ok(SwapDirection::UsdtToEth),
            "ethToUsdt" => Ok(SwapDirection::EthToUsdt),
            "usdtToBtc" => Ok(SwapDirection::UsdtToBtc),
            "btcToUsdt" => Ok(SwapDirection::BtcToUsdt),
            "btcToEth" => Ok(SwapDirection::BtcToEth),
            "ethToBtc" => Ok(SwapDirection::EthToBtc),
            other => Err(CommonError::UnknownDirection(other.to_string())),
        }
    }
}

/// An on-chain address, carried as an opaque string. A wrong address
/// surfaces as on-chain failures, not as a config-time error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Contract addresses for the swappable token set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAddresses {
    pub usdt: Address,
    pub eth: Address,
    pub btc: Address,
}

impl TokenAddresses {
    pub fn address(&self, token: Token) -> &Address {
        match token {
            Token::Usdt => &self.usdt,
            Token::Eth => &self.eth,
            Token::Btc => &self.btc,
        }
    }
}

/// Per-asset floor balances that rebalancing must never swap below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinReserves {
    pub usdt: Amount,
    pub eth: Amount,
    pub btc: Amount,
}

impl MinReserves {
    pub fn floor(&self, token: Token) -> Amount {
        match token {
            Token::Usdt => self.usdt,
            Token::Eth => self.eth,
            Token::Btc => self.btc,
        }
    }
}

pub const WEI_PER_GWEI: u128 = 1_000_000_000;
pub const WEI_PER_NATIVE: u128 = 1_000_000_000_000_000_000;

/// Renders a wei-denominated per-unit price in gwei for logs.
pub fn format_gwei(wei: u128) -> String {
    let gwei = decimal_from_u128(wei) / decimal_from_u128(WEI_PER_GWEI);
    format!("{} gwei", gwei.normalize())
}

/// Lossless for anything a fee or gas computation can produce; saturates
/// past the 96-bit mantissa.
fn decimal_from_u128(value: u128) -> Decimal {
    Decimal::try_from(value).unwrap_or(Decimal::MAX)
}

/// Raw fee information as reported by the chain. Any field may be absent
/// depending on what the network supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeEstimate {
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub gas_price: Option<u128>,
}

/// Fee parameters chosen once per session and attached to every
/// transaction, in wei per unit of gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeParams {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

impl FeeParams {
    /// The price used for fee accounting when the receipt does not carry
    /// an effective price of its own.
    pub fn effective_price(&self) -> u128 {
        match self {
            FeeParams::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
            FeeParams::Legacy { gas_price } => *gas_price,
        }
    }
}

impl fmt::Display for FeeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => write!(
                f,
                "EIP-1559 maxFee={} prioFee={}",
                format_gwei(*max_fee_per_gas),
                format_gwei(*max_priority_fee_per_gas)
            ),
            FeeParams::Legacy { gas_price } => {
                write!(f, "legacy gasPrice={}", format_gwei(*gas_price))
            }
        }
    }
}

/// A structured contract call. The chain client owns ABI encoding; the
/// core only decides what to call with which arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CallSpec {
    /// ERC-20 `approve(spender, amount)` for exactly `amount`.
    Approve {
        token: Address,
        spender: Address,
        amount: Amount,
    },
    /// Router `exactInputSingle` with an exact input amount.
    SwapExactInputSingle {
        token_in: Address,
        token_out: Address,
        fee_tier: u32,
        recipient: Address,
        deadline: u64,
        amount_in: Amount,
        amount_out_minimum: Amount,
    },
}

/// Opaque handle to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHandle(pub String);

impl TxHandle {
    /// Abbreviated hash for log lines, e.g. `0x1234...abcd`.
    pub fn short(&self) -> String {
        let h = &self.0;
        if h.len() > 10 {
            format!("{}...{}", &h[..6], &h[h.len() - 4..])
        } else {
            h.clone()
        }
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Confirmation data for an included transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

impl Receipt {
    /// Realized fee in the native gas asset. Reporting only, never used
    /// in control flow.
    pub fn fee_native(&self) -> Amount {
        let wei = decimal_from_u128(self.gas_used as u128 * self.effective_gas_price);
        Amount(wei / decimal_from_u128(WEI_PER_NATIVE))
    }
}

/// Point-in-time wallet balances. Never cached: re-fetched before every
/// decision that depends on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceSnapshot {
    pub native: Amount,
    pub usdt: Amount,
    pub eth: Amount,
    pub btc: Amount,
}

impl BalanceSnapshot {
    pub fn of(&self, token: Token) -> Amount {
        match token {
            Token::Usdt => self.usdt,
            Token::Eth => self.eth,
            Token::Btc => self.btc,
        }
    }
}

impl fmt::Display for BalanceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "native: {} | USDT: {} | ETH: {} | BTC: {}",
            self.native, self.usdt, self.eth, self.btc
        )
    }
}

/// Success/failure tally for a pair sequence, summed into session totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleTally {
    pub successes: u32,
    pub failures: u32,
}

impl CycleTally {
    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn merge(&mut self, other: CycleTally) {
        self.successes += other.successes;
        self.failures += other.failures;
    }
}

impl fmt::Display for CycleTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.successes, self.failures)
    }
}
