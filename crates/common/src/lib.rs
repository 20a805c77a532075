//! # Swap Bot Common Crate
//!
//! Shared data types, error definitions, and trait seams used across the
//! `swap-bot` workspace.

/// Module for error types.
pub mod errors;

/// Module for shared trait seams.
pub mod traits;

/// Module for common data structures and types.
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-export key items for easier access.
pub use errors::{ChainError, CommonError};
pub use types::{
    Address, Amount, BalanceSnapshot, CallSpec, CycleTally, FeeEstimate, FeeParams, MinReserves,
    Receipt, SwapDirection, Token, TokenAddresses, TxHandle,
};
