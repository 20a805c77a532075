//! Shared trait seams between the core and its external collaborators.

use crate::errors::ChainError;
use crate::types::{Address, Amount, CallSpec, FeeEstimate, FeeParams, Receipt, TxHandle};
use anyhow::Result;
use async_trait::async_trait;

/// The chain-client boundary. Everything the core needs from the network,
/// nothing more; implementations own signing, ABI encoding, and decimal
/// scaling.
#[async_trait]
pub trait IsChainClient: Send + Sync {
    /// Native gas-asset balance of `owner`.
    async fn native_balance(&self, owner: &Address) -> Result<Amount, ChainError>;

    /// ERC-20 balance of `owner` for `token`.
    async fn token_balance(&self, token: &Address, owner: &Address)
        -> Result<Amount, ChainError>;

    /// Remaining allowance granted by `owner` to `spender` on `token`.
    async fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<Amount, ChainError>;

    /// Pending-inclusive transaction count, i.e. the next usable nonce.
    async fn pending_nonce(&self, owner: &Address) -> Result<u64, ChainError>;

    /// Current fee information; fields may be absent.
    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError>;

    /// Signs and broadcasts `call` with an explicit nonce and the session
    /// fee parameters.
    async fn submit(
        &self,
        call: &CallSpec,
        nonce: u64,
        gas_limit: u64,
        fees: &FeeParams,
    ) -> Result<TxHandle, ChainError>;

    /// Waits for the transaction to be included, successfully or not.
    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Receipt, ChainError>;
}

/// Best-effort delivery of plain-text session summaries. Callers log and
/// swallow failures; delivery problems never fail a session.
#[async_trait]
pub trait IsNotifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}
