//! Single-transaction executors: approve and swap.
//!
//! Each executor is one unit of work submitted through the sequencer. It
//! performs its own submit-plus-confirmation against the chain client and
//! reports the outcome as a bool; nothing escapes its boundary as an
//! error, and nothing here retries.

pub mod fees;

use common::errors::ChainError;
use common::traits::IsChainClient;
use common::types::{
    Address, Amount, CallSpec, FeeParams, Receipt, SwapDirection, Token, TokenAddresses,
};
use sequencer::Sequencer;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const APPROVAL_GAS_LIMIT: u64 = 100_000;
pub const SWAP_GAS_LIMIT: u64 = 150_000;

/// Router fee tier: 0.30%.
const SWAP_FEE_TIER: u32 = 3000;

/// Swaps expire if not included within this window.
const SWAP_DEADLINE_SECS: u64 = 120;

/// Builds and submits approve/swap transactions for one wallet against
/// one router, with the session's fee parameters.
pub struct TxExecutor {
    client: Arc<dyn IsChainClient>,
    sequencer: Sequencer,
    wallet: Address,
    router: Address,
    tokens: TokenAddresses,
    fees: FeeParams,
    /// Floor on the swap output. Zero disables slippage protection, which
    /// matches the original deployment; raise it via config.
    min_amount_out: Amount,
}

impl TxExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn IsChainClient>,
        sequencer: Sequencer,
        wallet: Address,
        router: Address,
        tokens: TokenAddresses,
        fees: FeeParams,
        min_amount_out: Amount,
    ) -> Self {
        TxExecutor {
            client,
            sequencer,
            wallet,
            router,
            tokens,
            fees,
            min_amount_out,
        }
    }

    /// Grants the router an allowance of exactly `amount` (never
    /// unlimited). True only on confirmed inclusion.
    pub async fn approve(&self, token: Token, amount: Amount, nonce: u64) -> bool {
        let call = CallSpec::Approve {
            token: self.tokens.address(token).clone(),
            spender: self.router.clone(),
            amount,
        };
        match self.send_and_confirm(&call, APPROVAL_GAS_LIMIT, nonce).await {
            Ok(_) => {
                log::info!("approval of {} {} confirmed (nonce {})", amount, token, nonce);
                true
            }
            Err(e) => {
                log::error!(
                    "approval of {} {} failed (nonce {}): {}",
                    amount,
                    token,
                    nonce,
                    e
                );
                false
            }
        }
    }

    /// Exact-input single-hop swap of `amount_in` along `direction`.
    /// True only on confirmed inclusion. A classified nonce error
    /// additionally invalidates the sequencer's cached nonce, on top of
    /// the sequencer's own blanket reset on failure.
    pub async fn swap(&self, direction: SwapDirection, amount_in: Amount, nonce: u64) -> bool {
        log::info!(
            "starting swap {} ({} {})",
            direction,
            amount_in,
            direction.token_in()
        );
        let call = CallSpec::SwapExactInputSingle {
            token_in: self.tokens.address(direction.token_in()).clone(),
            token_out: self.tokens.address(direction.token_out()).clone(),
            fee_tier: SWAP_FEE_TIER,
            recipient: self.wallet.clone(),
            deadline: unix_now() + SWAP_DEADLINE_SECS,
            amount_in,
            amount_out_minimum: self.min_amount_out,
        };
        match self.send_and_confirm(&call, SWAP_GAS_LIMIT, nonce).await {
            Ok(receipt) => {
                log::info!(
                    "swap {} confirmed (nonce {}) | fee: {} native",
                    direction,
                    nonce,
                    receipt.fee_native()
                );
                true
            }
            Err(e) => {
                log::error!("swap {} failed (nonce {}): {}", direction, nonce, e);
                if e.is_nonce_error() {
                    log::warn!("nonce desync detected, forcing a refetch");
                    self.sequencer.invalidate_nonce().await;
                }
                false
            }
        }
    }

    async fn send_and_confirm(
        &self,
        call: &CallSpec,
        gas_limit: u64,
        nonce: u64,
    ) -> Result<Receipt, ChainError> {
        let handle = self.client.submit(call, nonce, gas_limit, &self.fees).await?;
        log::info!("tx submitted: {} (nonce {})", handle.short(), nonce);
        self.client.await_confirmation(&handle).await
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::MockChainClient;
    use common::types::WEI_PER_GWEI;
    use rust_decimal_macros::dec;

    fn addresses() -> TokenAddresses {
        TokenAddresses {
            usdt: Address::from("0xUSDT"),
            eth: Address::from("0xETH"),
            btc: Address::from("0xBTC"),
        }
    }

    fn session_fees() -> FeeParams {
        FeeParams::Legacy {
            gas_price: 2 * WEI_PER_GWEI,
        }
    }

    fn setup() -> (Arc<MockChainClient>, Sequencer, TxExecutor) {
        let client = Arc::new(MockChainClient::new());
        let (sequencer, worker) = Sequencer::new(
            Arc::clone(&client) as Arc<dyn IsChainClient>,
            Address::from("0xWALLET"),
        );
        worker.spawn();
        let executor = TxExecutor::new(
            Arc::clone(&client) as Arc<dyn IsChainClient>,
            sequencer.clone(),
            Address::from("0xWALLET"),
            Address::from("0xROUTER"),
            addresses(),
            session_fees(),
            Amount::ZERO,
        );
        (client, sequencer, executor)
    }

    #[tokio::test]
    async fn test_approve_builds_exact_amount_call() {
        let (client, _sequencer, executor) = setup();
        assert!(executor.approve(Token::Usdt, Amount(dec!(50)), 3).await);

        let submissions = client.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(
            submissions[0],
            (
                CallSpec::Approve {
                    token: Address::from("0xUSDT"),
                    spender: Address::from("0xROUTER"),
                    amount: Amount(dec!(50)),
                },
                3
            )
        );
    }

    #[tokio::test]
    async fn test_approve_false_on_revert() {
        let (client, _sequencer, executor) = setup();
        client.push_confirm_outcome(Err(ChainError::Reverted("denied".to_string())));
        assert!(!executor.approve(Token::Eth, Amount(dec!(1)), 0).await);
    }

    #[tokio::test]
    async fn test_swap_call_shape() {
        let (client, _sequencer, executor) = setup();
        assert!(
            executor
                .swap(SwapDirection::UsdtToEth, Amount(dec!(100)), 9)
                .await
        );

        let (call, nonce) = client.submissions().remove(0);
        assert_eq!(nonce, 9);
        match call {
            CallSpec::SwapExactInputSingle {
                token_in,
                token_out,
                fee_tier,
                recipient,
                deadline,
                amount_in,
                amount_out_minimum,
            } => {
                assert_eq!(token_in, Address::from("0xUSDT"));
                assert_eq!(token_out, Address::from("0xETH"));
                assert_eq!(fee_tier, 3000);
                assert_eq!(recipient, Address::from("0xWALLET"));
                assert!(deadline >= unix_now() && deadline <= unix_now() + SWAP_DEADLINE_SECS);
                assert_eq!(amount_in, Amount(dec!(100)));
                assert_eq!(amount_out_minimum, Amount::ZERO);
            }
            other => panic!("expected a swap call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_swap_failure_is_contained() {
        let (client, _sequencer, executor) = setup();
        client.push_submit_error(ChainError::Timeout);
        assert!(
            !executor
                .swap(SwapDirection::BtcToEth, Amount(dec!(0.003)), 0)
                .await
        );
    }

    #[tokio::test]
    async fn test_nonce_error_invalidates_sequencer_nonce() {
        let (client, sequencer, executor) = setup();
        client.push_nonce_fetch(5);

        // Prime the cached nonce via a successful no-op task.
        assert!(sequencer.submit("prime", |_| async { true }).await);
        assert_eq!(sequencer.tracked_nonce().await, Some(6));

        // A direct swap call (outside the queue) hitting a nonce error
        // must signal the sequencer on its own.
        client.push_submit_error(ChainError::NonceTooLow);
        assert!(
            !executor
                .swap(SwapDirection::EthToUsdt, Amount(dec!(0.01)), 6)
                .await
        );
        assert_eq!(sequencer.tracked_nonce().await, None);
    }

    #[tokio::test]
    async fn test_non_nonce_failure_leaves_cache_alone() {
        let (client, sequencer, executor) = setup();
        client.push_nonce_fetch(5);
        assert!(sequencer.submit("prime", |_| async { true }).await);

        client.push_confirm_outcome(Err(ChainError::Reverted("STF".to_string())));
        assert!(
            !executor
                .swap(SwapDirection::EthToUsdt, Amount(dec!(0.01)), 6)
                .await
        );
        // Direct call: only the sequencer's own failure edge resets the
        // cache, and this swap did not go through the queue.
        assert_eq!(sequencer.tracked_nonce().await, Some(6));
    }
}
