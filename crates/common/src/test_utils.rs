//! Programmable in-memory chain client for tests across the workspace.
//!
//! Scripts are consumed front-to-back: nonce fetches, submit-stage
//! errors, and confirmation outcomes each have their own queue, so a test
//! can line up exactly the chain behavior a scenario needs. Confirmed
//! calls feed back into the ledger (an approve sets the allowance, a swap
//! debits the input token and optionally sets the scripted output
//! balance), which keeps orchestrator-level tests honest about what the
//! chain would observe.

use crate::errors::ChainError;
use crate::traits::IsChainClient;
use crate::types::{
    Address, Amount, CallSpec, FeeEstimate, FeeParams, Receipt, TxHandle, WEI_PER_GWEI,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    native: Amount,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<Address, Amount>,
    nonce_script: VecDeque<u64>,
    default_nonce: u64,
    nonce_fetches: usize,
    fee_estimate: FeeEstimate,
    submit_errors: VecDeque<ChainError>,
    confirm_outcomes: VecDeque<Result<Receipt, ChainError>>,
    swap_outputs: VecDeque<Amount>,
    submissions: Vec<(CallSpec, u64)>,
    inflight: HashMap<TxHandle, CallSpec>,
    handle_counter: u64,
}

/// Scriptable [`IsChainClient`] double.
#[derive(Default)]
pub struct MockChainClient {
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_native_balance(&self, amount: Amount) {
        self.state.lock().unwrap().native = amount;
    }

    pub fn set_balance(&self, token: &Address, amount: Amount) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(token.clone(), amount);
    }

    pub fn set_allowance(&self, token: &Address, amount: Amount) {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert(token.clone(), amount);
    }

    /// Result of the next `pending_nonce` fetch; later fetches fall back
    /// to the default once the queue is drained.
    pub fn push_nonce_fetch(&self, nonce: u64) {
        self.state.lock().unwrap().nonce_script.push_back(nonce);
    }

    pub fn set_default_nonce(&self, nonce: u64) {
        self.state.lock().unwrap().default_nonce = nonce;
    }

    pub fn nonce_fetches(&self) -> usize {
        self.state.lock().unwrap().nonce_fetches
    }

    pub fn set_fee_estimate(&self, estimate: FeeEstimate) {
        self.state.lock().unwrap().fee_estimate = estimate;
    }

    /// Fails the next `submit` call before anything reaches the chain.
    pub fn push_submit_error(&self, error: ChainError) {
        self.state.lock().unwrap().submit_errors.push_back(error);
    }

    /// Outcome of the next confirmation wait. Unscripted confirmations
    /// succeed with a default receipt.
    pub fn push_confirm_outcome(&self, outcome: Result<Receipt, ChainError>) {
        self.state
            .lock()
            .unwrap()
            .confirm_outcomes
            .push_back(outcome);
    }

    /// Resulting output-token balance applied when the next swap
    /// confirms. Models the unknown, slippage-dependent output amount.
    pub fn push_swap_output(&self, balance_after: Amount) {
        self.state
            .lock()
            .unwrap()
            .swap_outputs
            .push_back(balance_after);
    }

    /// Every call handed to `submit`, in order, with the nonce it used.
    /// Includes submissions that were scripted to fail.
    pub fn submissions(&self) -> Vec<(CallSpec, u64)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submitted_nonces(&self) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .submissions
            .iter()
            .map(|(_, n)| *n)
            .collect()
    }

    fn default_receipt() -> Receipt {
        Receipt {
            gas_used: 100_000,
            effective_gas_price: WEI_PER_GWEI,
        }
    }
}

#[async_trait]
impl IsChainClient for MockChainClient {
    async fn native_balance(&self, _owner: &Address) -> Result<Amount, ChainError> {
        Ok(self.state.lock().unwrap().native)
    }

    async fn token_balance(
        &self,
        token: &Address,
        _owner: &Address,
    ) -> Result<Amount, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .balances
            .get(token)
            .copied()
            .unwrap_or(Amount::ZERO))
    }

    async fn allowance(
        &self,
        token: &Address,
        _owner: &Address,
        _spender: &Address,
    ) -> Result<Amount, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .allowances
            .get(token)
            .copied()
            .unwrap_or(Amount::ZERO))
    }

    async fn pending_nonce(&self, _owner: &Address) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.nonce_fetches += 1;
        let nonce = state
            .nonce_script
            .pop_front()
            .unwrap_or(state.default_nonce);
        Ok(nonce)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError> {
        Ok(self.state.lock().unwrap().fee_estimate)
    }

    async fn submit(
        &self,
        call: &CallSpec,
        nonce: u64,
        _gas_limit: u64,
        _fees: &FeeParams,
    ) -> Result<TxHandle, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.submissions.push((call.clone(), nonce));
        if let Some(error) = state.submit_errors.pop_front() {
            return Err(error);
        }
        state.handle_counter += 1;
        let handle = TxHandle(format!("0xmock{:032x}", state.handle_counter));
        state.inflight.insert(handle.clone(), call.clone());
        Ok(handle)
    }

    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Receipt, ChainError> {
        let mut state = self.state.lock().unwrap();
        let outcome = state
            .confirm_outcomes
            .pop_front()
            .unwrap_or(Ok(Self::default_receipt()));
        let call = state.inflight.remove(handle);
        if outcome.is_ok() {
            match call {
                Some(CallSpec::Approve { token, amount, .. }) => {
                    state.allowances.insert(token, amount);
                }
                Some(CallSpec::SwapExactInputSingle {
                    token_in,
                    token_out,
                    amount_in,
                    ..
                }) => {
                    let debited = state
                        .balances
                        .get(&token_in)
                        .copied()
                        .unwrap_or(Amount::ZERO)
                        .saturating_sub(amount_in);
                    state.balances.insert(token_in, debited);
                    if let Some(balance_after) = state.swap_outputs.pop_front() {
                        state.balances.insert(token_out, balance_after);
                    }
                }
                None => {}
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fees() -> FeeParams {
        FeeParams::Legacy {
            gas_price: 2 * WEI_PER_GWEI,
        }
    }

    #[tokio::test]
    async fn test_confirmed_approve_updates_allowance() {
        let client = MockChainClient::new();
        let token = Address::from("0xTOKEN");
        let call = CallSpec::Approve {
            token: token.clone(),
            spender: Address::from("0xROUTER"),
            amount: Amount(dec!(50)),
        };
        let handle = client.submit(&call, 0, 100_000, &fees()).await.unwrap();
        client.await_confirmation(&handle).await.unwrap();
        let allowance = client
            .allowance(&token, &Address::from("0xME"), &Address::from("0xROUTER"))
            .await
            .unwrap();
        assert_eq!(allowance, Amount(dec!(50)));
    }

    #[tokio::test]
    async fn test_confirmed_swap_moves_balances() {
        let client = MockChainClient::new();
        let usdt = Address::from("0xUSDT");
        let eth = Address::from("0xETH");
        client.set_balance(&usdt, Amount(dec!(200)));
        client.push_swap_output(Amount(dec!(0.059)));

        let call = CallSpec::SwapExactInputSingle {
            token_in: usdt.clone(),
            token_out: eth.clone(),
            fee_tier: 3000,
            recipient: Address::from("0xME"),
            deadline: 0,
            amount_in: Amount(dec!(50)),
            amount_out_minimum: Amount::ZERO,
        };
        let handle = client.submit(&call, 3, 150_000, &fees()).await.unwrap();
        client.await_confirmation(&handle).await.unwrap();

        let owner = Address::from("0xME");
        assert_eq!(
            client.token_balance(&usdt, &owner).await.unwrap(),
            Amount(dec!(150))
        );
        assert_eq!(
            client.token_balance(&eth, &owner).await.unwrap(),
            Amount(dec!(0.059))
        );
    }

    #[tokio::test]
    async fn test_scripted_nonce_fetches() {
        let client = MockChainClient::new();
        client.set_default_nonce(7);
        client.push_nonce_fetch(5);
        let owner = Address::from("0xME");
        assert_eq!(client.pending_nonce(&owner).await.unwrap(), 5);
        assert_eq!(client.pending_nonce(&owner).await.unwrap(), 7);
        assert_eq!(client.nonce_fetches(), 2);
    }

    #[tokio::test]
    async fn test_failed_confirmation_leaves_ledger_untouched() {
        let client = MockChainClient::new();
        let usdt = Address::from("0xUSDT");
        client.set_balance(&usdt, Amount(dec!(200)));
        client.push_confirm_outcome(Err(ChainError::Reverted("STF".to_string())));

        let call = CallSpec::SwapExactInputSingle {
            token_in: usdt.clone(),
            token_out: Address::from("0xETH"),
            fee_tier: 3000,
            recipient: Address::from("0xME"),
            deadline: 0,
            amount_in: Amount(dec!(50)),
            amount_out_minimum: Amount::ZERO,
        };
        let handle = client.submit(&call, 0, 150_000, &fees()).await.unwrap();
        assert!(client.await_confirmation(&handle).await.is_err());
        assert_eq!(
            client
                .token_balance(&usdt, &Address::from("0xME"))
                .await
                .unwrap(),
            Amount(dec!(200))
        );
    }
}
