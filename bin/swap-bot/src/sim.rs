//! In-process chain simulation backing the binary.
//!
//! Keeps a small ledger (native gas, token balances, allowances) and a
//! confirmed-nonce counter, prices swaps off fixed USDT-denominated
//! rates with the pool-fee haircut, and enforces the same nonce rules a
//! real node would. Lets a full session run end to end without touching
//! a network.

use async_trait::async_trait;
use common::errors::ChainError;
use common::traits::IsChainClient;
use common::types::{
    Address, Amount, CallSpec, FeeEstimate, FeeParams, Receipt, Token, TokenAddresses, TxHandle,
    WEI_PER_GWEI,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

const SUBMIT_LATENCY: Duration = Duration::from_millis(50);
const CONFIRM_LATENCY: Duration = Duration::from_millis(100);

/// Fraction of the input kept by the pool at the 0.30% fee tier.
const POOL_FEE_KEEP: Decimal = dec!(0.997);

struct Pending {
    call: CallSpec,
    nonce: u64,
    gas_limit: u64,
    gas_price: u128,
}

#[derive(Default)]
struct SimState {
    native: Amount,
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    confirmed_nonce: u64,
    pending: HashMap<TxHandle, Pending>,
    tx_counter: u64,
}

pub struct SimulatedChainClient {
    tokens: TokenAddresses,
    state: Mutex<SimState>,
}

impl SimulatedChainClient {
    /// Ledger seeded with enough of every asset for a default session.
    pub fn new(tokens: TokenAddresses) -> Self {
        let mut balances = HashMap::new();
        balances.insert(tokens.usdt.clone(), Amount(dec!(500)));
        balances.insert(tokens.eth.clone(), Amount(dec!(0.2)));
        balances.insert(tokens.btc.clone(), Amount(dec!(0.01)));
        SimulatedChainClient {
            tokens,
            state: Mutex::new(SimState {
                native: Amount(dec!(1)),
                balances,
                ..SimState::default()
            }),
        }
    }

    /// Fixed USDT-denominated price of the token at `address`.
    fn price(&self, address: &Address) -> Decimal {
        match self.token_at(address) {
            Some(Token::Usdt) => dec!(1),
            Some(Token::Eth) => dec!(2500),
            Some(Token::Btc) => dec!(60000),
            None => dec!(1),
        }
    }

    fn token_at(&self, address: &Address) -> Option<Token> {
        Token::ALL
            .into_iter()
            .find(|token| self.tokens.address(*token) == address)
    }

    fn confirm(&self, handle: &TxHandle) -> Result<Receipt, ChainError> {
        let mut state = self.state.lock().unwrap();
        let pending = state
            .pending
            .remove(handle)
            .ok_or_else(|| ChainError::Other(format!("unknown transaction {}", handle.short())))?;

        // Inclusion consumes the nonce and gas either way.
        state.confirmed_nonce = pending.nonce + 1;
        let receipt = Receipt {
            gas_used: pending.gas_limit * 7 / 10,
            effective_gas_price: pending.gas_price,
        };
        state.native = state.native.saturating_sub(receipt.fee_native());

        match pending.call {
            CallSpec::Approve {
                token,
                spender,
                amount,
            } => {
                state.allowances.insert((token, spender), amount);
            }
            CallSpec::SwapExactInputSingle {
                token_in,
                token_out,
                recipient: _,
                amount_in,
                amount_out_minimum,
                ..
            } => {
                let balance_in = state
                    .balances
                    .get(&token_in)
                    .copied()
                    .unwrap_or(Amount::ZERO);
                if balance_in < amount_in {
                    return Err(ChainError::Reverted("STF".to_string()));
                }
                // The router spends the allowance; any spender entry for
                // the input token qualifies, since the session only ever
                // approves one router.
                let granted = state
                    .allowances
                    .iter()
                    .find(|((token, _), amount)| *token == token_in && **amount >= amount_in)
                    .map(|(key, _)| key.clone());
                let Some(key) = granted else {
                    return Err(ChainError::Reverted("STF".to_string()));
                };
                let remaining = state.allowances[&key].saturating_sub(amount_in);
                state.allowances.insert(key, remaining);

                let out = amount_in.0 * self.price(&token_in) / self.price(&token_out)
                    * POOL_FEE_KEEP;
                if Amount(out) < amount_out_minimum {
                    return Err(ChainError::Reverted("Too little received".to_string()));
                }
                state.balances.insert(token_in, balance_in.saturating_sub(amount_in));
                let balance_out = state
                    .balances
                    .get(&token_out)
                    .copied()
                    .unwrap_or(Amount::ZERO);
                state.balances.insert(token_out, Amount(balance_out.0 + out));
            }
        }
        Ok(receipt)
    }
}

#[async_trait]
impl IsChainClient for SimulatedChainClient {
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
        spender: &Address,
    ) -> Result<Amount, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .allowances
            .get(&(token.clone(), spender.clone()))
            .copied()
            .unwrap_or(Amount::ZERO))
    }

    async fn pending_nonce(&self, _owner: &Address) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        Ok(state.confirmed_nonce + state.pending.len() as u64)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError> {
        Ok(FeeEstimate {
            max_fee_per_gas: Some(2 * WEI_PER_GWEI),
            max_priority_fee_per_gas: Some(WEI_PER_GWEI),
            gas_price: Some(WEI_PER_GWEI),
        })
    }

    async fn submit(
        &self,
        call: &CallSpec,
        nonce: u64,
        gas_limit: u64,
        fees: &FeeParams,
    ) -> Result<TxHandle, ChainError> {
        sleep(SUBMIT_LATENCY).await;
        let mut state = self.state.lock().unwrap();
        let expected = state.confirmed_nonce + state.pending.len() as u64;
        if nonce < expected {
            return Err(ChainError::NonceTooLow);
        }
        if nonce > expected {
            return Err(ChainError::NonceTooHigh);
        }
        state.tx_counter += 1;
        let handle = TxHandle(format!("0xsim{:060x}", state.tx_counter));
        state.pending.insert(
            handle.clone(),
            Pending {
                call: call.clone(),
                nonce,
                gas_limit,
                gas_price: fees.effective_price(),
            },
        );
        Ok(handle)
    }

    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Receipt, ChainError> {
        sleep(CONFIRM_LATENCY).await;
        self.confirm(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses() -> TokenAddresses {
        TokenAddresses {
            usdt: Address::from("0xUSDT"),
            eth: Address::from("0xETH"),
            btc: Address::from("0xBTC"),
        }
    }

    fn fees() -> FeeParams {
        FeeParams::Legacy {
            gas_price: WEI_PER_GWEI,
        }
    }

    #[tokio::test]
    async fn test_nonce_gaps_rejected() {
        let client = SimulatedChainClient::new(addresses());
        let call = CallSpec::Approve {
            token: Address::from("0xUSDT"),
            spender: Address::from("0xROUTER"),
            amount: Amount(dec!(50)),
        };
        assert_eq!(
            client.submit(&call, 5, 100_000, &fees()).await.unwrap_err(),
            ChainError::NonceTooHigh
        );
        let handle = client.submit(&call, 0, 100_000, &fees()).await.unwrap();
        client.await_confirmation(&handle).await.unwrap();
        assert_eq!(
            client.submit(&call, 0, 100_000, &fees()).await.unwrap_err(),
            ChainError::NonceTooLow
        );
    }

    #[tokio::test]
    async fn test_swap_requires_allowance() {
        let client = SimulatedChainClient::new(addresses());
        let owner = Address::from("0xME");
        let swap = CallSpec::SwapExactInputSingle {
            token_in: Address::from("0xUSDT"),
            token_out: Address::from("0xETH"),
            fee_tier: 3000,
            recipient: owner.clone(),
            deadline: u64::MAX,
            amount_in: Amount(dec!(50)),
            amount_out_minimum: Amount::ZERO,
        };
        let handle = client.submit(&swap, 0, 150_000, &fees()).await.unwrap();
        assert_eq!(
            client.await_confirmation(&handle).await.unwrap_err(),
            ChainError::Reverted("STF".to_string())
        );
    }

    #[tokio::test]
    async fn test_swap_moves_balances_at_fixed_rate() {
        let client = SimulatedChainClient::new(addresses());
        let owner = Address::from("0xME");
        let router = Address::from("0xROUTER");

        let approve = CallSpec::Approve {
            token: Address::from("0xUSDT"),
            spender: router.clone(),
            amount: Amount(dec!(50)),
        };
        let handle = client.submit(&approve, 0, 100_000, &fees()).await.unwrap();
        client.await_confirmation(&handle).await.unwrap();

        let swap = CallSpec::SwapExactInputSingle {
            token_in: Address::from("0xUSDT"),
            token_out: Address::from("0xETH"),
            fee_tier: 3000,
            recipient: owner.clone(),
            deadline: u64::MAX,
            amount_in: Amount(dec!(50)),
            amount_out_minimum: Amount::ZERO,
        };
        let handle = client.submit(&swap, 1, 150_000, &fees()).await.unwrap();
        client.await_confirmation(&handle).await.unwrap();

        assert_eq!(
            client
                .token_balance(&Address::from("0xUSDT"), &owner)
                .await
                .unwrap(),
            Amount(dec!(450))
        );
        // 50 USDT / 2500 * 0.997 on top of the seeded 0.2 ETH.
        assert_eq!(
            client
                .token_balance(&Address::from("0xETH"), &owner)
                .await
                .unwrap(),
            Amount(dec!(0.2) + dec!(0.01994))
        );
        assert_eq!(client.pending_nonce(&owner).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_confirmation_burns_native_gas() {
        let client = SimulatedChainClient::new(addresses());
        let before = client
            .native_balance(&Address::from("0xME"))
            .await
            .unwrap();
        let approve = CallSpec::Approve {
            token: Address::from("0xUSDT"),
            spender: Address::from("0xROUTER"),
            amount: Amount(dec!(1)),
        };
        let handle = client.submit(&approve, 0, 100_000, &fees()).await.unwrap();
        client.await_confirmation(&handle).await.unwrap();
        let after = client
            .native_balance(&Address::from("0xME"))
            .await
            .unwrap();
        assert!(after < before);
    }
}
