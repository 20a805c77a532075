//! One full session: snapshot, fee pricing, pair sequences, drain,
//! summary.

use crate::cycle::{CycleOrchestrator, Pacing, PairCycleConfig};
use anyhow::{bail, Context, Result};
use common::errors::ChainError;
use common::traits::{IsChainClient, IsNotifier};
use common::types::{
    Address, Amount, BalanceSnapshot, CycleTally, MinReserves, SwapDirection, Token,
    TokenAddresses,
};
use config::BotConfig;
use executor::fees::compute_fee_params;
use executor::TxExecutor;
use sequencer::Sequencer;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Owns the lifecycle of a single run. Individual cycle failures are
/// tallied and reported; only conditions that make every further
/// transaction pointless (no balances readable, no fee pricing, gas
/// below the floor) abort the session.
pub struct SessionDriver {
    config: BotConfig,
    client: Arc<dyn IsChainClient>,
    notifier: Arc<dyn IsNotifier>,
    pacing: Pacing,
}

impl SessionDriver {
    pub fn new(
        config: BotConfig,
        client: Arc<dyn IsChainClient>,
        notifier: Arc<dyn IsNotifier>,
    ) -> Self {
        let pacing = pacing_from_config(&config);
        SessionDriver {
            config,
            client,
            notifier,
            pacing,
        }
    }

    /// Replaces the pacing wholesale. Tests use this to run instantly.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn run(self) -> Result<()> {
        let wallet = Address(self.config.wallet_address.clone());
        let router = Address(self.config.router_address.clone());
        let tokens = TokenAddresses {
            usdt: Address(self.config.tokens.usdt.clone()),
            eth: Address(self.config.tokens.eth.clone()),
            btc: Address(self.config.tokens.btc.clone()),
        };
        let reserves = MinReserves {
            usdt: Amount(self.config.min_reserves.usdt),
            eth: Amount(self.config.min_reserves.eth),
            btc: Amount(self.config.min_reserves.btc),
        };
        let pair_configs = self.pair_configs()?;

        log::info!("starting swap session on {}", self.config.network_name);
        let before = self
            .snapshot(&wallet, &tokens)
            .await
            .context("initial balance snapshot failed")?;
        log::info!("wallet {} | {}", wallet, before);

        let min_native = Amount(self.config.min_native_reserve);
        if before.native < min_native {
            bail!(
                "native gas balance {} below required minimum {}",
                before.native,
                min_native
            );
        }

        let fees = compute_fee_params(
            self.client.as_ref(),
            self.config.fallback_gas_price_wei(),
        )
        .await?;

        let (sequencer, worker) = Sequencer::new(Arc::clone(&self.client), wallet.clone());
        let worker = worker.spawn();
        let executor = Arc::new(TxExecutor::new(
            Arc::clone(&self.client),
            sequencer.clone(),
            wallet.clone(),
            router.clone(),
            tokens.clone(),
            fees,
            Amount(self.config.min_amount_out),
        ));
        let orchestrator = CycleOrchestrator::new(
            Arc::clone(&self.client),
            executor,
            sequencer.clone(),
            wallet.clone(),
            router,
            tokens.clone(),
            reserves,
            self.pacing.clone(),
        );

        let mut totals = CycleTally::default();
        let mut pair_lines = Vec::new();
        let pair_count = pair_configs.len();
        for (idx, pair) in pair_configs.iter().enumerate() {
            let input = pair.forward.token_in();
            if !orchestrator.replenish(input).await {
                log::warn!(
                    "[{}] proceeding with {} below its reserve floor",
                    pair.pair_name,
                    input
                );
            }
            let tally = orchestrator.run_pair(pair).await;
            pair_lines.push(format!("{}: {}", pair.pair_name, tally));
            totals.merge(tally);
            if idx + 1 < pair_count && !self.pacing.pair_pause.is_zero() {
                sleep(self.pacing.pair_pause).await;
            }
        }

        self.drain(&sequencer, &wallet).await;

        // Release every queue sender so the worker can exit.
        drop(orchestrator);
        drop(sequencer);
        if worker.await.is_err() {
            log::error!("sequencer worker panicked");
        }

        let after = match self.snapshot(&wallet, &tokens).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::warn!("final balance snapshot failed: {}", e);
                None
            }
        };

        let summary = build_summary(
            &self.config.network_name,
            &pair_lines,
            totals,
            &before,
            after.as_ref(),
        );
        if let Err(e) = self.notifier.notify(&summary).await {
            log::warn!("summary notification failed: {}", e);
        }
        log::info!("session complete: {}", totals);
        Ok(())
    }

    fn pair_configs(&self) -> Result<Vec<PairCycleConfig>> {
        self.config
            .pairs
            .iter()
            .map(|pair| {
                let forward: SwapDirection = pair
                    .forward
                    .parse()
                    .with_context(|| format!("pair '{}'", pair.name))?;
                let amount = match forward.token_in() {
                    Token::Usdt => self.config.swap_amounts.usdt,
                    Token::Eth => self.config.swap_amounts.eth,
                    Token::Btc => self.config.swap_amounts.btc,
                };
                Ok(PairCycleConfig {
                    pair_name: pair.name.clone(),
                    forward,
                    forward_amount: Amount(amount),
                    cycles: self.config.swaps_per_pair,
                })
            })
            .collect()
    }

    async fn snapshot(
        &self,
        wallet: &Address,
        tokens: &TokenAddresses,
    ) -> Result<BalanceSnapshot, ChainError> {
        Ok(BalanceSnapshot {
            native: self.client.native_balance(wallet).await?,
            usdt: self.client.token_balance(&tokens.usdt, wallet).await?,
            eth: self.client.token_balance(&tokens.eth, wallet).await?,
            btc: self.client.token_balance(&tokens.btc, wallet).await?,
        })
    }

    /// Polls the chain until it has caught up with the locally tracked
    /// nonce, so the final snapshot reflects every submitted transaction.
    /// A poll failure downgrades the drain to best effort.
    async fn drain(&self, sequencer: &Sequencer, wallet: &Address) {
        let Some(target) = sequencer.tracked_nonce().await else {
            log::info!("no locally tracked nonce, nothing to drain");
            return;
        };
        log::info!("waiting for the chain to reach nonce {}", target);
        loop {
            match self.client.pending_nonce(wallet).await {
                Ok(pending) if pending >= target => {
                    log::info!("all submitted transactions accounted for");
                    break;
                }
                Ok(pending) => {
                    log::info!("chain at nonce {}, local at {}, waiting", pending, target);
                }
                Err(e) => {
                    log::warn!("drain poll failed, giving up on the drain: {}", e);
                    break;
                }
            }
            if self.pacing.drain_poll.is_zero() {
                tokio::task::yield_now().await;
            } else {
                sleep(self.pacing.drain_poll).await;
            }
        }
    }
}

fn pacing_from_config(config: &BotConfig) -> Pacing {
    let mut pacing = Pacing::default();
    if let Some(overrides) = &config.pacing {
        if let Some(ms) = overrides.approve_settle_ms {
            pacing.approve_settle = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.swap_settle_ms {
            pacing.swap_settle = Duration::from_millis(ms);
        }
        if let Some(min) = overrides.cycle_pause_min_secs {
            pacing.cycle_pause_secs.0 = min;
        }
        if let Some(max) = overrides.cycle_pause_max_secs {
            pacing.cycle_pause_secs.1 = max;
        }
        if let Some(secs) = overrides.pair_pause_secs {
            pacing.pair_pause = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.drain_poll_secs {
            pacing.drain_poll = Duration::from_secs(secs);
        }
    }
    pacing
}

fn build_summary(
    network: &str,
    pair_lines: &[String],
    totals: CycleTally,
    before: &BalanceSnapshot,
    after: Option<&BalanceSnapshot>,
) -> String {
    let mut lines = vec![format!("*Swap session complete* on {}", network), String::new()];
    for line in pair_lines {
        lines.push(line.clone());
    }
    lines.push(format!("Total: {}", totals));
    lines.push(String::new());
    lines.push(format!("Balances before: {}", before));
    match after {
        Some(after) => lines.push(format!("Balances after: {}", after)),
        None => lines.push("Balances after: unavailable".to_string()),
    }
    lines.join("\n")
}
