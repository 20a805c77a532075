//! Balance-aware pair rebalancing cycles.
//!
//! One cycle swaps a fixed amount of asset A into asset B, observes the
//! resulting B balance, and swaps the surplus over B's reserve floor back
//! into A. The return amount is computed from a fresh balance read, which
//! turns the unknown, slippage-dependent forward output into a safe,
//! reserve-respecting input for the return leg without needing a quote.

use common::traits::IsChainClient;
use common::types::{Address, Amount, CycleTally, MinReserves, SwapDirection, Token, TokenAddresses};
use executor::TxExecutor;
use rand::Rng;
use sequencer::Sequencer;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Delay knobs. Sleeps stand in for state-propagation confirmation; tests
/// zero them out.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Settle window after a confirmed approval before the swap.
    pub approve_settle: Duration,
    /// Settle window after a confirmed swap before the balance read.
    pub swap_settle: Duration,
    /// Randomized pause between cycles, inclusive bounds in seconds.
    pub cycle_pause_secs: (u64, u64),
    /// Pause between pair sequences.
    pub pair_pause: Duration,
    /// Poll interval for the end-of-session drain.
    pub drain_poll: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            approve_settle: Duration::from_secs(3),
            swap_settle: Duration::from_secs(3),
            cycle_pause_secs: (5, 10),
            pair_pause: Duration::from_secs(10),
            drain_poll: Duration::from_secs(15),
        }
    }
}

impl Pacing {
    /// All delays zeroed; tests only.
    pub fn instant() -> Self {
        Pacing {
            approve_settle: Duration::ZERO,
            swap_settle: Duration::ZERO,
            cycle_pause_secs: (0, 0),
            pair_pause: Duration::ZERO,
            drain_poll: Duration::ZERO,
        }
    }
}

/// Parameters for one pair sequence. The return leg always runs the
/// inverted direction with a dynamically computed amount.
#[derive(Debug, Clone)]
pub struct PairCycleConfig {
    pub pair_name: String,
    pub forward: SwapDirection,
    pub forward_amount: Amount,
    pub cycles: u32,
}

impl PairCycleConfig {
    pub fn reverse(&self) -> SwapDirection {
        self.forward.invert()
    }
}

/// Drives rebalancing cycles and pre-flight replenishment for one wallet.
pub struct CycleOrchestrator {
    client: Arc<dyn IsChainClient>,
    executor: Arc<TxExecutor>,
    sequencer: Sequencer,
    wallet: Address,
    router: Address,
    tokens: TokenAddresses,
    reserves: MinReserves,
    pacing: Pacing,
}

/// The return-leg amount for an observed balance and a reserve floor.
/// Never drains the floor even though the forward output is unknown.
pub fn surplus_over_floor(balance: Amount, floor: Amount) -> Amount {
    balance.saturating_sub(floor)
}

/// Pause duration drawn from the inclusive bounds. Config-supplied
/// bounds may be inverted; a lower bound at or above the upper bound
/// acts as a fixed pause instead of an empty range.
fn bounded_pause_secs(min: u64, max: u64) -> u64 {
    if min >= max {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    }
}

impl CycleOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn IsChainClient>,
        executor: Arc<TxExecutor>,
        sequencer: Sequencer,
        wallet: Address,
        router: Address,
        tokens: TokenAddresses,
        reserves: MinReserves,
        pacing: Pacing,
    ) -> Self {
        CycleOrchestrator {
            client,
            executor,
            sequencer,
            wallet,
            router,
            tokens,
            reserves,
            pacing,
        }
    }

    /// Runs the configured number of cycles for one pair and returns the
    /// tally. Failures are counted, never propagated.
    pub async fn run_pair(&self, cfg: &PairCycleConfig) -> CycleTally {
        log::info!(
            "--- starting {} rebalancing ({} cycles) ---",
            cfg.pair_name,
            cfg.cycles
        );
        let mut tally = CycleTally::default();
        for cycle in 1..=cfg.cycles {
            log::info!("[{}] cycle {}/{}", cfg.pair_name, cycle, cfg.cycles);
            self.run_cycle(cfg, &mut tally).await;
            if cycle < cfg.cycles {
                self.cycle_pause().await;
            }
        }
        log::info!("[{}] sequence finished: {}", cfg.pair_name, tally);
        tally
    }

    async fn run_cycle(&self, cfg: &PairCycleConfig, tally: &mut CycleTally) {
        let token_a = cfg.forward.token_in();
        let token_b = cfg.forward.token_out();

        let balance_a = match self.balance(token_a).await {
            Some(balance) => balance,
            None => {
                tally.record_failure();
                return;
            }
        };
        if balance_a < cfg.forward_amount {
            log::warn!(
                "[{}] {} balance {} below swap amount {}, skipping cycle",
                cfg.pair_name,
                token_a,
                balance_a,
                cfg.forward_amount
            );
            tally.record_failure();
            return;
        }

        if !self.ensure_allowance(token_a, cfg.forward_amount).await {
            tally.record_failure();
            return;
        }
        if !self
            .submit_swap(cfg.forward, cfg.forward_amount, &cfg.pair_name)
            .await
        {
            tally.record_failure();
            return;
        }

        sleep(self.pacing.swap_settle).await;
        let balance_b = match self.balance(token_b).await {
            Some(balance) => balance,
            None => {
                tally.record_failure();
                return;
            }
        };

        let return_amount = surplus_over_floor(balance_b, self.reserves.floor(token_b));
        if return_amount.is_zero() {
            log::warn!(
                "[{}] no {} surplus above the reserve floor, forward-only cycle",
                cfg.pair_name,
                token_b
            );
            tally.record_failure();
            return;
        }

        if !self.ensure_allowance(token_b, return_amount).await {
            tally.record_failure();
            return;
        }
        if !self
            .submit_swap(cfg.reverse(), return_amount, &cfg.pair_name)
            .await
        {
            tally.record_failure();
            return;
        }
        tally.record_success();
    }

    /// Tops `target` back up to its floor by swapping in surplus from the
    /// other assets, tried in priority order. True when the target is
    /// already at its floor or a replenishing swap confirmed.
    pub async fn replenish(&self, target: Token) -> bool {
        let floor = self.reserves.floor(target);
        let balance = match self.balance(target).await {
            Some(balance) => balance,
            None => return false,
        };
        if balance >= floor {
            return true;
        }
        log::warn!(
            "{} balance {} below reserve floor {}, attempting replenishment",
            target,
            balance,
            floor
        );

        for source in Token::ALL.into_iter().filter(|t| *t != target) {
            let source_balance = match self.balance(source).await {
                Some(balance) => balance,
                None => continue,
            };
            let surplus = surplus_over_floor(source_balance, self.reserves.floor(source));
            if surplus.is_zero() {
                log::info!("no {} surplus to draw from", source);
                continue;
            }
            let direction = match SwapDirection::between(source, target) {
                Ok(direction) => direction,
                Err(e) => {
                    log::error!("replenishment direction unavailable: {}", e);
                    continue;
                }
            };
            if !self.ensure_allowance(source, surplus).await {
                continue;
            }
            if self.submit_swap(direction, surplus, "replenish").await {
                log::info!("replenished {} with {} {}", target, surplus, source);
                return true;
            }
        }
        log::warn!("could not replenish {} from any source", target);
        false
    }

    /// Checks the router allowance and enqueues an approval only when it
    /// falls short. The check itself never touches the queue.
    async fn ensure_allowance(&self, token: Token, amount: Amount) -> bool {
        let current = match self
            .client
            .allowance(self.tokens.address(token), &self.wallet, &self.router)
            .await
        {
            Ok(allowance) => allowance,
            Err(e) => {
                log::error!("allowance check for {} failed: {}", token, e);
                return false;
            }
        };
        if current >= amount {
            log::info!("existing {} allowance covers {}", token, amount);
            return true;
        }

        log::info!("approval required for {} {}", amount, token);
        let executor = Arc::clone(&self.executor);
        let approved = self
            .sequencer
            .submit(format!("approve {} {}", amount, token), move |nonce| async move {
                executor.approve(token, amount, nonce).await
            })
            .await;
        if approved {
            // Let the allowance state settle before the dependent swap.
            sleep(self.pacing.approve_settle).await;
        }
        approved
    }

    async fn submit_swap(&self, direction: SwapDirection, amount: Amount, label: &str) -> bool {
        let executor = Arc::clone(&self.executor);
        self.sequencer
            .submit(format!("{} - swap {}", label, direction), move |nonce| async move {
                executor.swap(direction, amount, nonce).await
            })
            .await
    }

    async fn balance(&self, token: Token) -> Option<Amount> {
        match self
            .client
            .token_balance(self.tokens.address(token), &self.wallet)
            .await
        {
            Ok(balance) => Some(balance),
            Err(e) => {
                log::error!("balance read for {} failed: {}", token, e);
                None
            }
        }
    }

    async fn cycle_pause(&self) {
        let (min, max) = self.pacing.cycle_pause_secs;
        let secs = bounded_pause_secs(min, max);
        if secs == 0 {
            return;
        }
        log::info!("waiting {}s before the next cycle", secs);
        sleep(Duration::from_secs(secs)).await;
    }
}
