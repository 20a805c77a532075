//! Session fee policy, computed once per run.

use anyhow::Result;
use common::traits::IsChainClient;
use common::types::{FeeEstimate, FeeParams};

/// Headroom added to the reported priority fee so the session's
/// transactions keep outbidding the estimate they were priced from.
const PRIORITY_FEE_UPLIFT_PCT: u128 = 10;

/// Markup on a legacy gas price to reduce stuck-transaction risk.
const LEGACY_PRICE_MARKUP_PCT: u128 = 20;

/// Picks the fee parameters used for every transaction in the session.
///
/// Prefers the fee market's dual pricing when the network reports it,
/// falls back to a marked-up legacy price, then to the configured
/// fallback. Fails only when no fee information is obtainable and no
/// fallback is configured; nothing can be safely priced in that case, so
/// the session must not start.
pub async fn compute_fee_params(
    client: &dyn IsChainClient,
    fallback_gas_price: Option<u128>,
) -> Result<FeeParams> {
    let estimate = match client.fee_estimate().await {
        Ok(estimate) => estimate,
        Err(e) => {
            log::warn!("fee estimate unavailable: {}", e);
            FeeEstimate::default()
        }
    };

    if let (Some(max_fee), Some(priority)) =
        (estimate.max_fee_per_gas, estimate.max_priority_fee_per_gas)
    {
        let fees = FeeParams::Eip1559 {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority + priority * PRIORITY_FEE_UPLIFT_PCT / 100,
        };
        log::info!("fee pricing: {}", fees);
        return Ok(fees);
    }

    if let Some(gas_price) = estimate.gas_price {
        log::warn!("network does not report fee-market data, using legacy gas price");
        let fees = FeeParams::Legacy {
            gas_price: gas_price + gas_price * LEGACY_PRICE_MARKUP_PCT / 100,
        };
        log::info!("fee pricing: {}", fees);
        return Ok(fees);
    }

    match fallback_gas_price {
        Some(gas_price) => {
            log::warn!("no fee data from the chain, using configured fallback gas price");
            let fees = FeeParams::Legacy { gas_price };
            log::info!("fee pricing: {}", fees);
            Ok(fees)
        }
        None => anyhow::bail!("no fee information obtainable and no fallback gas price configured"),
    }
}
