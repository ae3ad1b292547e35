//! Pool fee-tier selection
//!
//! Static table: the stable/wrapped-native pair trades in the 0.05% pool,
//! everything else in the 0.3% pool. No live pool discovery.

use alloy_primitives::Address;

use super::chains::{Chain, ChainRegistry};

/// 0.05% pool (hundredths of a basis point)
pub const LOW_FEE_TIER: u32 = 500;

/// 0.3% pool
pub const DEFAULT_FEE_TIER: u32 = 3000;

/// Fee tier for swapping between `token_a` and `token_b` on `chain`. Order
/// of the pair does not matter.
pub fn select_fee_tier(
    registry: &ChainRegistry,
    chain: Chain,
    token_a: Address,
    token_b: Address,
) -> u32 {
    let stable = registry.stable_token(chain).ok();
    let wrapped = registry.wrapped_native(chain);

    match (stable, wrapped) {
        (Some(stable), Some(wrapped))
            if (token_a == stable && token_b == wrapped)
                || (token_a == wrapped && token_b == stable) =>
        {
            LOW_FEE_TIER
        }
        _ => DEFAULT_FEE_TIER,
    }
}
