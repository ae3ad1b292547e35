//! Route classification
//!
//! Static, first-match-wins decision between the three settlement paths:
//!
//! 1. same chain: AMM swap on that chain
//! 2. cross-chain stable to stable: attested burn-and-mint
//! 3. anything else cross-chain: bridge aggregator
//!
//! This is a fixed heuristic, not a cost model. Unsupported chains or
//! assets are not rejected here; the chosen executor reports them.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::amount::{min_output, parse_units_allow_zero};
use super::chains::{Asset, Chain};
use crate::types::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    DirectSwap,
    AttestedTransfer,
    BridgeAggregator,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Route::DirectSwap => "direct_swap",
            Route::AttestedTransfer => "attested_transfer",
            Route::BridgeAggregator => "bridge_aggregator",
        };
        f.write_str(name)
    }
}

/// A user's request to move value. Immutable once handed to an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub source_chain: Chain,
    pub dest_chain: Chain,
    pub source_asset: Asset,
    pub dest_asset: Asset,
    /// Positive decimal amount of the source asset
    pub amount: String,
    /// Account that funds the request
    pub depositor: Address,
    /// Defaults to the depositor
    #[serde(default)]
    pub recipient: Option<Address>,
    /// Minimum output, decimal in destination-asset units
    #[serde(default)]
    pub amount_out_min: Option<String>,
    /// Expected output, decimal in destination-asset units; the minimum is
    /// derived from it under the configured slippage when not given directly
    #[serde(default)]
    pub expected_out: Option<String>,
}

impl SwapRequest {
    pub fn recipient(&self) -> Address {
        self.recipient.unwrap_or(self.depositor)
    }

    /// Minimum output in destination base units: `amountOutMin` if present,
    /// else `expectedOut` less `slippage_bps`, else `None`. Zero is accepted
    /// for either.
    pub fn min_output(&self, slippage_bps: u16) -> EngineResult<Option<U256>> {
        let decimals = self.dest_asset.decimals();
        if let Some(raw) = &self.amount_out_min {
            return parse_units_allow_zero(raw, decimals).map(Some);
        }
        match &self.expected_out {
            Some(raw) => Ok(Some(min_output(
                parse_units_allow_zero(raw, decimals)?,
                slippage_bps,
            ))),
            None => Ok(None),
        }
    }
}

/// Route classifier parameterised by the stable reference asset
#[derive(Debug, Clone, Copy)]
pub struct Router {
    stable_asset: Asset,
}

impl Router {
    pub fn new(stable_asset: Asset) -> Self {
        Self { stable_asset }
    }

    pub fn stable_asset(&self) -> Asset {
        self.stable_asset
    }

    /// Total over every input: always exactly one route
    pub fn classify(
        &self,
        source_chain: Chain,
        dest_chain: Chain,
        source_asset: Asset,
        dest_asset: Asset,
    ) -> Route {
        if source_chain == dest_chain {
            Route::DirectSwap
        } else if source_asset == self.stable_asset && dest_asset == self.stable_asset {
            Route::AttestedTransfer
        } else {
            Route::BridgeAggregator
        }
    }

    pub fn classify_request(&self, request: &SwapRequest) -> Route {
        self.classify(
            request.source_chain,
            request.dest_chain,
            request.source_asset,
            request.dest_asset,
        )
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Asset::Usdc)
    }
}
