//! Routing and execution engine
//!
//! Leaf primitives (amounts, identifiers, fee tiers, router commands,
//! transfer descriptors) feed three executors, one per settlement path. The
//! router picks the path; the session layer keeps one execution per request.

pub mod amount;
pub mod attested_transfer;
pub mod bridge_executor;
pub mod chains;
pub mod commands;
pub mod contracts;
pub mod fee_tier;
pub mod gateway_client;
pub mod quote_client;
pub mod router;
pub mod session;
pub mod state;
pub mod swap_executor;
pub mod transfer_spec;
pub mod wallet;

use alloy_primitives::U256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chains::ChainRegistry;
use gateway_client::AttestationService;
use quote_client::QuoteService;
use router::Router;
use wallet::Wallet;

/// Seconds a router or settlement call stays valid after submission
pub const DEFAULT_DEADLINE_SECS: u64 = 1800;

/// Default slippage tolerance when no explicit minimum is given
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

/// Tunables shared by every executor
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Fee ceiling signed into every burn intent (stable base units)
    pub max_fee: U256,
    pub slippage_bps: u16,
    pub deadline_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_fee: U256::from(transfer_spec::DEFAULT_MAX_FEE),
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            deadline_secs: DEFAULT_DEADLINE_SECS,
        }
    }
}

/// Collaborators and configuration injected into executors
#[derive(Clone)]
pub struct EngineContext {
    pub registry: Arc<ChainRegistry>,
    pub router: Router,
    pub wallet: Arc<dyn Wallet>,
    pub attestations: Arc<dyn AttestationService>,
    pub quotes: Arc<dyn QuoteService>,
    pub settings: ExecutionSettings,
}

impl EngineContext {
    /// Unix timestamp `deadline_secs` from now
    pub fn deadline(&self) -> U256 {
        U256::from(unix_now() + self.settings.deadline_secs)
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
