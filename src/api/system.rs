//! Chain catalogue endpoint.

use alloy_primitives::Address;
use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::AppState;
use crate::engine::chains::Chain;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub chain: Chain,
    pub name: &'static str,
    pub chain_id: u64,
    /// Attestation-protocol domain, absent when the chain is not on it
    pub domain: Option<u32>,
    pub usdc: Option<Address>,
    pub weth: Option<Address>,
    pub universal_router: Option<Address>,
    pub swap_receiver: Option<Address>,
    pub explorer: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainsResponse {
    pub gateway_wallet: Address,
    pub gateway_minter: Address,
    pub chains: Vec<ChainInfo>,
}

/// GET /api/chains - Supported chains with domains and contracts
pub async fn list_chains(State(state): State<AppState>) -> Json<ChainsResponse> {
    let registry = &state.ctx().registry;
    let chains = registry
        .chains()
        .map(|(chain, config)| ChainInfo {
            chain,
            name: chain.display_name(),
            chain_id: chain.chain_id(),
            domain: config.domain,
            usdc: config.usdc,
            weth: config.weth,
            universal_router: config.universal_router,
            swap_receiver: config.swap_receiver,
            explorer: config.explorer.clone(),
        })
        .collect();

    Json(ChainsResponse {
        gateway_wallet: registry.gateway_wallet(),
        gateway_minter: registry.gateway_minter(),
        chains,
    })
}
