//! Routing, command preview and execution submission endpoints

use alloy_primitives::{Address, Bytes};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::engine::amount::format_units;
use crate::engine::chains::{Asset, Chain};
use crate::engine::router::{Route, SwapRequest};
use crate::engine::session::ExecutionSnapshot;
use crate::engine::swap_executor::{plan_direct_swap, DirectSwapParams};
use crate::types::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub source_chain: Chain,
    pub dest_chain: Chain,
    pub source_asset: Asset,
    pub dest_asset: Asset,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub route: Route,
}

/// POST /api/route - Classify a request without executing it
pub async fn classify_route(
    State(state): State<AppState>,
    Json(req): Json<RouteRequest>,
) -> Json<RouteResponse> {
    let route = state.ctx().router.classify(
        req.source_chain,
        req.dest_chain,
        req.source_asset,
        req.dest_asset,
    );
    Json(RouteResponse { route })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandsRequest {
    pub chain: Chain,
    pub source_asset: Asset,
    pub dest_asset: Asset,
    pub amount: String,
    pub recipient: Address,
    #[serde(default)]
    pub amount_out_min: Option<String>,
    #[serde(default)]
    pub expected_out: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandsResponse {
    pub chain: Chain,
    pub router: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    /// Base units, decimal
    pub amount_in: String,
    pub amount_out_min: String,
    /// Human-readable forms of the two amounts
    pub amount_in_formatted: String,
    pub amount_out_min_formatted: String,
    pub value: String,
    pub commands: Bytes,
    pub inputs: Vec<Bytes>,
}

/// POST /api/swap/commands - Preview AMM router commands for a same-chain swap
pub async fn preview_commands(
    State(state): State<AppState>,
    Json(req): Json<CommandsRequest>,
) -> ApiResult<Json<CommandsResponse>> {
    let ctx = state.ctx();
    let request = SwapRequest {
        source_chain: req.chain,
        dest_chain: req.chain,
        source_asset: req.source_asset,
        dest_asset: req.dest_asset,
        amount: req.amount,
        depositor: req.recipient,
        recipient: None,
        amount_out_min: req.amount_out_min,
        expected_out: req.expected_out,
    };
    let params = DirectSwapParams::from_request(&request, ctx.settings.slippage_bps)?;
    let plan = plan_direct_swap(&ctx.registry, &params)?;

    Ok(Json(CommandsResponse {
        chain: plan.chain,
        router: plan.router,
        token_in: plan.token_in,
        token_out: plan.token_out,
        fee: plan.fee,
        amount_in: plan.amount_in.to_string(),
        amount_out_min: plan.amount_out_min.to_string(),
        amount_in_formatted: format_units(plan.amount_in, req.source_asset.decimals()),
        amount_out_min_formatted: format_units(plan.amount_out_min, req.dest_asset.decimals()),
        value: plan.value.to_string(),
        commands: plan.commands.commands,
        inputs: plan.commands.inputs,
    }))
}

/// POST /api/swap - Validate, classify and start an execution
pub async fn submit_swap(
    State(state): State<AppState>,
    Json(req): Json<SwapRequest>,
) -> ApiResult<(StatusCode, Json<ExecutionSnapshot>)> {
    let snapshot = state.manager.submit(req).await?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}
