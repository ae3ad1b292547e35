//! Unsigned transfer descriptor endpoint

use alloy_primitives::{Address, Bytes, B256};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::AppState;
use crate::engine::amount::{parse_user_amount, to_decimal_string, STABLE_DECIMALS};
use crate::engine::chains::Chain;
use crate::engine::transfer_spec::{build_transfer_spec, BurnIntent, TransferParams};
use crate::engine::wallet::TypedDataPayload;
use crate::types::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSpecRequest {
    pub source_chain: Chain,
    pub dest_chain: Chain,
    /// Stable-asset amount; `$` and thousands separators are accepted
    pub amount: String,
    pub depositor: Address,
    /// Defaults to the depositor
    #[serde(default)]
    pub recipient: Option<Address>,
    /// Defaults to anyone
    #[serde(default)]
    pub caller: Option<Address>,
    #[serde(default)]
    pub hook_data: Option<Bytes>,
    /// Defaults to the configured fee ceiling
    #[serde(default)]
    pub max_fee: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSpecResponse {
    /// Two-decimal display form of the transferred value
    pub amount: String,
    pub burn_intent: Value,
    pub typed_data: TypedDataPayload,
    pub signing_hash: B256,
}

/// POST /api/transfer-spec - Build an unsigned burn intent and its typed data
pub async fn build_transfer(
    State(state): State<AppState>,
    Json(req): Json<TransferSpecRequest>,
) -> ApiResult<Json<TransferSpecResponse>> {
    let ctx = state.ctx();
    let value = parse_user_amount(&req.amount, STABLE_DECIMALS)?;
    let max_fee = match &req.max_fee {
        Some(raw) => parse_user_amount(raw, STABLE_DECIMALS)?,
        None => ctx.settings.max_fee,
    };

    let spec = build_transfer_spec(
        &ctx.registry,
        &TransferParams {
            source_chain: req.source_chain,
            dest_chain: req.dest_chain,
            value,
            depositor: req.depositor,
            recipient: req.recipient.unwrap_or(req.depositor),
            caller: req.caller.unwrap_or(Address::ZERO),
            hook_data: req.hook_data,
        },
    )?;
    let intent = BurnIntent::new(spec, max_fee);
    let typed_data = intent.typed_data();

    tracing::debug!(
        source = %req.source_chain,
        dest = %req.dest_chain,
        value = %value,
        hash = %typed_data.signing_hash,
        "built burn intent"
    );

    Ok(Json(TransferSpecResponse {
        amount: to_decimal_string(value),
        burn_intent: intent.to_json(),
        signing_hash: typed_data.signing_hash,
        typed_data,
    }))
}
