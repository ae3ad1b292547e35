//! Bridge-aggregator executor
//!
//! Idle → Quoting → Approving (ERC-20 source only) → Executing → Success | Error
//!
//! Approval grants the maximum allowance rather than the swap amount, so a
//! spender approved once is never prompted again. Price moves are not
//! re-quoted; a failed run must be reset and started over.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use serde::Serialize;

use super::amount::parse_units;
use super::chains::{Asset, Chain};
use super::contracts::IERC20;
use super::quote_client::{Quote, QuoteRequest};
use super::router::SwapRequest;
use super::state::{Evidence, ExecutionState, StateMachine, Ticket};
use super::wallet::{erc20_allowance, erc20_balance, require_address, send_and_confirm, TxRequest};
use super::EngineContext;
use crate::types::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct BridgeParams {
    pub source_chain: Chain,
    pub dest_chain: Chain,
    pub source_asset: Asset,
    pub dest_asset: Asset,
    /// Decimal amount of the source asset
    pub amount: String,
}

impl BridgeParams {
    pub fn from_request(request: &SwapRequest) -> Self {
        Self {
            source_chain: request.source_chain,
            dest_chain: request.dest_chain,
            source_asset: request.source_asset,
            dest_asset: request.dest_asset,
            amount: request.amount.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTransient {
    pub quote: Option<Quote>,
    pub approval_tx: Option<B256>,
}

pub struct BridgeExecutor {
    ctx: EngineContext,
    machine: StateMachine<BridgeTransient>,
}

impl BridgeExecutor {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            machine: StateMachine::new("bridge_aggregator"),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.machine.state()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ExecutionState> {
        self.machine.subscribe()
    }

    pub fn transient(&self) -> BridgeTransient {
        self.machine.transient()
    }

    pub fn reset(&self) {
        self.machine.reset();
    }

    pub async fn swap(&self, params: BridgeParams) -> EngineResult<Evidence> {
        let request = match self.prepare(&params) {
            Ok(request) => request,
            Err(err) => return Err(self.machine.reject(err)),
        };

        let ticket = self.machine.begin(ExecutionState::Quoting)?;
        match self.drive(&ticket, &params, request).await {
            Ok(evidence) => self.machine.succeed(&ticket, evidence),
            Err(err) => {
                self.machine.fail(&ticket, &err);
                Err(err)
            }
        }
    }

    fn prepare(&self, params: &BridgeParams) -> EngineResult<QuoteRequest> {
        let registry = &self.ctx.registry;
        let from_address = require_address(self.ctx.wallet.as_ref())?;
        let from_amount = parse_units(&params.amount, params.source_asset.decimals())?;

        Ok(QuoteRequest {
            from_chain: params.source_chain.chain_id(),
            to_chain: params.dest_chain.chain_id(),
            from_token: registry.token_address(params.source_chain, params.source_asset)?,
            to_token: registry.token_address(params.dest_chain, params.dest_asset)?,
            from_amount,
            from_address,
        })
    }

    async fn drive(
        &self,
        ticket: &Ticket,
        params: &BridgeParams,
        request: QuoteRequest,
    ) -> EngineResult<Evidence> {
        let wallet = self.ctx.wallet.as_ref();
        let spends_token = !params.source_asset.is_native();

        // Quoting
        if spends_token {
            let balance = erc20_balance(
                wallet,
                params.source_chain,
                request.from_token,
                request.from_address,
            )
            .await?;
            if balance < request.from_amount {
                return Err(EngineError::InsufficientBalance(format!(
                    "{} balance {} is below {}",
                    params.source_asset, balance, request.from_amount
                )));
            }
        }

        let quote = self.ctx.quotes.quote(&request).await?;
        let tx = quote.tx_request(params.source_chain)?;
        self.machine.record(ticket, |t| t.quote = Some(quote.clone()))?;

        // Approving
        if spends_token {
            self.machine.advance(ticket, ExecutionState::Approving)?;
            let approval = self
                .approve_if_needed(
                    params.source_chain,
                    request.from_token,
                    request.from_address,
                    tx.to,
                    request.from_amount,
                )
                .await?;
            if let Some(hash) = approval {
                self.machine.record(ticket, |t| t.approval_tx = Some(hash))?;
            }
        }

        // Executing
        self.machine.advance(ticket, ExecutionState::Executing)?;
        let tx_hash = send_and_confirm(wallet, &tx).await?;

        Ok(Evidence {
            tx_hash,
            chain: params.source_chain,
            explorer_url: self
                .ctx
                .registry
                .explorer_tx_url(params.source_chain, &tx_hash.to_string()),
        })
    }

    async fn approve_if_needed(
        &self,
        chain: Chain,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> EngineResult<Option<B256>> {
        let wallet = self.ctx.wallet.as_ref();
        let allowance = erc20_allowance(wallet, chain, token, owner, spender).await?;
        if allowance >= amount {
            tracing::debug!(%token, %spender, %allowance, "allowance sufficient");
            return Ok(None);
        }

        tracing::info!(%token, %spender, "approving maximum allowance");
        let data = IERC20::approveCall {
            spender,
            amount: U256::MAX,
        }
        .abi_encode();
        let hash = send_and_confirm(wallet, &TxRequest::call(chain, token, data)).await?;
        Ok(Some(hash))
    }
}
