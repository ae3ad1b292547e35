//! Direct-swap executor
//!
//! Same-chain path: Idle → Approving (ERC-20 input only) → Executing →
//! Success | Error.
//!
//! The swap itself is one `execute` transaction. An ERC-20 input is pulled
//! into the router by a leading Permit2 command, so the token must be
//! approved to Permit2 and Permit2 must grant the router an allowance
//! first; both approvals are skipped when already in place. A native input
//! is sent as call value and wrapped by a leading command.

use alloy_primitives::aliases::{U160, U48};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use serde::Serialize;

use super::amount::parse_units;
use super::chains::{Asset, Chain, ChainRegistry, PERMIT2};
use super::commands::{build_commands, SwapCommands, SwapParams};
use super::contracts::{IPermit2, IUniversalRouter, IERC20};
use super::fee_tier::select_fee_tier;
use super::router::SwapRequest;
use super::state::{Evidence, ExecutionState, StateMachine, Ticket};
use super::wallet::{
    erc20_allowance, erc20_balance, permit2_allowance, require_address, send_and_confirm, TxRequest,
};
use super::EngineContext;
use crate::types::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct DirectSwapParams {
    pub chain: Chain,
    pub source_asset: Asset,
    pub dest_asset: Asset,
    /// Decimal amount of the source asset
    pub amount: String,
    pub recipient: Address,
    /// Destination-asset base units
    pub amount_out_min: Option<U256>,
}

impl DirectSwapParams {
    pub fn from_request(request: &SwapRequest, slippage_bps: u16) -> EngineResult<Self> {
        Ok(Self {
            chain: request.source_chain,
            source_asset: request.source_asset,
            dest_asset: request.dest_asset,
            amount: request.amount.clone(),
            recipient: request.recipient(),
            amount_out_min: request.min_output(slippage_bps)?,
        })
    }
}

/// Fully resolved swap, ready to submit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPlan {
    pub chain: Chain,
    pub router: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub amount_in: U256,
    pub amount_out_min: U256,
    /// Native value attached to `execute`
    pub value: U256,
    pub commands: SwapCommands,
}

/// Resolve tokens, fee tier and router commands for a same-chain swap.
/// Pure: no wallet or network access.
pub fn plan_direct_swap(registry: &ChainRegistry, params: &DirectSwapParams) -> EngineResult<SwapPlan> {
    let pair = format!("{} -> {}", params.source_asset, params.dest_asset);
    let wraps_only = matches!(
        (params.source_asset, params.dest_asset),
        (Asset::Eth, Asset::Weth) | (Asset::Weth, Asset::Eth)
    );
    if params.source_asset == params.dest_asset || wraps_only {
        return Err(EngineError::UnsupportedPair(format!("{} is not a swap", pair)));
    }
    if params.dest_asset == Asset::Weth {
        return Err(EngineError::UnsupportedPair(format!(
            "{}: wrapped output is delivered unwrapped; request ETH",
            pair
        )));
    }

    let router = registry.universal_router(params.chain)?;
    let resolve = |asset: Asset| -> EngineResult<Address> {
        if asset.is_native() {
            registry
                .wrapped_native(params.chain)
                .ok_or_else(|| EngineError::NoTokenForChain {
                    asset: Asset::Weth.to_string(),
                    chain: params.chain.to_string(),
                })
        } else {
            registry.token_address(params.chain, asset)
        }
    };
    let token_in = resolve(params.source_asset)?;
    let token_out = resolve(params.dest_asset)?;

    let amount_in = parse_units(&params.amount, params.source_asset.decimals())?;
    let amount_out_min = params.amount_out_min.ok_or_else(|| {
        EngineError::InvalidAmount("amountOutMin or expectedOut is required for a swap".into())
    })?;
    let fee = select_fee_tier(registry, params.chain, token_in, token_out);

    let commands = build_commands(
        registry,
        &SwapParams {
            chain: params.chain,
            amount_in,
            amount_out_min,
            token_in,
            token_out,
            recipient: params.recipient,
            fee,
        },
    )?;
    let (commands, value) = if params.source_asset.is_native() {
        (commands.with_native_input(amount_in), amount_in)
    } else {
        (commands.with_permit2_input(token_in, amount_in)?, U256::ZERO)
    };

    Ok(SwapPlan {
        chain: params.chain,
        router,
        token_in,
        token_out,
        fee,
        amount_in,
        amount_out_min,
        value,
        commands,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectSwapTransient {
    /// ERC-20 approval of Permit2
    pub token_approval_tx: Option<B256>,
    /// Permit2 allowance for the router
    pub permit2_approval_tx: Option<B256>,
}

pub struct DirectSwapExecutor {
    ctx: EngineContext,
    machine: StateMachine<DirectSwapTransient>,
}

impl DirectSwapExecutor {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            machine: StateMachine::new("direct_swap"),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.machine.state()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ExecutionState> {
        self.machine.subscribe()
    }

    pub fn transient(&self) -> DirectSwapTransient {
        self.machine.transient()
    }

    pub fn reset(&self) {
        self.machine.reset();
    }

    pub async fn swap(&self, params: DirectSwapParams) -> EngineResult<Evidence> {
        let prepared = require_address(self.ctx.wallet.as_ref())
            .and_then(|owner| plan_direct_swap(&self.ctx.registry, &params).map(|plan| (owner, plan)));
        let (owner, plan) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => return Err(self.machine.reject(err)),
        };

        let first = if params.source_asset.is_native() {
            ExecutionState::Executing
        } else {
            ExecutionState::Approving
        };
        let ticket = self.machine.begin(first)?;
        match self.drive(&ticket, owner, &params, plan).await {
            Ok(evidence) => self.machine.succeed(&ticket, evidence),
            Err(err) => {
                self.machine.fail(&ticket, &err);
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        ticket: &Ticket,
        owner: Address,
        params: &DirectSwapParams,
        plan: SwapPlan,
    ) -> EngineResult<Evidence> {
        let wallet = self.ctx.wallet.as_ref();

        // Approving
        if !params.source_asset.is_native() {
            let balance = erc20_balance(wallet, plan.chain, plan.token_in, owner).await?;
            if balance < plan.amount_in {
                return Err(EngineError::InsufficientBalance(format!(
                    "{} balance {} is below {}",
                    params.source_asset, balance, plan.amount_in
                )));
            }

            if let Some(hash) = self.approve_permit2(&plan, owner).await? {
                self.machine.record(ticket, |t| t.token_approval_tx = Some(hash))?;
            }
            if let Some(hash) = self.approve_router(&plan, owner).await? {
                self.machine.record(ticket, |t| t.permit2_approval_tx = Some(hash))?;
            }
            self.machine.advance(ticket, ExecutionState::Executing)?;
        }

        // Executing
        let execute = IUniversalRouter::executeCall {
            commands: plan.commands.commands.clone(),
            inputs: plan.commands.inputs.clone(),
            deadline: self.ctx.deadline(),
        }
        .abi_encode();
        let tx = TxRequest::call(plan.chain, plan.router, execute).with_value(plan.value);
        let tx_hash = send_and_confirm(wallet, &tx).await?;

        Ok(Evidence {
            tx_hash,
            chain: plan.chain,
            explorer_url: self.ctx.registry.explorer_tx_url(plan.chain, &tx_hash.to_string()),
        })
    }

    /// Token → Permit2 allowance, granted at the maximum once
    async fn approve_permit2(&self, plan: &SwapPlan, owner: Address) -> EngineResult<Option<B256>> {
        let wallet = self.ctx.wallet.as_ref();
        let allowance = erc20_allowance(wallet, plan.chain, plan.token_in, owner, PERMIT2).await?;
        if allowance >= plan.amount_in {
            return Ok(None);
        }

        tracing::info!(chain = %plan.chain, token = %plan.token_in, "approving Permit2");
        let data = IERC20::approveCall {
            spender: PERMIT2,
            amount: U256::MAX,
        }
        .abi_encode();
        let hash = send_and_confirm(wallet, &TxRequest::call(plan.chain, plan.token_in, data)).await?;
        Ok(Some(hash))
    }

    /// Permit2 → router allowance for this swap's amount, expiring with the
    /// swap deadline
    async fn approve_router(&self, plan: &SwapPlan, owner: Address) -> EngineResult<Option<B256>> {
        let wallet = self.ctx.wallet.as_ref();
        let (amount, expiration) =
            permit2_allowance(wallet, plan.chain, PERMIT2, owner, plan.token_in, plan.router).await?;
        let deadline = self.ctx.deadline();
        if amount >= plan.amount_in && U256::from(expiration) >= deadline {
            return Ok(None);
        }

        if plan.amount_in.bit_len() > 160 {
            return Err(EngineError::InvalidAmount(format!(
                "{} exceeds the Permit2 amount range",
                plan.amount_in
            )));
        }
        tracing::info!(chain = %plan.chain, router = %plan.router, "granting router Permit2 allowance");
        let data = IPermit2::approveCall {
            token: plan.token_in,
            spender: plan.router,
            amount: U160::saturating_from(plan.amount_in),
            expiration: U48::saturating_from(deadline),
        }
        .abi_encode();
        let hash = send_and_confirm(wallet, &TxRequest::call(plan.chain, PERMIT2, data)).await?;
        Ok(Some(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::commands::{PERMIT2_TRANSFER_FROM, UNWRAP_WETH, V3_SWAP_EXACT_IN, WRAP_ETH};
    use crate::engine::gateway_client::testing::StaticAttestations;
    use crate::engine::quote_client::testing::StaticQuotes;
    use crate::engine::router::{Route, Router};
    use crate::engine::state::Phase;
    use crate::engine::wallet::testing::ScriptedWallet;
    use crate::engine::ExecutionSettings;
    use alloy_primitives::address;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    const USER: Address = address!("1111111111111111111111111111111111111111");
    /// Far beyond any swap deadline, still inside 48 bits
    const LONG_EXPIRY: u64 = 1 << 40;

    fn executor(wallet: Arc<ScriptedWallet>) -> DirectSwapExecutor {
        DirectSwapExecutor::new(EngineContext {
            registry: Arc::new(ChainRegistry::mainnet()),
            router: Router::default(),
            wallet,
            attestations: Arc::new(StaticAttestations::ok()),
            quotes: Arc::new(StaticQuotes::failing(EngineError::QuoteUnavailable("unused".into()))),
            settings: ExecutionSettings::default(),
        })
    }

    fn approved_wallet() -> ScriptedWallet {
        ScriptedWallet::new(USER)
            .with_allowance(U256::MAX)
            .with_permit2_allowance(U256::MAX, LONG_EXPIRY)
    }

    fn params(source: Asset, dest: Asset, amount: &str) -> DirectSwapParams {
        DirectSwapParams {
            chain: Chain::Arbitrum,
            source_asset: source,
            dest_asset: dest,
            amount: amount.to_string(),
            recipient: USER,
            amount_out_min: Some(U256::from(1u64)),
        }
    }

    async fn wait_for_sent(wallet: &ScriptedWallet, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while wallet.sent_transactions().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("transaction was not submitted");
    }

    #[test]
    fn test_stable_to_native_plan() {
        let router = Router::default();
        assert_eq!(
            router.classify(Chain::Arbitrum, Chain::Arbitrum, Asset::Usdc, Asset::Eth),
            Route::DirectSwap
        );

        let registry = ChainRegistry::mainnet();
        let plan = plan_direct_swap(&registry, &params(Asset::Usdc, Asset::Eth, "100")).unwrap();

        assert_eq!(plan.amount_in, U256::from(100_000_000u64));
        assert_eq!(plan.fee, 500);
        assert_eq!(plan.value, U256::ZERO);
        assert_eq!(
            plan.commands.commands.as_ref(),
            &[PERMIT2_TRANSFER_FROM, V3_SWAP_EXACT_IN, UNWRAP_WETH]
        );
        assert_eq!(plan.commands.inputs.len(), 3);
    }

    #[test]
    fn test_native_input_plan() {
        let registry = ChainRegistry::mainnet();
        let plan = plan_direct_swap(&registry, &params(Asset::Eth, Asset::Usdc, "0.5")).unwrap();

        assert_eq!(plan.value, U256::from(500_000_000_000_000_000u64));
        assert_eq!(plan.commands.commands.as_ref(), &[WRAP_ETH, V3_SWAP_EXACT_IN]);
        assert_eq!(plan.token_in, registry.wrapped_native(Chain::Arbitrum).unwrap());
    }

    #[test]
    fn test_plan_rejections() {
        let registry = ChainRegistry::mainnet();
        for (src, dst) in [
            (Asset::Usdc, Asset::Usdc),
            (Asset::Eth, Asset::Weth),
            (Asset::Weth, Asset::Eth),
            (Asset::Usdc, Asset::Weth),
        ] {
            assert!(matches!(
                plan_direct_swap(&registry, &params(src, dst, "1")),
                Err(EngineError::UnsupportedPair(_))
            ));
        }

        let mut p = params(Asset::Usdc, Asset::Eth, "1");
        p.amount_out_min = None;
        assert!(matches!(
            plan_direct_swap(&registry, &p),
            Err(EngineError::InvalidAmount(_))
        ));

        let mut p = params(Asset::Usdc, Asset::Eth, "1");
        p.chain = Chain::Polygon;
        assert!(matches!(
            plan_direct_swap(&registry, &p),
            Err(EngineError::ContractNotDeployed { .. })
        ));
    }

    #[tokio::test]
    async fn test_token_input_approves_then_executes_once() {
        let wallet = Arc::new(ScriptedWallet::new(USER));
        let exec = executor(wallet.clone());

        let evidence = exec.swap(params(Asset::Usdc, Asset::Eth, "100")).await.unwrap();
        assert_eq!(evidence.chain, Chain::Arbitrum);
        assert!(evidence.explorer_url.starts_with("https://arbiscan.io/tx/"));

        let registry = ChainRegistry::mainnet();
        let router = registry.universal_router(Chain::Arbitrum).unwrap();
        let usdc = registry.stable_token(Chain::Arbitrum).unwrap();
        let sent = wallet.sent_transactions();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|tx| tx.chain == Chain::Arbitrum));

        // token never moves outside the swap transaction
        assert!(sent
            .iter()
            .all(|tx| IERC20::transferCall::abi_decode(&tx.data, true).is_err()));

        assert_eq!(sent[0].to, usdc);
        let token_approval = IERC20::approveCall::abi_decode(&sent[0].data, true).unwrap();
        assert_eq!(token_approval.spender, PERMIT2);
        assert_eq!(token_approval.amount, U256::MAX);

        assert_eq!(sent[1].to, PERMIT2);
        let router_approval = IPermit2::approveCall::abi_decode(&sent[1].data, true).unwrap();
        assert_eq!(router_approval.token, usdc);
        assert_eq!(router_approval.spender, router);
        assert_eq!(U256::from(router_approval.amount), U256::from(100_000_000u64));

        let to_router: Vec<_> = sent.iter().filter(|tx| tx.to == router).collect();
        assert_eq!(to_router.len(), 1);
        let execute = IUniversalRouter::executeCall::abi_decode(&to_router[0].data, true).unwrap();
        assert_eq!(execute.commands.first(), Some(&PERMIT2_TRANSFER_FROM));
        assert_eq!(execute.inputs.len(), 3);

        let transient = exec.transient();
        assert!(transient.token_approval_tx.is_some());
        assert!(transient.permit2_approval_tx.is_some());
    }

    #[tokio::test]
    async fn test_existing_approvals_send_only_the_swap() {
        let wallet = Arc::new(approved_wallet());
        let exec = executor(wallet.clone());

        exec.swap(params(Asset::Usdc, Asset::Eth, "100")).await.unwrap();
        let sent = wallet.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].to,
            ChainRegistry::mainnet().universal_router(Chain::Arbitrum).unwrap()
        );
        assert_eq!(exec.transient().token_approval_tx, None);
        assert_eq!(exec.transient().permit2_approval_tx, None);
    }

    #[tokio::test]
    async fn test_expired_router_allowance_is_renewed() {
        let wallet = Arc::new(
            ScriptedWallet::new(USER)
                .with_allowance(U256::MAX)
                .with_permit2_allowance(U256::MAX, 1),
        );
        let exec = executor(wallet.clone());

        exec.swap(params(Asset::Usdc, Asset::Eth, "100")).await.unwrap();
        let sent = wallet.sent_transactions();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, PERMIT2);
        assert!(exec.transient().permit2_approval_tx.is_some());
    }

    #[tokio::test]
    async fn test_native_input_sends_value() {
        let wallet = Arc::new(ScriptedWallet::new(USER));
        let exec = executor(wallet.clone());

        exec.swap(params(Asset::Eth, Asset::Usdc, "0.01")).await.unwrap();
        let sent = wallet.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].value, U256::from(10_000_000_000_000_000u64));
        assert!(wallet.reads().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_balance_before_any_transaction() {
        let wallet = Arc::new(ScriptedWallet::new(USER).with_balance(U256::from(10u64)));
        let exec = executor(wallet.clone());

        let err = exec.swap(params(Asset::Usdc, Asset::Eth, "100")).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance(_)));
        assert!(wallet.sent_transactions().is_empty());
        assert!(matches!(
            exec.state(),
            ExecutionState::Error { phase: Phase::Approving, .. }
        ));
    }

    #[tokio::test]
    async fn test_reset_while_approving_drops_the_run() {
        let gate = Arc::new(Notify::new());
        let wallet = Arc::new(ScriptedWallet::new(USER).with_send_gate(gate.clone()));
        let exec = Arc::new(executor(wallet.clone()));

        let run = tokio::spawn({
            let exec = exec.clone();
            async move { exec.swap(params(Asset::Usdc, Asset::Eth, "100")).await }
        });
        wait_for_sent(&wallet, 1).await;
        assert_eq!(exec.state(), ExecutionState::Approving);

        exec.reset();
        gate.notify_one();

        assert_eq!(run.await.unwrap(), Err(EngineError::Superseded));
        assert!(exec.state().is_idle());
        assert_eq!(exec.transient().token_approval_tx, None);
        // the Permit2 grant and the swap are never sent
        assert_eq!(wallet.sent_transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_while_executing_drops_the_result() {
        let gate = Arc::new(Notify::new());
        let wallet = Arc::new(approved_wallet().with_send_gate(gate.clone()));
        let exec = Arc::new(executor(wallet.clone()));

        let run = tokio::spawn({
            let exec = exec.clone();
            async move { exec.swap(params(Asset::Usdc, Asset::Eth, "100")).await }
        });
        wait_for_sent(&wallet, 1).await;
        assert_eq!(exec.state(), ExecutionState::Executing);

        exec.reset();
        gate.notify_one();

        assert_eq!(run.await.unwrap(), Err(EngineError::Superseded));
        assert!(exec.state().is_idle());
        assert_eq!(wallet.sent_transactions().len(), 1);

        // a fresh run starts from idle
        gate.notify_one();
        exec.swap(params(Asset::Usdc, Asset::Eth, "100")).await.unwrap();
        assert!(matches!(exec.state(), ExecutionState::Success { .. }));
    }
}
