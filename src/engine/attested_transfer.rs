//! Attested-transfer executor
//!
//! Idle → Signing → AwaitingAttestation → Executing → Success | Error
//!
//! The depositor signs a `BurnIntent` over the gateway balance on the source
//! chain, the attestation service countersigns it, and the destination chain
//! settles. Settlement either mints the stable asset straight to the
//! recipient (`gatewayMint`) or, when another output asset is requested,
//! mints into the swap receiver which swaps and forwards in one call
//! (`executeSwap`).

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use serde::Serialize;

use super::amount::to_base_units;
use super::chains::{Asset, Chain, NATIVE_TOKEN};
use super::commands::{build_commands, SwapCommands, SwapParams};
use super::contracts::{IGatewayMinter, IGatewaySwapReceiver};
use super::fee_tier::select_fee_tier;
use super::gateway_client::{Attestation, SignedBurnIntent};
use super::router::SwapRequest;
use super::state::{Evidence, ExecutionState, StateMachine, Ticket};
use super::transfer_spec::{build_transfer_spec, BurnIntent, TransferParams};
use super::wallet::{gateway_available_balance, require_address, send_and_confirm, TxRequest};
use super::EngineContext;
use crate::types::{EngineError, EngineResult};

/// What the caller asked for
#[derive(Debug, Clone)]
pub struct AttestedTransferParams {
    pub source_chain: Chain,
    pub dest_chain: Chain,
    /// Decimal amount of the stable asset
    pub amount: String,
    /// Stable asset for a plain mint; ETH (or another token) for mint-and-swap
    pub output: Asset,
    pub recipient: Address,
    /// Required for mint-and-swap, in output-asset base units
    pub amount_out_min: Option<U256>,
    pub hook_data: Option<Bytes>,
}

impl AttestedTransferParams {
    pub fn from_request(request: &SwapRequest, slippage_bps: u16) -> EngineResult<Self> {
        let amount_out_min = request.min_output(slippage_bps)?;
        Ok(Self {
            source_chain: request.source_chain,
            dest_chain: request.dest_chain,
            amount: request.amount.clone(),
            output: request.dest_asset,
            recipient: request.recipient(),
            amount_out_min,
            hook_data: None,
        })
    }
}

/// Fields that live only for the duration of one run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestedTransient {
    pub signing_hash: Option<B256>,
    pub signature: Option<Bytes>,
    pub attestation: Option<Attestation>,
}

/// How the destination chain settles
#[derive(Debug, Clone)]
enum Settlement {
    Mint {
        minter: Address,
    },
    Swap {
        receiver: Address,
        commands: SwapCommands,
        output_token: Address,
    },
}

/// Everything validated up front, before any prompt or network call
#[derive(Debug, Clone)]
struct Prepared {
    depositor: Address,
    value: U256,
    source_token: Address,
    settlement: Settlement,
}

pub struct AttestedTransferExecutor {
    ctx: EngineContext,
    machine: StateMachine<AttestedTransient>,
}

impl AttestedTransferExecutor {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            machine: StateMachine::new("attested_transfer"),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.machine.state()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ExecutionState> {
        self.machine.subscribe()
    }

    pub fn transient(&self) -> AttestedTransient {
        self.machine.transient()
    }

    pub fn reset(&self) {
        self.machine.reset();
    }

    /// Run the transfer to a terminal state. Rejected with `Busy` unless Idle.
    pub async fn sign(&self, params: AttestedTransferParams) -> EngineResult<Evidence> {
        let prepared = match self.prepare(&params) {
            Ok(prepared) => prepared,
            Err(err) => return Err(self.machine.reject(err)),
        };

        let ticket = self.machine.begin(ExecutionState::Signing)?;
        match self.drive(&ticket, &params, prepared).await {
            Ok(evidence) => self.machine.succeed(&ticket, evidence),
            Err(err) => {
                self.machine.fail(&ticket, &err);
                Err(err)
            }
        }
    }

    fn prepare(&self, params: &AttestedTransferParams) -> EngineResult<Prepared> {
        let registry = &self.ctx.registry;
        let depositor = require_address(self.ctx.wallet.as_ref())?;
        let value = to_base_units(&params.amount)?;

        registry.domain(params.source_chain)?;
        registry.domain(params.dest_chain)?;
        let source_token = registry.stable_token(params.source_chain)?;
        let dest_stable = registry.stable_token(params.dest_chain)?;

        let settlement = match params.output {
            Asset::Usdc => Settlement::Mint {
                minter: registry.gateway_minter(),
            },
            Asset::Weth => {
                return Err(EngineError::UnsupportedPair(
                    "wrapped output is delivered unwrapped; request ETH".into(),
                ))
            }
            output => {
                let receiver = registry.swap_receiver(params.dest_chain)?;
                let token_out = match output {
                    Asset::Eth => registry.wrapped_native(params.dest_chain).ok_or_else(|| {
                        EngineError::NoTokenForChain {
                            asset: Asset::Weth.to_string(),
                            chain: params.dest_chain.to_string(),
                        }
                    })?,
                    other => registry.token_address(params.dest_chain, other)?,
                };
                let amount_out_min = params.amount_out_min.ok_or_else(|| {
                    EngineError::InvalidAmount("amountOutMin is required to swap on settlement".into())
                })?;
                let commands = build_commands(
                    registry,
                    &SwapParams {
                        chain: params.dest_chain,
                        amount_in: value,
                        amount_out_min,
                        token_in: dest_stable,
                        token_out,
                        recipient: params.recipient,
                        fee: select_fee_tier(registry, params.dest_chain, dest_stable, token_out),
                    },
                )?;
                Settlement::Swap {
                    receiver,
                    commands,
                    output_token: if output.is_native() { NATIVE_TOKEN } else { token_out },
                }
            }
        };

        Ok(Prepared {
            depositor,
            value,
            source_token,
            settlement,
        })
    }

    async fn drive(
        &self,
        ticket: &Ticket,
        params: &AttestedTransferParams,
        prepared: Prepared,
    ) -> EngineResult<Evidence> {
        let registry = &self.ctx.registry;
        let wallet = self.ctx.wallet.as_ref();

        // Signing
        let available = gateway_available_balance(
            wallet,
            params.source_chain,
            registry.gateway_wallet(),
            prepared.source_token,
            prepared.depositor,
        )
        .await?;
        let required = prepared.value.saturating_add(self.ctx.settings.max_fee);
        if available < required {
            return Err(EngineError::InsufficientBalance(format!(
                "gateway balance {} is below {} (value plus max fee)",
                available, required
            )));
        }

        let (recipient, caller) = match &prepared.settlement {
            Settlement::Mint { .. } => (params.recipient, Address::ZERO),
            Settlement::Swap { receiver, .. } => (*receiver, *receiver),
        };
        let spec = build_transfer_spec(
            registry,
            &TransferParams {
                source_chain: params.source_chain,
                dest_chain: params.dest_chain,
                value: prepared.value,
                depositor: prepared.depositor,
                recipient,
                caller,
                hook_data: params.hook_data.clone(),
            },
        )?;
        let burn_intent = BurnIntent::new(spec, self.ctx.settings.max_fee);
        let payload = burn_intent.typed_data();
        self.machine
            .record(ticket, |t| t.signing_hash = Some(payload.signing_hash))?;

        tracing::info!(
            signing_hash = %payload.signing_hash,
            value = %prepared.value,
            "requesting burn intent signature"
        );
        let signature = wallet.sign_typed_data(params.source_chain, &payload).await?;
        self.machine
            .record(ticket, |t| t.signature = Some(signature.clone()))?;

        // AwaitingAttestation
        self.machine
            .advance(ticket, ExecutionState::AwaitingAttestation)?;
        let attestation = self
            .ctx
            .attestations
            .submit(&SignedBurnIntent {
                burn_intent,
                signature,
            })
            .await?;
        self.machine
            .record(ticket, |t| t.attestation = Some(attestation.clone()))?;

        // Executing
        self.machine.advance(ticket, ExecutionState::Executing)?;
        let tx = self.settlement_tx(
            params.dest_chain,
            &prepared.settlement,
            &attestation,
            params.recipient,
        );
        let tx_hash = send_and_confirm(wallet, &tx).await?;

        Ok(Evidence {
            tx_hash,
            chain: params.dest_chain,
            explorer_url: registry.explorer_tx_url(params.dest_chain, &tx_hash.to_string()),
        })
    }

    fn settlement_tx(
        &self,
        chain: Chain,
        settlement: &Settlement,
        attestation: &Attestation,
        recipient: Address,
    ) -> TxRequest {
        match settlement {
            Settlement::Mint { minter } => TxRequest::call(
                chain,
                *minter,
                IGatewayMinter::gatewayMintCall {
                    attestationPayload: attestation.attestation.clone(),
                    signature: attestation.signature.clone(),
                }
                .abi_encode(),
            ),
            Settlement::Swap {
                receiver,
                commands,
                output_token,
            } => TxRequest::call(
                chain,
                *receiver,
                IGatewaySwapReceiver::executeSwapCall {
                    attestation: attestation.attestation.clone(),
                    signature: attestation.signature.clone(),
                    commands: commands.commands.clone(),
                    inputs: commands.inputs.clone(),
                    deadline: self.ctx.deadline(),
                    outputToken: *output_token,
                    recipient,
                }
                .abi_encode(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::chains::ChainRegistry;
    use crate::engine::commands::UNWRAP_WETH;
    use crate::engine::gateway_client::testing::StaticAttestations;
    use crate::engine::quote_client::testing::StaticQuotes;
    use crate::engine::router::Router;
    use crate::engine::state::Phase;
    use crate::engine::wallet::testing::ScriptedWallet;
    use crate::engine::{unix_now, ExecutionSettings};
    use alloy_primitives::address;
    use std::sync::Arc;
    use tokio::sync::Notify;

    const USER: Address = address!("1111111111111111111111111111111111111111");
    const RECEIVER: Address = address!("00000000000000000000000000000000000000aa");

    fn executor(
        wallet: Arc<ScriptedWallet>,
        attestations: Arc<StaticAttestations>,
    ) -> Arc<AttestedTransferExecutor> {
        let registry = ChainRegistry::mainnet().with_swap_receiver(Chain::Base, RECEIVER);
        Arc::new(AttestedTransferExecutor::new(EngineContext {
            registry: Arc::new(registry),
            router: Router::default(),
            wallet,
            attestations,
            quotes: Arc::new(StaticQuotes::failing(EngineError::QuoteUnavailable("unused".into()))),
            settings: ExecutionSettings::default(),
        }))
    }

    fn mint_params(amount: &str) -> AttestedTransferParams {
        AttestedTransferParams {
            source_chain: Chain::Arbitrum,
            dest_chain: Chain::Base,
            amount: amount.to_string(),
            output: Asset::Usdc,
            recipient: USER,
            amount_out_min: None,
            hook_data: None,
        }
    }

    async fn wait_for(executor: &AttestedTransferExecutor, step: &'static str) {
        let mut rx = executor.subscribe();
        rx.wait_for(|s| s.name() == step).await.unwrap();
    }

    #[tokio::test]
    async fn test_transfer_one_unit_end_to_end() {
        let sign_gate = Arc::new(Notify::new());
        let attest_gate = Arc::new(Notify::new());
        let wallet = Arc::new(ScriptedWallet::new(USER).with_sign_gate(sign_gate.clone()));
        let attestations = Arc::new(StaticAttestations::ok().with_gate(attest_gate.clone()));
        let exec = executor(wallet.clone(), attestations.clone());

        assert!(exec.state().is_idle());
        let run = tokio::spawn({
            let exec = exec.clone();
            async move { exec.sign(mint_params("1")).await }
        });

        wait_for(&exec, "signing").await;
        sign_gate.notify_one();
        wait_for(&exec, "awaiting_attestation").await;
        assert!(exec.transient().signature.is_some());
        attest_gate.notify_one();

        let evidence = run.await.unwrap().unwrap();
        assert_ne!(evidence.tx_hash, B256::ZERO);
        assert_eq!(evidence.chain, Chain::Base);
        assert!(evidence.explorer_url.starts_with("https://basescan.org/tx/0x"));
        assert!(matches!(exec.state(), ExecutionState::Success { .. }));

        // signed exactly the burn intent that was submitted
        let submitted = attestations.submissions();
        assert_eq!(submitted.len(), 1);
        let intent = &submitted[0].burn_intent;
        assert_eq!(intent.spec.value, U256::from(1_000_000u64));
        assert_eq!(intent.spec.sourceDomain, 3);
        assert_eq!(intent.spec.destinationDomain, 6);
        assert_eq!(
            wallet.signature_requests()[0].signing_hash,
            intent.signing_hash()
        );

        // balance read on the source chain, settlement on the destination
        assert_eq!(
            wallet.reads(),
            vec![(Chain::Arbitrum, crate::engine::chains::GATEWAY_WALLET)]
        );
        let sent = wallet.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chain, Chain::Base);
        assert_eq!(sent[0].to, crate::engine::chains::GATEWAY_MINTER);
        let call = IGatewayMinter::gatewayMintCall::abi_decode(&sent[0].data, true).unwrap();
        assert_eq!(call.attestationPayload, Bytes::from(vec![0xa7; 32]));
    }

    #[tokio::test]
    async fn test_second_sign_while_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let wallet = Arc::new(ScriptedWallet::new(USER).with_sign_gate(gate.clone()));
        let exec = executor(wallet.clone(), Arc::new(StaticAttestations::ok()));

        let first = tokio::spawn({
            let exec = exec.clone();
            async move { exec.sign(mint_params("5")).await }
        });
        wait_for(&exec, "signing").await;
        let hash_before = exec.transient().signing_hash;

        let second = exec.sign(mint_params("7")).await;
        assert!(matches!(second, Err(EngineError::Busy(_))));
        assert_eq!(exec.transient().signing_hash, hash_before);
        assert_eq!(wallet.signature_requests().len(), 1);

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_signature() {
        let gate = Arc::new(Notify::new());
        let wallet = Arc::new(ScriptedWallet::new(USER).with_sign_gate(gate.clone()));
        let attestations = Arc::new(StaticAttestations::ok());
        let exec = executor(wallet.clone(), attestations.clone());

        let run = tokio::spawn({
            let exec = exec.clone();
            async move { exec.sign(mint_params("1")).await }
        });
        wait_for(&exec, "signing").await;

        exec.reset();
        gate.notify_one();

        assert_eq!(run.await.unwrap(), Err(EngineError::Superseded));
        assert!(exec.state().is_idle());
        assert!(exec.transient().signature.is_none());
        assert!(attestations.submissions().is_empty());
        assert!(wallet.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_attestation_failure_is_resettable() {
        let wallet = Arc::new(ScriptedWallet::new(USER));
        let attestations = Arc::new(StaticAttestations::failing(
            EngineError::AttestationServiceError("status 500 Internal Server Error: boom".into()),
        ));
        let exec = executor(wallet.clone(), attestations);

        let err = exec.sign(mint_params("1")).await.unwrap_err();
        assert!(matches!(err, EngineError::AttestationServiceError(_)));
        match exec.state() {
            ExecutionState::Error { phase, code, message } => {
                assert_eq!(phase, Phase::AwaitingAttestation);
                assert_eq!(code, "ATTESTATION_SERVICE_ERROR");
                assert!(message.contains("500"));
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert!(wallet.sent_transactions().is_empty());

        exec.reset();
        assert!(exec.state().is_idle());
        assert!(exec.transient().attestation.is_none());
    }

    #[tokio::test]
    async fn test_validation_fails_before_signing() {
        let wallet = Arc::new(ScriptedWallet::new(USER));
        let exec = executor(wallet.clone(), Arc::new(StaticAttestations::ok()));

        let err = exec.sign(mint_params("0")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
        assert!(matches!(
            exec.state(),
            ExecutionState::Error { phase: Phase::Idle, .. }
        ));
        exec.reset();

        let mut params = mint_params("1");
        params.dest_chain = Chain::Polygon;
        assert!(matches!(
            exec.sign(params).await,
            Err(EngineError::UnsupportedChain(_))
        ));
        exec.reset();

        // no receiver deployed on Arbitrum for mint-and-swap
        let mut params = mint_params("1");
        params.dest_chain = Chain::Arbitrum;
        params.source_chain = Chain::Base;
        params.output = Asset::Eth;
        params.amount_out_min = Some(U256::from(1u64));
        assert!(matches!(
            exec.sign(params).await,
            Err(EngineError::ContractNotDeployed { .. })
        ));

        assert!(wallet.signature_requests().is_empty());
        assert!(wallet.reads().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_wallet() {
        let wallet = Arc::new(ScriptedWallet::new(USER).disconnected());
        let exec = executor(wallet, Arc::new(StaticAttestations::ok()));
        assert!(matches!(
            exec.sign(mint_params("1")).await,
            Err(EngineError::WalletUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_insufficient_gateway_balance() {
        let wallet = Arc::new(
            ScriptedWallet::new(USER).with_balance(U256::from(2_000_000u64)),
        );
        let exec = executor(wallet.clone(), Arc::new(StaticAttestations::ok()));

        // 1.00 + 2.01 max fee > 2.00
        let err = exec.sign(mint_params("1")).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance(_)));
        assert!(wallet.signature_requests().is_empty());
    }

    #[tokio::test]
    async fn test_signing_rejected_passes_message_through() {
        let wallet = Arc::new(ScriptedWallet::new(USER).rejecting_signatures());
        let exec = executor(wallet, Arc::new(StaticAttestations::ok()));
        let err = exec.sign(mint_params("1")).await.unwrap_err();
        assert_eq!(err, EngineError::SigningRejected("User rejected the request.".into()));
        assert!(matches!(
            exec.state(),
            ExecutionState::Error { phase: Phase::Signing, .. }
        ));
    }

    #[tokio::test]
    async fn test_mint_and_swap_to_native() {
        let wallet = Arc::new(ScriptedWallet::new(USER));
        let attestations = Arc::new(StaticAttestations::ok());
        let exec = executor(wallet.clone(), attestations.clone());

        let mut params = mint_params("100");
        params.output = Asset::Eth;
        params.amount_out_min = Some(U256::from(30_000_000_000_000_000u64));
        exec.sign(params).await.unwrap();

        let intent = &attestations.submissions()[0].burn_intent;
        assert_eq!(intent.spec.destinationCaller, RECEIVER.into_word());
        assert_eq!(intent.spec.destinationRecipient, RECEIVER.into_word());

        let sent = wallet.sent_transactions();
        assert_eq!(sent[0].to, RECEIVER);
        let call = IGatewaySwapReceiver::executeSwapCall::abi_decode(&sent[0].data, true).unwrap();
        assert_eq!(call.outputToken, NATIVE_TOKEN);
        assert_eq!(call.recipient, USER);
        assert_eq!(call.commands.len(), 2);
        assert_eq!(call.commands[1], UNWRAP_WETH);
        assert_eq!(call.inputs.len(), 2);

        let deadline = u64::try_from(call.deadline).unwrap();
        let now = unix_now();
        assert!(deadline > now + 1700 && deadline <= now + 1800);
    }
}
