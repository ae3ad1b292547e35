//! Wallet collaborator
//!
//! The engine never holds keys. Everything that needs the user's account
//! (typed-data signatures, transactions, reads) goes through the `Wallet`
//! trait. Every operation names the chain it targets; there is no shared
//! "current chain", so executions on different chains can run side by side.
//! `RpcWallet` forwards to a JSON-RPC endpoint per chain that owns the
//! account (a node with an unlocked account or a remote signer);
//! `testing::ScriptedWallet` is an in-memory stand-in.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::amount::{parse_quantity, to_hex};
use super::chains::Chain;
use super::contracts::{IGatewayWallet, IPermit2, IERC20};
use crate::types::{EngineError, EngineResult};

/// EIP-1193 "user rejected request"
const USER_REJECTED: i64 = 4001;

/// EIP-712 request as sent to `eth_signTypedData_v4`, plus the digest
/// computed locally so callers can log and verify it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataPayload {
    pub domain: Value,
    pub types: Value,
    pub primary_type: String,
    pub message: Value,
    #[serde(skip)]
    pub signing_hash: B256,
}

/// Contract call or value transfer to submit on `chain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxRequest {
    pub chain: Chain,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas: Option<u64>,
}

impl TxRequest {
    pub fn call(chain: Chain, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            chain,
            to,
            data: data.into(),
            value: U256::ZERO,
            gas: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Confirmation of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    /// Connected account, `None` when disconnected
    fn address(&self) -> Option<Address>;

    /// Waits for the user without a timeout. `chain` selects the signer
    /// endpoint; the typed data carries its own domain.
    async fn sign_typed_data(&self, chain: Chain, payload: &TypedDataPayload) -> EngineResult<Bytes>;

    /// Submit on `tx.chain`
    async fn send_transaction(&self, tx: &TxRequest) -> EngineResult<B256>;

    /// Read-only call
    async fn call(&self, chain: Chain, to: Address, data: Bytes) -> EngineResult<Bytes>;

    async fn wait_for_receipt(&self, chain: Chain, tx_hash: B256) -> EngineResult<TxReceipt>;
}

/// Connected address or `WalletUnavailable`
pub fn require_address(wallet: &dyn Wallet) -> EngineResult<Address> {
    wallet
        .address()
        .ok_or_else(|| EngineError::WalletUnavailable("wallet not connected".into()))
}

pub async fn erc20_balance(
    wallet: &dyn Wallet,
    chain: Chain,
    token: Address,
    owner: Address,
) -> EngineResult<U256> {
    let data = IERC20::balanceOfCall { account: owner }.abi_encode();
    let out = wallet.call(chain, token, data.into()).await?;
    decode_u256(&out, "balanceOf")
}

pub async fn erc20_allowance(
    wallet: &dyn Wallet,
    chain: Chain,
    token: Address,
    owner: Address,
    spender: Address,
) -> EngineResult<U256> {
    let data = IERC20::allowanceCall { owner, spender }.abi_encode();
    let out = wallet.call(chain, token, data.into()).await?;
    decode_u256(&out, "allowance")
}

/// Permit2 sub-allowance of `owner` for `spender` on `token`: amount and
/// expiry timestamp
pub async fn permit2_allowance(
    wallet: &dyn Wallet,
    chain: Chain,
    permit2: Address,
    owner: Address,
    token: Address,
    spender: Address,
) -> EngineResult<(U256, u64)> {
    let data = IPermit2::allowanceCall {
        user: owner,
        token,
        spender,
    }
    .abi_encode();
    let out = wallet.call(chain, permit2, data.into()).await?;
    let amount = decode_u256(&out, "allowance")?;
    let expiration = decode_u256(out.get(32..).unwrap_or_default(), "allowance expiration")?;
    Ok((amount, u64::try_from(expiration).unwrap_or(u64::MAX)))
}

/// Balance deposited with the gateway and not yet committed to a transfer
pub async fn gateway_available_balance(
    wallet: &dyn Wallet,
    chain: Chain,
    gateway: Address,
    token: Address,
    depositor: Address,
) -> EngineResult<U256> {
    let data = IGatewayWallet::availableBalanceCall { token, depositor }.abi_encode();
    let out = wallet.call(chain, gateway, data.into()).await?;
    decode_u256(&out, "availableBalance")
}

/// Submit, wait for the receipt and map a failed status to `OnChainRevert`
pub async fn send_and_confirm(wallet: &dyn Wallet, tx: &TxRequest) -> EngineResult<B256> {
    let hash = wallet.send_transaction(tx).await?;
    tracing::info!(tx_hash = %hash, chain = %tx.chain, to = %tx.to, "transaction submitted");

    let receipt = wallet.wait_for_receipt(tx.chain, hash).await?;
    if !receipt.success {
        return Err(EngineError::OnChainRevert(format!("transaction {} reverted", hash)));
    }
    tracing::info!(tx_hash = %hash, block = ?receipt.block_number, "transaction confirmed");
    Ok(receipt.transaction_hash)
}

fn decode_u256(data: &[u8], what: &str) -> EngineResult<U256> {
    if data.len() < 32 {
        return Err(EngineError::Transport(format!(
            "{} returned {} bytes",
            what,
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[..32]))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// JSON-RPC wallet with one endpoint per chain
pub struct RpcWallet {
    client: reqwest::Client,
    address: Option<Address>,
    endpoints: HashMap<Chain, String>,
    receipt_poll_interval: Duration,
    receipt_poll_attempts: u32,
}

impl RpcWallet {
    pub fn new(address: Option<Address>, endpoints: HashMap<Chain, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            address,
            endpoints,
            receipt_poll_interval: Duration::from_secs(2),
            receipt_poll_attempts: 90,
        }
    }

    pub fn with_receipt_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_poll_attempts = attempts;
        self
    }

    fn endpoint(&self, chain: Chain) -> EngineResult<&str> {
        self.endpoints.get(&chain).map(String::as_str).ok_or_else(|| {
            EngineError::WalletUnavailable(format!("no RPC endpoint for {}", chain.display_name()))
        })
    }

    async fn request(&self, chain: Chain, method: &str, params: Value) -> EngineResult<Value> {
        let url = self.endpoint(chain)?;
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        tracing::debug!(method, %chain, url, "rpc request");
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("{}: {}", method, e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| EngineError::Transport(format!("{}: {}", method, e)))?;
        if !status.is_success() {
            return Err(EngineError::Transport(format!("{} status {}: {}", method, status, text)));
        }

        let parsed: JsonRpcResponse = serde_json::from_str(&text)
            .map_err(|e| EngineError::Transport(format!("{}: bad response: {}", method, e)))?;
        if let Some(err) = parsed.error {
            return Err(classify_rpc_error(method, err));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    fn from_address(&self) -> EngineResult<Address> {
        require_address(self)
    }
}

fn classify_rpc_error(method: &str, err: JsonRpcError) -> EngineError {
    if err.code == USER_REJECTED {
        return EngineError::SigningRejected(err.message);
    }
    if err.message.to_lowercase().contains("revert") {
        return EngineError::OnChainRevert(err.message);
    }
    EngineError::Transport(format!("{} error {}: {}", method, err.code, err.message))
}

fn value_str<'a>(value: &'a Value, method: &str) -> EngineResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| EngineError::Transport(format!("{} returned {}", method, value)))
}

fn parse_hex_bytes(raw: &str) -> EngineResult<Bytes> {
    hex::decode(raw.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|e| EngineError::Transport(format!("bad hex {}: {}", raw, e)))
}

fn parse_hash(raw: &str) -> EngineResult<B256> {
    raw.parse::<B256>()
        .map_err(|e| EngineError::Transport(format!("bad hash {}: {}", raw, e)))
}

#[async_trait]
impl Wallet for RpcWallet {
    fn address(&self) -> Option<Address> {
        self.address
    }

    async fn sign_typed_data(&self, chain: Chain, payload: &TypedDataPayload) -> EngineResult<Bytes> {
        let from = self.from_address()?;
        let typed = serde_json::to_string(payload)
            .map_err(|e| EngineError::Transport(format!("typed data: {}", e)))?;
        let result = self
            .request(chain, "eth_signTypedData_v4", json!([from.to_string(), typed]))
            .await?;
        parse_hex_bytes(value_str(&result, "eth_signTypedData_v4")?)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> EngineResult<B256> {
        let from = self.from_address()?;
        let mut call = json!({
            "from": from.to_string(),
            "to": tx.to.to_string(),
            "data": to_hex(&tx.data),
            "value": format!("{:#x}", tx.value),
            "chainId": format!("{:#x}", tx.chain.chain_id()),
        });
        if let Some(gas) = tx.gas {
            call["gas"] = json!(format!("{:#x}", gas));
        }
        let result = self
            .request(tx.chain, "eth_sendTransaction", json!([call]))
            .await?;
        parse_hash(value_str(&result, "eth_sendTransaction")?)
    }

    async fn call(&self, chain: Chain, to: Address, data: Bytes) -> EngineResult<Bytes> {
        let result = self
            .request(
                chain,
                "eth_call",
                json!([{ "to": to.to_string(), "data": to_hex(&data) }, "latest"]),
            )
            .await?;
        parse_hex_bytes(value_str(&result, "eth_call")?)
    }

    async fn wait_for_receipt(&self, chain: Chain, tx_hash: B256) -> EngineResult<TxReceipt> {
        for _ in 0..self.receipt_poll_attempts {
            let result = self
                .request(chain, "eth_getTransactionReceipt", json!([tx_hash.to_string()]))
                .await?;

            if !result.is_null() {
                let status = result["status"].as_str().unwrap_or("0x1");
                let block_number = result["blockNumber"]
                    .as_str()
                    .and_then(|b| parse_quantity(b).ok())
                    .and_then(|b| u64::try_from(b).ok());
                return Ok(TxReceipt {
                    transaction_hash: tx_hash,
                    block_number,
                    success: status != "0x0",
                });
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
        Err(EngineError::Transport(format!(
            "no receipt for {} after {} attempts",
            tx_hash, self.receipt_poll_attempts
        )))
    }
}

/// In-memory wallet for tests and local dry runs
pub mod testing {
    use super::*;
    use alloy_sol_types::SolValue;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Scripted responses: balances, allowances, rejection and revert flags.
    /// Records every signature request, transaction and read together with
    /// the chain it targeted.
    pub struct ScriptedWallet {
        address: Option<Address>,
        balance: Mutex<U256>,
        allowance: Mutex<U256>,
        permit2_allowance: Mutex<(U256, u64)>,
        reject_signing: bool,
        revert: bool,
        sign_gate: Option<Arc<Notify>>,
        send_gate: Option<Arc<Notify>>,
        signature_requests: Mutex<Vec<TypedDataPayload>>,
        sent: Mutex<Vec<TxRequest>>,
        reads: Mutex<Vec<(Chain, Address)>>,
    }

    impl ScriptedWallet {
        pub fn new(address: Address) -> Self {
            Self {
                address: Some(address),
                balance: Mutex::new(U256::MAX),
                allowance: Mutex::new(U256::ZERO),
                permit2_allowance: Mutex::new((U256::ZERO, 0)),
                reject_signing: false,
                revert: false,
                sign_gate: None,
                send_gate: None,
                signature_requests: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                reads: Mutex::new(Vec::new()),
            }
        }

        pub fn disconnected(mut self) -> Self {
            self.address = None;
            self
        }

        /// Answer for `balanceOf` and `availableBalance`
        pub fn with_balance(self, balance: U256) -> Self {
            *lock(&self.balance) = balance;
            self
        }

        /// Answer for ERC-20 `allowance`
        pub fn with_allowance(self, allowance: U256) -> Self {
            *lock(&self.allowance) = allowance;
            self
        }

        /// Answer for the Permit2 `allowance` read
        pub fn with_permit2_allowance(self, amount: U256, expiration: u64) -> Self {
            *lock(&self.permit2_allowance) = (amount, expiration);
            self
        }

        pub fn rejecting_signatures(mut self) -> Self {
            self.reject_signing = true;
            self
        }

        pub fn reverting(mut self) -> Self {
            self.revert = true;
            self
        }

        /// Hold every signature request until the gate is notified
        pub fn with_sign_gate(mut self, gate: Arc<Notify>) -> Self {
            self.sign_gate = Some(gate);
            self
        }

        /// Record each transaction, then hold it until the gate is notified
        pub fn with_send_gate(mut self, gate: Arc<Notify>) -> Self {
            self.send_gate = Some(gate);
            self
        }

        pub fn signature_requests(&self) -> Vec<TypedDataPayload> {
            lock(&self.signature_requests).clone()
        }

        pub fn sent_transactions(&self) -> Vec<TxRequest> {
            lock(&self.sent).clone()
        }

        /// Read-only calls as (chain, contract)
        pub fn reads(&self) -> Vec<(Chain, Address)> {
            lock(&self.reads).clone()
        }
    }

    #[async_trait]
    impl Wallet for ScriptedWallet {
        fn address(&self) -> Option<Address> {
            self.address
        }

        async fn sign_typed_data(&self, _chain: Chain, payload: &TypedDataPayload) -> EngineResult<Bytes> {
            lock(&self.signature_requests).push(payload.clone());
            if let Some(gate) = &self.sign_gate {
                gate.notified().await;
            }
            if self.reject_signing {
                return Err(EngineError::SigningRejected("User rejected the request.".into()));
            }
            Ok(Bytes::from(vec![0x11; 65]))
        }

        async fn send_transaction(&self, tx: &TxRequest) -> EngineResult<B256> {
            if self.address.is_none() {
                return Err(EngineError::WalletUnavailable("wallet not connected".into()));
            }
            tokio::task::yield_now().await;

            if let Ok(approve) = IERC20::approveCall::abi_decode(&tx.data, true) {
                *lock(&self.allowance) = approve.amount;
            }
            if let Ok(approve) = IPermit2::approveCall::abi_decode(&tx.data, true) {
                *lock(&self.permit2_allowance) = (
                    U256::from(approve.amount),
                    U256::from(approve.expiration).saturating_to::<u64>(),
                );
            }
            let hash = {
                let mut sent = lock(&self.sent);
                sent.push(tx.clone());
                B256::with_last_byte(sent.len() as u8)
            };

            if let Some(gate) = &self.send_gate {
                gate.notified().await;
            }
            Ok(hash)
        }

        async fn call(&self, chain: Chain, to: Address, data: Bytes) -> EngineResult<Bytes> {
            lock(&self.reads).push((chain, to));
            tokio::task::yield_now().await;

            let selector: [u8; 4] = data
                .get(..4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| EngineError::Transport("call without selector".into()))?;

            if selector == IPermit2::allowanceCall::SELECTOR {
                let (amount, expiration) = *lock(&self.permit2_allowance);
                return Ok(Bytes::from(
                    (amount, U256::from(expiration), U256::ZERO).abi_encode_params(),
                ));
            }

            let value = if selector == IERC20::balanceOfCall::SELECTOR
                || selector == IGatewayWallet::availableBalanceCall::SELECTOR
            {
                *lock(&self.balance)
            } else if selector == IERC20::allowanceCall::SELECTOR {
                *lock(&self.allowance)
            } else {
                return Err(EngineError::Transport(format!(
                    "unscripted call 0x{}",
                    hex::encode(selector)
                )));
            };
            Ok(Bytes::from(value.abi_encode()))
        }

        async fn wait_for_receipt(&self, _chain: Chain, tx_hash: B256) -> EngineResult<TxReceipt> {
            Ok(TxReceipt {
                transaction_hash: tx_hash,
                block_number: Some(1),
                success: !self.revert,
            })
        }
    }
}
