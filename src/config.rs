//! Runtime configuration.

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::chains::{Chain, ChainRegistry};
use crate::engine::gateway_client::{
    GatewayClient, DEFAULT_GATEWAY_API_URL, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};
use crate::engine::quote_client::{LifiClient, DEFAULT_INTEGRATOR, DEFAULT_LIFI_API_URL};
use crate::engine::router::Router;
use crate::engine::transfer_spec::DEFAULT_MAX_FEE;
use crate::engine::wallet::RpcWallet;
use crate::engine::{EngineContext, ExecutionSettings, DEFAULT_DEADLINE_SECS, DEFAULT_SLIPPAGE_BPS};

/// Service configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Listen address for the HTTP server.
    pub bind_addr: SocketAddr,
    /// Attestation service base URL.
    pub gateway_api_url: String,
    /// Bridge-aggregator quote API base URL.
    pub lifi_api_url: String,
    /// Integrator id sent with every quote request.
    pub lifi_integrator: String,
    /// Account that funds executions; `None` leaves the wallet disconnected.
    pub treasury_address: Option<Address>,
    /// JSON-RPC endpoint per chain.
    pub rpc_urls: BTreeMap<Chain, String>,
    /// Settlement receiver deployments per chain.
    pub swap_receivers: BTreeMap<Chain, Address>,
    /// Fee ceiling signed into burn intents, stable base units.
    pub max_fee: U256,
    pub attestation_poll_interval: Duration,
    pub attestation_poll_attempts: u32,
    pub slippage_bps: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3001".to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let gateway_api_url =
            lookup("GATEWAY_API_URL").unwrap_or_else(|| DEFAULT_GATEWAY_API_URL.to_string());
        let lifi_api_url = lookup("LIFI_API_URL").unwrap_or_else(|| DEFAULT_LIFI_API_URL.to_string());
        let lifi_integrator =
            lookup("LIFI_INTEGRATOR_ID").unwrap_or_else(|| DEFAULT_INTEGRATOR.to_string());

        let treasury_address = lookup("TREASURY_ADDRESS")
            .map(|raw| Address::from_str(raw.trim()))
            .transpose()
            .context("TREASURY_ADDRESS must be a 20-byte hex address")?;

        let mut rpc_urls = BTreeMap::new();
        let mut swap_receivers = BTreeMap::new();
        for &chain in Chain::all() {
            let suffix = chain.env_suffix();
            if let Some(url) = lookup(&format!("RPC_{}", suffix)) {
                rpc_urls.insert(chain, url);
            }
            let key = format!("GATEWAY_SWAP_RECEIVER_{}", suffix);
            if let Some(raw) = lookup(&key) {
                let receiver = Address::from_str(raw.trim())
                    .with_context(|| format!("{} must be a 20-byte hex address", key))?;
                swap_receivers.insert(chain, receiver);
            }
        }

        let max_fee = match lookup("GATEWAY_MAX_FEE") {
            Some(raw) => U256::from_str_radix(raw.trim(), 10)
                .context("GATEWAY_MAX_FEE must be an integer in base units")?,
            None => U256::from(DEFAULT_MAX_FEE),
        };

        let attestation_poll_interval = lookup("ATTESTATION_POLL_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let attestation_poll_attempts: u32 = lookup("ATTESTATION_POLL_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_ATTEMPTS);

        let slippage_bps: u16 = lookup("DEFAULT_SLIPPAGE_BPS")
            .and_then(|s| s.parse().ok())
            .filter(|bps| *bps <= 10_000)
            .unwrap_or(DEFAULT_SLIPPAGE_BPS);

        Ok(Self {
            bind_addr,
            gateway_api_url,
            lifi_api_url,
            lifi_integrator,
            treasury_address,
            rpc_urls,
            swap_receivers,
            max_fee,
            attestation_poll_interval,
            attestation_poll_attempts,
            slippage_bps,
        })
    }

    /// Production registry with configured receiver deployments applied
    pub fn registry(&self) -> ChainRegistry {
        self.swap_receivers
            .iter()
            .fold(ChainRegistry::mainnet(), |registry, (&chain, &receiver)| {
                registry.with_swap_receiver(chain, receiver)
            })
    }

    pub fn settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            max_fee: self.max_fee,
            slippage_bps: self.slippage_bps,
            deadline_secs: DEFAULT_DEADLINE_SECS,
        }
    }

    /// Wire the engine to the live attestation, quote and RPC services
    pub fn engine_context(&self) -> EngineContext {
        let wallet = RpcWallet::new(
            self.treasury_address,
            self.rpc_urls.clone().into_iter().collect(),
        );
        let attestations = GatewayClient::new(self.gateway_api_url.clone())
            .with_polling(self.attestation_poll_interval, self.attestation_poll_attempts);
        let quotes = LifiClient::new(self.lifi_api_url.clone(), self.lifi_integrator.clone());

        EngineContext {
            registry: Arc::new(self.registry()),
            router: Router::default(),
            wallet: Arc::new(wallet),
            attestations: Arc::new(attestations),
            quotes: Arc::new(quotes),
            settings: self.settings(),
        }
    }
}
