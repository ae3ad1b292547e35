//! Chain and asset catalogue
//!
//! Static lookup tables keyed by chain: attestation-protocol domains, stable
//! asset and wrapped-native contracts, AMM router and settlement receiver
//! deployments. Built once at startup and shared read-only; tests construct
//! alternate registries with `with_chain` / `with_swap_receiver`.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::types::{EngineError, EngineResult};

/// Gateway Wallet, same address on every supported chain
pub const GATEWAY_WALLET: Address = address!("77777777Dcc4d5A8B6E418Fd04D8997ef11000eE");

/// Gateway Minter, same address on every supported chain
pub const GATEWAY_MINTER: Address = address!("2222222d7164433c4C09B0b0D809a9b52C04C205");

/// Permit2, same address on every chain; the AMM router pulls ERC-20 input
/// through it
pub const PERMIT2: Address = address!("000000000022D473030F116dDEE9F6B43aC78BA3");

/// The quote service addresses the chain-native asset with the zero address
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    Ethereum,
    Arbitrum,
    Base,
    Polygon,
    Sepolia,
    ArbitrumSepolia,
    BaseSepolia,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Base => "base",
            Chain::Polygon => "polygon",
            Chain::Sepolia => "sepolia",
            Chain::ArbitrumSepolia => "arbitrum-sepolia",
            Chain::BaseSepolia => "base-sepolia",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "Ethereum",
            Chain::Arbitrum => "Arbitrum",
            Chain::Base => "Base",
            Chain::Polygon => "Polygon",
            Chain::Sepolia => "Ethereum Sepolia",
            Chain::ArbitrumSepolia => "Arbitrum Sepolia",
            Chain::BaseSepolia => "Base Sepolia",
        }
    }

    /// Native EVM chain id (not the attestation-protocol domain)
    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Arbitrum => 42161,
            Chain::Base => 8453,
            Chain::Polygon => 137,
            Chain::Sepolia => 11155111,
            Chain::ArbitrumSepolia => 421614,
            Chain::BaseSepolia => 84532,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.chain_id() == chain_id)
    }

    /// Suffix used for per-chain environment variables (`RPC_ARBITRUM_SEPOLIA`)
    pub fn env_suffix(&self) -> String {
        self.as_str().replace('-', "_").to_uppercase()
    }

    pub fn all() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Arbitrum,
            Chain::Base,
            Chain::Polygon,
            Chain::Sepolia,
            Chain::ArbitrumSepolia,
            Chain::BaseSepolia,
        ]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = EngineError;

    /// Accepts the kebab-case name or the numeric chain id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        if let Ok(id) = normalized.parse::<u64>() {
            return Self::from_chain_id(id).ok_or_else(|| EngineError::UnsupportedChain(s.to_string()));
        }
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| EngineError::UnsupportedChain(s.to_string()))
    }
}

/// Supported assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Eth,
    Usdc,
    Usdt,
    Weth,
    Wbtc,
}

impl Asset {
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Eth => "ETH",
            Asset::Usdc => "USDC",
            Asset::Usdt => "USDT",
            Asset::Weth => "WETH",
            Asset::Wbtc => "WBTC",
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Asset::Usdc | Asset::Usdt => 6,
            Asset::Eth | Asset::Weth | Asset::Wbtc => 18,
        }
    }

    /// True for the chain-native asset (no token contract, paid as tx value)
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Eth)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Asset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ETH" => Ok(Asset::Eth),
            "USDC" => Ok(Asset::Usdc),
            "USDT" => Ok(Asset::Usdt),
            "WETH" => Ok(Asset::Weth),
            "WBTC" => Ok(Asset::Wbtc),
            other => Err(EngineError::UnsupportedPair(format!("unknown asset {}", other))),
        }
    }
}

/// Deployment data for one chain
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainConfig {
    /// Attestation-protocol domain; `None` means the chain is not on the protocol
    pub domain: Option<u32>,
    /// Stable reference asset (USDC) contract
    pub usdc: Option<Address>,
    /// Wrapped native asset (WETH) contract
    pub weth: Option<Address>,
    /// Same-chain AMM command router
    pub universal_router: Option<Address>,
    /// Settlement receiver that mints and swaps in one call
    pub swap_receiver: Option<Address>,
    /// Block explorer base URL
    pub explorer: String,
}

/// Read-only chain registry injected into router, builder and executors
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: BTreeMap<Chain, ChainConfig>,
    gateway_wallet: Address,
    gateway_minter: Address,
}

impl ChainRegistry {
    /// Empty registry with the canonical gateway contracts
    pub fn empty() -> Self {
        Self {
            chains: BTreeMap::new(),
            gateway_wallet: GATEWAY_WALLET,
            gateway_minter: GATEWAY_MINTER,
        }
    }

    /// Production deployments
    pub fn mainnet() -> Self {
        Self::empty()
            .with_chain(
                Chain::Ethereum,
                ChainConfig {
                    domain: Some(0),
                    usdc: Some(address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")),
                    weth: Some(address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")),
                    universal_router: Some(address!("66a9893cc07d91d95644aedd05d03f95e1dba8af")),
                    swap_receiver: None,
                    explorer: "https://etherscan.io".to_string(),
                },
            )
            .with_chain(
                Chain::Arbitrum,
                ChainConfig {
                    domain: Some(3),
                    usdc: Some(address!("af88d065e77c8cC2239327C5EDb3A432268e5831")),
                    weth: Some(address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1")),
                    universal_router: Some(address!("a51afafe0263b40edaef0df8781ea9aa03e381a3")),
                    swap_receiver: None,
                    explorer: "https://arbiscan.io".to_string(),
                },
            )
            .with_chain(
                Chain::Base,
                ChainConfig {
                    domain: Some(6),
                    usdc: Some(address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913")),
                    weth: Some(address!("4200000000000000000000000000000000000006")),
                    universal_router: Some(address!("6ff5693b99212da76ad316178a184ab56d299b43")),
                    swap_receiver: None,
                    explorer: "https://basescan.org".to_string(),
                },
            )
            .with_chain(
                Chain::Polygon,
                ChainConfig {
                    explorer: "https://polygonscan.com".to_string(),
                    ..Default::default()
                },
            )
            .with_chain(
                Chain::Sepolia,
                ChainConfig {
                    explorer: "https://sepolia.etherscan.io".to_string(),
                    ..Default::default()
                },
            )
            .with_chain(
                Chain::ArbitrumSepolia,
                ChainConfig {
                    explorer: "https://sepolia.arbiscan.io".to_string(),
                    ..Default::default()
                },
            )
            .with_chain(
                Chain::BaseSepolia,
                ChainConfig {
                    explorer: "https://sepolia.basescan.org".to_string(),
                    ..Default::default()
                },
            )
    }

    pub fn with_chain(mut self, chain: Chain, config: ChainConfig) -> Self {
        self.chains.insert(chain, config);
        self
    }

    /// Register a settlement receiver deployment. The zero address is ignored.
    pub fn with_swap_receiver(mut self, chain: Chain, receiver: Address) -> Self {
        if receiver != Address::ZERO {
            self.chains.entry(chain).or_default().swap_receiver = Some(receiver);
        }
        self
    }

    pub fn config(&self, chain: Chain) -> Option<&ChainConfig> {
        self.chains.get(&chain)
    }

    pub fn chains(&self) -> impl Iterator<Item = (Chain, &ChainConfig)> {
        self.chains.iter().map(|(chain, cfg)| (*chain, cfg))
    }

    pub fn gateway_wallet(&self) -> Address {
        self.gateway_wallet
    }

    pub fn gateway_minter(&self) -> Address {
        self.gateway_minter
    }

    /// Attestation-protocol domain. Unmapped chains are a hard failure.
    pub fn domain(&self, chain: Chain) -> EngineResult<u32> {
        self.config(chain)
            .and_then(|c| c.domain)
            .ok_or_else(|| EngineError::UnsupportedChain(format!("{} has no transfer domain", chain)))
    }

    pub fn stable_token(&self, chain: Chain) -> EngineResult<Address> {
        self.config(chain)
            .and_then(|c| c.usdc)
            .ok_or_else(|| EngineError::NoTokenForChain {
                asset: Asset::Usdc.to_string(),
                chain: chain.to_string(),
            })
    }

    pub fn wrapped_native(&self, chain: Chain) -> Option<Address> {
        self.config(chain).and_then(|c| c.weth)
    }

    /// Contract address for `asset` on `chain`; the native asset maps to `NATIVE_TOKEN`
    pub fn token_address(&self, chain: Chain, asset: Asset) -> EngineResult<Address> {
        let address = match asset {
            Asset::Eth => Some(NATIVE_TOKEN),
            Asset::Usdc => self.config(chain).and_then(|c| c.usdc),
            Asset::Weth => self.wrapped_native(chain),
            Asset::Usdt | Asset::Wbtc => None,
        };
        address.ok_or_else(|| EngineError::NoTokenForChain {
            asset: asset.to_string(),
            chain: chain.to_string(),
        })
    }

    pub fn universal_router(&self, chain: Chain) -> EngineResult<Address> {
        self.config(chain)
            .and_then(|c| c.universal_router)
            .ok_or_else(|| EngineError::ContractNotDeployed {
                contract: "UniversalRouter",
                chain: chain.to_string(),
            })
    }

    pub fn swap_receiver(&self, chain: Chain) -> EngineResult<Address> {
        self.config(chain)
            .and_then(|c| c.swap_receiver)
            .filter(|addr| *addr != Address::ZERO)
            .ok_or_else(|| EngineError::ContractNotDeployed {
                contract: "GatewaySwapReceiver",
                chain: chain.to_string(),
            })
    }

    pub fn explorer_tx_url(&self, chain: Chain, tx_hash: &str) -> String {
        let base = self
            .config(chain)
            .map(|c| c.explorer.as_str())
            .unwrap_or("https://etherscan.io");
        format!("{}/tx/{}", base, tx_hash)
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::mainnet()
    }
}
