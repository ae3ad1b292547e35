//! Transfer descriptor and burn intent
//!
//! Builds the chain-agnostic `TransferSpec` for the attested burn-and-mint
//! protocol, wraps it in the fee-bearing `BurnIntent` that is actually
//! signed, and renders both as EIP-712 typed data and as the JSON body the
//! attestation service accepts.
//!
//! Every address-like field is a 32-byte identifier. The signing domain is
//! `{name: "GatewayWallet", version: "1"}` with no chain id and no verifying
//! contract; the service rejects signatures over any other domain.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use rand::{rngs::OsRng, RngCore};
use serde_json::{json, Value};
use std::borrow::Cow;

use super::amount::{address_to_identifier, to_hex};
use super::chains::{Chain, ChainRegistry};
use super::wallet::TypedDataPayload;
use crate::types::EngineResult;

sol! {
    /// Cross-chain transfer descriptor
    #[derive(Debug, PartialEq, Eq)]
    struct TransferSpec {
        uint32 version;
        uint32 sourceDomain;
        uint32 destinationDomain;
        bytes32 sourceContract;
        bytes32 destinationContract;
        bytes32 sourceToken;
        bytes32 destinationToken;
        bytes32 sourceDepositor;
        bytes32 destinationRecipient;
        bytes32 sourceSigner;
        bytes32 destinationCaller;
        uint256 value;
        bytes32 salt;
        bytes hookData;
    }

    /// Signed authorization to burn on the source domain
    #[derive(Debug, PartialEq, Eq)]
    struct BurnIntent {
        uint256 maxBlockHeight;
        uint256 maxFee;
        TransferSpec spec;
    }
}

/// Wire version of the transfer descriptor
pub const TRANSFER_SPEC_VERSION: u32 = 1;

/// Default service fee ceiling in stable base units (2.01)
pub const DEFAULT_MAX_FEE: u64 = 2_010_000;

pub const GATEWAY_DOMAIN_NAME: &str = "GatewayWallet";
pub const GATEWAY_DOMAIN_VERSION: &str = "1";

/// Inputs to `build_transfer_spec`
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub source_chain: Chain,
    pub dest_chain: Chain,
    /// Stable-asset base units
    pub value: U256,
    pub depositor: Address,
    pub recipient: Address,
    /// Only this address may settle on the destination; zero means anyone
    pub caller: Address,
    pub hook_data: Option<Bytes>,
}

/// Resolve domains and stable-asset contracts, pack identifiers and draw a
/// fresh random salt.
pub fn build_transfer_spec(
    registry: &ChainRegistry,
    params: &TransferParams,
) -> EngineResult<TransferSpec> {
    let source_domain = registry.domain(params.source_chain)?;
    let destination_domain = registry.domain(params.dest_chain)?;
    let source_token = registry.stable_token(params.source_chain)?;
    let destination_token = registry.stable_token(params.dest_chain)?;

    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);

    Ok(TransferSpec {
        version: TRANSFER_SPEC_VERSION,
        sourceDomain: source_domain,
        destinationDomain: destination_domain,
        sourceContract: address_to_identifier(registry.gateway_wallet()),
        destinationContract: address_to_identifier(registry.gateway_minter()),
        sourceToken: address_to_identifier(source_token),
        destinationToken: address_to_identifier(destination_token),
        sourceDepositor: address_to_identifier(params.depositor),
        destinationRecipient: address_to_identifier(params.recipient),
        sourceSigner: address_to_identifier(params.depositor),
        destinationCaller: address_to_identifier(params.caller),
        value: params.value,
        salt: B256::from(salt),
        hookData: params.hook_data.clone().unwrap_or_default(),
    })
}

impl BurnIntent {
    /// Wrap a spec with an explicit fee ceiling and no block-height expiry
    pub fn new(spec: TransferSpec, max_fee: U256) -> Self {
        Self {
            maxBlockHeight: U256::MAX,
            maxFee: max_fee,
            spec,
        }
    }

    pub fn with_max_block_height(mut self, height: U256) -> Self {
        self.maxBlockHeight = height;
        self
    }

    /// Digest the wallet signs
    pub fn signing_hash(&self) -> B256 {
        self.eip712_signing_hash(&gateway_domain())
    }

    /// JSON form shared by the typed-data message and the service body.
    /// Integers wider than 32 bits are decimal strings; bytes are 0x-hex.
    pub fn to_json(&self) -> Value {
        json!({
            "maxBlockHeight": self.maxBlockHeight.to_string(),
            "maxFee": self.maxFee.to_string(),
            "spec": self.spec.to_json(),
        })
    }

    /// `eth_signTypedData_v4` payload
    pub fn typed_data(&self) -> TypedDataPayload {
        TypedDataPayload {
            domain: json!({
                "name": GATEWAY_DOMAIN_NAME,
                "version": GATEWAY_DOMAIN_VERSION,
            }),
            types: typed_data_types(),
            primary_type: "BurnIntent".to_string(),
            message: self.to_json(),
            signing_hash: self.signing_hash(),
        }
    }
}

impl TransferSpec {
    pub fn to_json(&self) -> Value {
        json!({
            "version": self.version,
            "sourceDomain": self.sourceDomain,
            "destinationDomain": self.destinationDomain,
            "sourceContract": to_hex(self.sourceContract),
            "destinationContract": to_hex(self.destinationContract),
            "sourceToken": to_hex(self.sourceToken),
            "destinationToken": to_hex(self.destinationToken),
            "sourceDepositor": to_hex(self.sourceDepositor),
            "destinationRecipient": to_hex(self.destinationRecipient),
            "sourceSigner": to_hex(self.sourceSigner),
            "destinationCaller": to_hex(self.destinationCaller),
            "value": self.value.to_string(),
            "salt": to_hex(self.salt),
            "hookData": to_hex(&self.hookData),
        })
    }
}

/// EIP-712 domain: name and version only
pub fn gateway_domain() -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Borrowed(GATEWAY_DOMAIN_NAME)),
        Some(Cow::Borrowed(GATEWAY_DOMAIN_VERSION)),
        None,
        None,
        None,
    )
}

fn typed_data_types() -> Value {
    let field = |name: &str, ty: &str| json!({ "name": name, "type": ty });
    json!({
        "EIP712Domain": [field("name", "string"), field("version", "string")],
        "TransferSpec": [
            field("version", "uint32"),
            field("sourceDomain", "uint32"),
            field("destinationDomain", "uint32"),
            field("sourceContract", "bytes32"),
            field("destinationContract", "bytes32"),
            field("sourceToken", "bytes32"),
            field("destinationToken", "bytes32"),
            field("sourceDepositor", "bytes32"),
            field("destinationRecipient", "bytes32"),
            field("sourceSigner", "bytes32"),
            field("destinationCaller", "bytes32"),
            field("value", "uint256"),
            field("salt", "bytes32"),
            field("hookData", "bytes"),
        ],
        "BurnIntent": [
            field("maxBlockHeight", "uint256"),
            field("maxFee", "uint256"),
            field("spec", "TransferSpec"),
        ],
    })
}
