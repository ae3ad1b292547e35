//! AMM router command encoding
//!
//! Builds the opcode string and per-opcode ABI argument blobs consumed by the
//! Universal Router `execute` entry point (and forwarded verbatim by the
//! settlement receiver's `executeSwap`).

use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::SolValue;
use serde::Serialize;

use super::chains::{Chain, ChainRegistry};
use crate::types::{EngineError, EngineResult};

/// Swap an exact input amount along a v3 path
pub const V3_SWAP_EXACT_IN: u8 = 0x00;
/// Pull tokens from the caller through its Permit2 allowance
pub const PERMIT2_TRANSFER_FROM: u8 = 0x02;
/// Wrap `msg.value` of the native asset into the wrapped token
pub const WRAP_ETH: u8 = 0x0b;
/// Unwrap the router's wrapped-token balance and send the native asset
pub const UNWRAP_WETH: u8 = 0x0c;

/// Router sentinel: keep the output inside the router for the next command
pub const ADDRESS_THIS: Address = address!("0000000000000000000000000000000000000002");

/// Largest fee that fits the 3-byte path field
const MAX_FEE: u32 = 0x00FF_FFFF;

/// Inputs to `build_commands`
#[derive(Debug, Clone)]
pub struct SwapParams {
    pub chain: Chain,
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub token_in: Address,
    pub token_out: Address,
    pub recipient: Address,
    pub fee: u32,
}

/// Opcodes plus one encoded input per opcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapCommands {
    pub commands: Bytes,
    pub inputs: Vec<Bytes>,
}

impl SwapCommands {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Prefix the sequence with a wrap of `amount` native value into the
    /// router, for swaps paid in the chain-native asset.
    pub fn with_native_input(self, amount: U256) -> Self {
        self.prepend(WRAP_ETH, (ADDRESS_THIS, amount).abi_encode_params())
    }

    /// Prefix the sequence with a Permit2 pull of `amount` of `token` from
    /// the caller into the router, for swaps paid in an ERC-20. The caller
    /// must hold a Permit2 allowance for the router.
    pub fn with_permit2_input(self, token: Address, amount: U256) -> EngineResult<Self> {
        if amount.bit_len() > 160 {
            return Err(EngineError::InvalidAmount(format!(
                "{} exceeds the Permit2 amount range",
                amount
            )));
        }
        // (token, recipient, uint160 amount); a uint160 encodes as a full word
        let input = (token, ADDRESS_THIS, amount).abi_encode_params();
        Ok(self.prepend(PERMIT2_TRANSFER_FROM, input))
    }

    fn prepend(self, command: u8, input: Vec<u8>) -> Self {
        let mut commands = Vec::with_capacity(self.commands.len() + 1);
        commands.push(command);
        commands.extend_from_slice(&self.commands);

        let mut inputs = Vec::with_capacity(self.inputs.len() + 1);
        inputs.push(Bytes::from(input));
        inputs.extend(self.inputs);

        Self {
            commands: Bytes::from(commands),
            inputs,
        }
    }
}

/// Pack a single-hop v3 path: token_in (20) | fee (3, big-endian) | token_out (20)
pub fn encode_path(token_in: Address, fee: u32, token_out: Address) -> EngineResult<Bytes> {
    if fee > MAX_FEE {
        return Err(EngineError::InvalidFeeTier(fee));
    }
    let mut path = Vec::with_capacity(43);
    path.extend_from_slice(token_in.as_slice());
    path.extend_from_slice(&fee.to_be_bytes()[1..]);
    path.extend_from_slice(token_out.as_slice());
    Ok(Bytes::from(path))
}

/// Build router commands for an exact-input single-hop swap.
///
/// When `token_out` is the chain's wrapped native token the output is
/// delivered as the native asset: the swap lands in the router and an unwrap
/// command forwards it to the recipient under the same minimum.
pub fn build_commands(registry: &ChainRegistry, params: &SwapParams) -> EngineResult<SwapCommands> {
    let path = encode_path(params.token_in, params.fee, params.token_out)?;
    let unwrap = registry.wrapped_native(params.chain) == Some(params.token_out);

    let swap_recipient = if unwrap { ADDRESS_THIS } else { params.recipient };
    // payerIsUser = false: the router spends funds it already holds, either
    // pulled in by a preceding command or minted to it by the receiver
    let swap_input = (
        swap_recipient,
        params.amount_in,
        params.amount_out_min,
        path,
        false,
    )
        .abi_encode_params();

    let mut commands = vec![V3_SWAP_EXACT_IN];
    let mut inputs = vec![Bytes::from(swap_input)];

    if unwrap {
        commands.push(UNWRAP_WETH);
        inputs.push(Bytes::from(
            (params.recipient, params.amount_out_min).abi_encode_params(),
        ));
    }

    tracing::debug!(
        chain = %params.chain,
        commands = %hex::encode(&commands),
        fee = params.fee,
        "built swap commands"
    );

    Ok(SwapCommands {
        commands: Bytes::from(commands),
        inputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    type SwapInput = (Address, U256, U256, Bytes, bool);

    fn params(token_out: Address) -> SwapParams {
        let registry = ChainRegistry::mainnet();
        SwapParams {
            chain: Chain::Arbitrum,
            amount_in: U256::from(100_000_000u64),
            amount_out_min: U256::from(12_345u64),
            token_in: registry.stable_token(Chain::Arbitrum).unwrap(),
            token_out,
            recipient: address!("1111111111111111111111111111111111111111"),
            fee: 500,
        }
    }

    #[test]
    fn test_path_layout() {
        let a = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let b = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let path = encode_path(a, 3000, b).unwrap();

        assert_eq!(path.len(), 43);
        assert_eq!(&path[..20], a.as_slice());
        assert_eq!(&path[20..23], &[0x00, 0x0b, 0xb8]);
        assert_eq!(&path[23..], b.as_slice());
    }

    #[test]
    fn test_fee_wider_than_three_bytes_is_rejected() {
        let a = Address::ZERO;
        assert!(matches!(
            encode_path(a, 0x0100_0000, a),
            Err(EngineError::InvalidFeeTier(_))
        ));
        assert!(encode_path(a, MAX_FEE, a).is_ok());
    }

    #[test]
    fn test_token_output_is_single_command() {
        let registry = ChainRegistry::mainnet();
        let token_out = address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9");
        let p = params(token_out);
        let cmds = build_commands(&registry, &p).unwrap();

        assert_eq!(cmds.commands.as_ref(), &[V3_SWAP_EXACT_IN]);
        assert_eq!(cmds.inputs.len(), 1);

        let (recipient, amount_in, min_out, path, payer_is_user) =
            SwapInput::abi_decode_params(&cmds.inputs[0], true).unwrap();
        assert_eq!(recipient, p.recipient);
        assert_eq!(amount_in, p.amount_in);
        assert_eq!(min_out, p.amount_out_min);
        assert_eq!(path, encode_path(p.token_in, 500, token_out).unwrap());
        assert!(!payer_is_user);
    }

    #[test]
    fn test_native_output_adds_unwrap_with_same_minimum() {
        let registry = ChainRegistry::mainnet();
        let weth = registry.wrapped_native(Chain::Arbitrum).unwrap();
        let p = params(weth);
        let cmds = build_commands(&registry, &p).unwrap();

        assert_eq!(cmds.commands.as_ref(), &[V3_SWAP_EXACT_IN, UNWRAP_WETH]);
        assert_eq!(cmds.inputs.len(), 2);

        let (swap_recipient, _, swap_min, _, _) =
            SwapInput::abi_decode_params(&cmds.inputs[0], true).unwrap();
        let (unwrap_recipient, unwrap_min) =
            <(Address, U256)>::abi_decode_params(&cmds.inputs[1], true).unwrap();

        assert_eq!(swap_recipient, ADDRESS_THIS);
        assert_eq!(unwrap_recipient, p.recipient);
        assert_eq!(swap_min, unwrap_min);
        assert_eq!(unwrap_min, p.amount_out_min);
    }

    #[test]
    fn test_native_input_prefixes_wrap() {
        let registry = ChainRegistry::mainnet();
        let p = params(address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"));
        let cmds = build_commands(&registry, &p)
            .unwrap()
            .with_native_input(p.amount_in);

        assert_eq!(cmds.commands.as_ref(), &[WRAP_ETH, V3_SWAP_EXACT_IN]);
        assert_eq!(cmds.len(), cmds.inputs.len());
        let (wrap_recipient, wrap_amount) =
            <(Address, U256)>::abi_decode_params(&cmds.inputs[0], true).unwrap();
        assert_eq!(wrap_recipient, ADDRESS_THIS);
        assert_eq!(wrap_amount, p.amount_in);
    }

    #[test]
    fn test_token_input_prefixes_permit2_pull() {
        let registry = ChainRegistry::mainnet();
        let weth = registry.wrapped_native(Chain::Arbitrum).unwrap();
        let p = params(weth);
        let cmds = build_commands(&registry, &p)
            .unwrap()
            .with_permit2_input(p.token_in, p.amount_in)
            .unwrap();

        assert_eq!(
            cmds.commands.as_ref(),
            &[PERMIT2_TRANSFER_FROM, V3_SWAP_EXACT_IN, UNWRAP_WETH]
        );
        assert_eq!(cmds.len(), cmds.inputs.len());
        let (token, recipient, amount) =
            <(Address, Address, U256)>::abi_decode_params(&cmds.inputs[0], true).unwrap();
        assert_eq!(token, p.token_in);
        assert_eq!(recipient, ADDRESS_THIS);
        assert_eq!(amount, p.amount_in);

        let (swap_recipient, swap_amount, _, _, payer_is_user) =
            SwapInput::abi_decode_params(&cmds.inputs[1], true).unwrap();
        assert_eq!(swap_recipient, ADDRESS_THIS);
        assert_eq!(swap_amount, amount);
        assert!(!payer_is_user);

        assert!(matches!(
            build_commands(&registry, &p)
                .unwrap()
                .with_permit2_input(p.token_in, U256::MAX),
            Err(EngineError::InvalidAmount(_))
        ));
    }
}
