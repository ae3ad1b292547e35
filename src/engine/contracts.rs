//! On-chain ABI surface
//!
//! Calldata for the token, gateway, settlement receiver, Permit2 and AMM
//! router contracts the executors talk to.

use alloy_sol_types::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    /// Source-side deposit contract
    #[derive(Debug, PartialEq, Eq)]
    interface IGatewayWallet {
        function availableBalance(address token, address depositor) external view returns (uint256);
    }

    /// Destination-side mint contract
    #[derive(Debug, PartialEq, Eq)]
    interface IGatewayMinter {
        function gatewayMint(bytes attestationPayload, bytes signature) external;
    }

    /// Mints from an attestation and swaps the proceeds in one call
    #[derive(Debug, PartialEq, Eq)]
    interface IGatewaySwapReceiver {
        function executeSwap(
            bytes attestation,
            bytes signature,
            bytes commands,
            bytes[] inputs,
            uint256 deadline,
            address outputToken,
            address recipient
        ) external;
    }

    /// Signature-transfer and allowance hub the AMM router pulls tokens through
    #[derive(Debug, PartialEq, Eq)]
    interface IPermit2 {
        function allowance(address user, address token, address spender)
            external
            view
            returns (uint160 amount, uint48 expiration, uint48 nonce);
        function approve(address token, address spender, uint160 amount, uint48 expiration) external;
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IUniversalRouter {
        function execute(bytes commands, bytes[] inputs, uint256 deadline) external payable;
    }
}
