//! Treasury Router Backend
//!
//! Routes value transfers between EVM chains and assets without the caller
//! picking a venue. A request is classified into one of three settlement
//! paths (same-chain AMM swap, attested burn-and-mint transfer, bridge
//! aggregator) and driven through that path's state machine.

pub mod api;
pub mod config;
pub mod engine;
pub mod types;
