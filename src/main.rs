//! Treasury Router Backend
//!
//! HTTP API server that routes value between chains: same-chain AMM swaps,
//! attested burn-and-mint transfers of the stable asset, and bridge
//! aggregator routes for everything else.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treasury_router_backend::api::{self, AppState};
use treasury_router_backend::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;
    match config.treasury_address {
        Some(address) => tracing::info!("Treasury account: {}", address),
        None => tracing::warn!("TREASURY_ADDRESS not set - executions will fail with WALLET_UNAVAILABLE"),
    }
    for chain in config.rpc_urls.keys() {
        tracing::info!("  RPC configured for {}", chain.display_name());
    }
    for (chain, receiver) in &config.swap_receivers {
        tracing::info!("  Swap receiver on {}: {}", chain.display_name(), receiver);
    }

    let state = AppState::from_context(config.engine_context());
    let app = api::app(state);

    // Start server
    let addr = config.bind_addr;
    tracing::info!("Starting server on {}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health               - Health check");
    tracing::info!("  GET  /api/chains           - Supported chains and contracts");
    tracing::info!("  POST /api/route            - Classify a request");
    tracing::info!("  POST /api/swap/commands    - Preview AMM router commands");
    tracing::info!("  POST /api/transfer-spec    - Build an unsigned burn intent");
    tracing::info!("  POST /api/swap             - Start an execution");
    tracing::info!("  GET  /api/swaps            - List executions");
    tracing::info!("  GET  /api/swap/:id         - Execution state");
    tracing::info!("  POST /api/swap/:id/reset   - Reset an execution");
    tracing::info!("  POST /api/swap/:id/retry   - Reset and re-run an execution");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
