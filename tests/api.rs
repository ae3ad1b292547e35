//! HTTP API tests against in-memory collaborators

use alloy_primitives::{address, Address, U256};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use treasury_router_backend::api::{self, AppState};
use treasury_router_backend::engine::chains::{Chain, ChainRegistry};
use treasury_router_backend::engine::gateway_client::testing::StaticAttestations;
use treasury_router_backend::engine::quote_client::testing::{sample_quote, StaticQuotes};
use treasury_router_backend::engine::router::Router;
use treasury_router_backend::engine::wallet::testing::ScriptedWallet;
use treasury_router_backend::engine::{EngineContext, ExecutionSettings};

const USER: Address = address!("1111111111111111111111111111111111111111");
const USER_HEX: &str = "0x1111111111111111111111111111111111111111";

fn server() -> TestServer {
    server_with(ScriptedWallet::new(USER))
}

fn server_with(wallet: ScriptedWallet) -> TestServer {
    let ctx = EngineContext {
        registry: Arc::new(ChainRegistry::mainnet()),
        router: Router::default(),
        wallet: Arc::new(wallet),
        attestations: Arc::new(StaticAttestations::ok()),
        quotes: Arc::new(StaticQuotes::ok(sample_quote(
            Address::repeat_byte(0x42),
            U256::ZERO,
        ))),
        settings: ExecutionSettings::default(),
    };
    TestServer::new(api::app(AppState::from_context(ctx))).unwrap()
}

async fn wait_for_terminal(server: &TestServer, id: &str) -> Value {
    for _ in 0..100 {
        let body: Value = server.get(&format!("/api/swap/{}", id)).await.json();
        let step = body["state"]["step"].as_str().unwrap_or_default().to_string();
        if step == "success" || step == "error" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {} never settled", id);
}

#[tokio::test]
async fn test_health() {
    let server = server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn test_chains() {
    let server = server();
    let body: Value = server.get("/api/chains").await.json();

    let chains = body["chains"].as_array().unwrap();
    assert_eq!(chains.len(), Chain::all().len());
    let arbitrum = chains.iter().find(|c| c["chain"] == "arbitrum").unwrap();
    assert_eq!(arbitrum["chainId"], 42161);
    assert_eq!(arbitrum["domain"], 3);
    let polygon = chains.iter().find(|c| c["chain"] == "polygon").unwrap();
    assert!(polygon["domain"].is_null());
}

#[tokio::test]
async fn test_route_classification() {
    let server = server();
    let cases = [
        ("arbitrum", "base", "USDC", "USDC", "attested_transfer"),
        ("base", "base", "USDC", "ETH", "direct_swap"),
        ("arbitrum", "base", "USDC", "ETH", "bridge_aggregator"),
    ];
    for (src, dst, src_asset, dst_asset, expected) in cases {
        let body: Value = server
            .post("/api/route")
            .json(&json!({
                "sourceChain": src,
                "destChain": dst,
                "sourceAsset": src_asset,
                "destAsset": dst_asset,
            }))
            .await
            .json();
        assert_eq!(body["route"], expected);
    }
}

#[tokio::test]
async fn test_command_preview() {
    let server = server();
    let response = server
        .post("/api/swap/commands")
        .json(&json!({
            "chain": "arbitrum",
            "sourceAsset": "USDC",
            "destAsset": "ETH",
            "amount": "100",
            "recipient": USER_HEX,
            "amountOutMin": "0.03",
        }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["amountIn"], "100000000");
    assert_eq!(body["amountOutMin"], "30000000000000000");
    assert_eq!(body["amountOutMinFormatted"], "0.03");
    assert_eq!(body["fee"], 500);
    assert_eq!(body["commands"], "0x02000c");
    assert_eq!(body["inputs"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_command_preview_rejects_non_swaps() {
    let server = server();
    let response = server
        .post("/api/swap/commands")
        .json(&json!({
            "chain": "arbitrum",
            "sourceAsset": "ETH",
            "destAsset": "WETH",
            "amount": "1",
            "recipient": USER_HEX,
            "amountOutMin": "1",
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/swap/commands")
        .json(&json!({
            "chain": "arbitrum",
            "sourceAsset": "USDC",
            "destAsset": "ETH",
            "amount": "1",
            "recipient": USER_HEX,
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transfer_spec() {
    let server = server();
    let response = server
        .post("/api/transfer-spec")
        .json(&json!({
            "sourceChain": "arbitrum",
            "destChain": "base",
            "amount": "$1,000",
            "depositor": USER_HEX,
        }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["amount"], "1000.00");
    let spec = &body["burnIntent"]["spec"];
    assert_eq!(spec["sourceDomain"], 3);
    assert_eq!(spec["destinationDomain"], 6);
    assert_eq!(spec["value"], "1000000000");
    assert_eq!(
        spec["destinationRecipient"],
        "0x0000000000000000000000001111111111111111111111111111111111111111"
    );
    assert_eq!(
        spec["destinationCaller"],
        "0x0000000000000000000000000000000000000000000000000000000000000000"
    );
    assert_eq!(body["burnIntent"]["maxFee"], "2010000");
    assert_eq!(body["typedData"]["primaryType"], "BurnIntent");
    assert_eq!(body["typedData"]["domain"]["name"], "GatewayWallet");
    assert_eq!(body["signingHash"].as_str().unwrap().len(), 66);
}

#[tokio::test]
async fn test_transfer_spec_rejects_unmapped_chain() {
    let server = server();
    let response = server
        .post("/api/transfer-spec")
        .json(&json!({
            "sourceChain": "polygon",
            "destChain": "base",
            "amount": "1",
            "depositor": USER_HEX,
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_attested_execution_settles() {
    let server = server();
    let response = server
        .post("/api/swap")
        .json(&json!({
            "sourceChain": "arbitrum",
            "destChain": "base",
            "sourceAsset": "USDC",
            "destAsset": "USDC",
            "amount": "25",
            "depositor": USER_HEX,
        }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);

    let body: Value = response.json();
    assert_eq!(body["route"], "attested_transfer");
    let id = body["id"].as_str().unwrap().to_string();

    let settled = wait_for_terminal(&server, &id).await;
    assert_eq!(settled["state"]["step"], "success", "{}", settled);
    assert_eq!(settled["state"]["evidence"]["chain"], "base");
    assert!(settled["details"]["signature"].is_string());

    let listed: Value = server.get("/api/swaps").await.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reset_and_retry() {
    let server = server();
    let body: Value = server
        .post("/api/swap")
        .json(&json!({
            "sourceChain": "polygon",
            "destChain": "base",
            "sourceAsset": "USDC",
            "destAsset": "USDC",
            "amount": "1",
            "depositor": USER_HEX,
        }))
        .await
        .json();
    let id = body["id"].as_str().unwrap().to_string();

    let failed = wait_for_terminal(&server, &id).await;
    assert_eq!(failed["state"]["step"], "error");
    assert_eq!(failed["state"]["phase"], "idle");
    assert_eq!(failed["state"]["code"], "UNSUPPORTED_CHAIN");

    let reset: Value = server.post(&format!("/api/swap/{}/reset", id)).await.json();
    assert_eq!(reset["state"]["step"], "idle");

    server
        .post(&format!("/api/swap/{}/retry", id))
        .await
        .assert_status_ok();
    let failed_again = wait_for_terminal(&server, &id).await;
    assert_eq!(failed_again["state"]["code"], "UNSUPPORTED_CHAIN");
}

#[tokio::test]
async fn test_retry_while_signing_conflicts() {
    let gate = Arc::new(Notify::new());
    let server = server_with(ScriptedWallet::new(USER).with_sign_gate(gate.clone()));
    let body: Value = server
        .post("/api/swap")
        .json(&json!({
            "sourceChain": "arbitrum",
            "destChain": "base",
            "sourceAsset": "USDC",
            "destAsset": "USDC",
            "amount": "1",
            "depositor": USER_HEX,
        }))
        .await
        .json();
    let id = body["id"].as_str().unwrap().to_string();

    let mut step = String::new();
    for _ in 0..100 {
        let body: Value = server.get(&format!("/api/swap/{}", id)).await.json();
        step = body["state"]["step"].as_str().unwrap_or_default().to_string();
        if step == "signing" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(step, "signing");

    let response = server.post(&format!("/api/swap/{}/retry", id)).await;
    response.assert_status(StatusCode::CONFLICT);
    let conflict: Value = response.json();
    assert_eq!(conflict["code"], "CONFLICT");

    gate.notify_one();
    let settled = wait_for_terminal(&server, &id).await;
    assert_eq!(settled["state"]["step"], "success");
}

#[tokio::test]
async fn test_bad_requests() {
    let server = server();
    let response = server
        .post("/api/swap")
        .json(&json!({
            "sourceChain": "arbitrum",
            "destChain": "base",
            "sourceAsset": "USDC",
            "destAsset": "USDC",
            "amount": "-5",
            "depositor": USER_HEX,
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/api/swap/does-not-exist").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}
