//! Bridge-aggregator quote client
//!
//! `GET {base}/quote` returns a route estimate together with a ready-to-send
//! transaction. The engine does no bridge selection of its own; whatever the
//! service returns is submitted verbatim.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::amount::parse_quantity;
use super::chains::Chain;
use super::wallet::TxRequest;
use crate::types::{EngineError, EngineResult};

pub const DEFAULT_LIFI_API_URL: &str = "https://li.quest/v1";
pub const DEFAULT_INTEGRATOR: &str = "treasury-ops-bot";

/// Parameters of a quote request, amounts in source-token base units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub from_chain: u64,
    pub to_chain: u64,
    pub from_token: Address,
    pub to_token: Address,
    pub from_amount: U256,
    pub from_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    #[serde(default)]
    pub to_amount: String,
    #[serde(default)]
    pub to_amount_min: String,
    #[serde(default, rename = "toAmountUSD")]
    pub to_amount_usd: Option<String>,
    #[serde(default, rename = "fromAmountUSD")]
    pub from_amount_usd: Option<String>,
}

/// Transaction payload as returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTransaction {
    pub to: Address,
    pub data: Bytes,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub gas_limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tool: String,
    pub estimate: Option<Estimate>,
    pub transaction_request: Option<QuoteTransaction>,
}

impl Quote {
    /// Contract the source token must be approved for
    pub fn spender(&self) -> EngineResult<Address> {
        self.transaction().map(|tx| tx.to)
    }

    /// The quoted transaction with `value` and `gasLimit` decoded, to be
    /// sent on the source `chain`
    pub fn tx_request(&self, chain: Chain) -> EngineResult<TxRequest> {
        let tx = self.transaction()?;
        let value = match tx.value.as_deref() {
            Some(raw) => parse_quantity(raw)?,
            None => U256::ZERO,
        };
        let gas = match tx.gas_limit.as_deref() {
            Some(raw) => Some(u64::try_from(parse_quantity(raw)?).map_err(|_| {
                EngineError::QuoteUnavailable(format!("gas limit {} out of range", raw))
            })?),
            None => None,
        };
        Ok(TxRequest {
            chain,
            to: tx.to,
            data: tx.data.clone(),
            value,
            gas,
        })
    }

    fn transaction(&self) -> EngineResult<&QuoteTransaction> {
        self.transaction_request
            .as_ref()
            .ok_or_else(|| EngineError::QuoteUnavailable("quote has no transactionRequest".into()))
    }
}

#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> EngineResult<Quote>;
}

/// HTTP client for the LI.FI quote API
pub struct LifiClient {
    client: reqwest::Client,
    base_url: String,
    integrator: String,
}

impl LifiClient {
    pub fn new(base_url: impl Into<String>, integrator: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            integrator: integrator.into(),
        }
    }
}

#[async_trait]
impl QuoteService for LifiClient {
    async fn quote(&self, request: &QuoteRequest) -> EngineResult<Quote> {
        let url = format!("{}/quote", self.base_url);
        let query = [
            ("fromChain", request.from_chain.to_string()),
            ("toChain", request.to_chain.to_string()),
            ("fromToken", request.from_token.to_string()),
            ("toToken", request.to_token.to_string()),
            ("fromAmount", request.from_amount.to_string()),
            ("fromAddress", request.from_address.to_string()),
            ("integrator", self.integrator.clone()),
        ];

        tracing::info!(
            from_chain = request.from_chain,
            to_chain = request.to_chain,
            from_amount = %request.from_amount,
            "requesting quote"
        );

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| EngineError::QuoteUnavailable(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| EngineError::QuoteUnavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(EngineError::QuoteUnavailable(format!("status {}: {}", status, text)));
        }

        let quote: Quote = serde_json::from_str(&text)
            .map_err(|e| EngineError::QuoteUnavailable(format!("invalid quote: {}", e)))?;
        if quote.estimate.is_none() {
            return Err(EngineError::QuoteUnavailable("quote has no estimate".into()));
        }
        quote.transaction()?;

        tracing::info!(quote_id = %quote.id, tool = %quote.tool, "quote received");
        Ok(quote)
    }
}

/// Canned quote service for tests and local dry runs
pub mod testing {
    use super::*;
    use std::sync::{Mutex, PoisonError};

    /// Quote whose transaction calls `to` with `value` attached
    pub fn sample_quote(to: Address, value: U256) -> Quote {
        Quote {
            id: "static-quote".to_string(),
            tool: "static".to_string(),
            estimate: Some(Estimate {
                to_amount: "990000".to_string(),
                to_amount_min: "985000".to_string(),
                to_amount_usd: None,
                from_amount_usd: None,
            }),
            transaction_request: Some(QuoteTransaction {
                to,
                data: Bytes::from(vec![0x4c, 0x1f, 0x1d, 0x00]),
                value: Some(format!("{:#x}", value)),
                gas_limit: Some("0x30d40".to_string()),
            }),
        }
    }

    pub struct StaticQuotes {
        result: EngineResult<Quote>,
        requests: Mutex<Vec<QuoteRequest>>,
    }

    impl StaticQuotes {
        pub fn ok(quote: Quote) -> Self {
            Self {
                result: Ok(quote),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(err: EngineError) -> Self {
            Self {
                result: Err(err),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<QuoteRequest> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl QuoteService for StaticQuotes {
        async fn quote(&self, request: &QuoteRequest) -> EngineResult<Quote> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());
            self.result.clone()
        }
    }
}
