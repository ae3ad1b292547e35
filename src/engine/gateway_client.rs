//! Attestation service client
//!
//! Submits signed burn intents to `POST /v1/transfer` and returns the
//! attestation. The service usually answers synchronously; when it only
//! returns a transfer id the client polls `GET /v1/transfer/{id}` on a fixed
//! interval and gives up after a bounded number of attempts.

use alloy_primitives::Bytes;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::amount::to_hex;
use super::transfer_spec::BurnIntent;
use crate::types::{EngineError, EngineResult};

pub const DEFAULT_GATEWAY_API_URL: &str = "https://gateway-api.circle.com";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_ATTEMPTS: u32 = 60;

/// Burn intent together with the depositor's EIP-712 signature
#[derive(Debug, Clone)]
pub struct SignedBurnIntent {
    pub burn_intent: BurnIntent,
    pub signature: Bytes,
}

impl SignedBurnIntent {
    /// One batch entry; integers as decimal strings, bytes as 0x-hex
    pub fn to_json(&self) -> Value {
        json!({
            "burnIntent": self.burn_intent.to_json(),
            "signature": to_hex(&self.signature),
        })
    }
}

/// Opaque proof consumed by the destination-chain settlement call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub attestation: Bytes,
    pub signature: Bytes,
    pub transfer_id: Option<String>,
}

#[async_trait]
pub trait AttestationService: Send + Sync {
    async fn submit(&self, signed: &SignedBurnIntent) -> EngineResult<Attestation>;
}

/// HTTP client for the gateway attestation API
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    async fn get_json(&self, url: &str) -> EngineResult<Value> {
        let resp = self.client.get(url).send().await.map_err(service_error)?;
        read_json(resp).await
    }

    async fn poll(&self, transfer_id: &str) -> EngineResult<Attestation> {
        let url = format!("{}/v1/transfer/{}", self.base_url, transfer_id);

        for attempt in 1..=self.poll_attempts {
            let body = self.get_json(&url).await?;
            if let Some(attestation) = extract_attestation(&body, Some(transfer_id))? {
                tracing::info!(transfer_id, attempt, "attestation ready");
                return Ok(attestation);
            }
            if body["status"].as_str() == Some("failed") {
                let reason = body["error"].as_str().unwrap_or("unknown error");
                return Err(EngineError::AttestationServiceError(format!(
                    "transfer {} failed: {}",
                    transfer_id, reason
                )));
            }
            tracing::debug!(transfer_id, attempt, "attestation pending");
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(EngineError::AttestationServiceError(format!(
            "attestation for {} not ready after {} attempts",
            transfer_id, self.poll_attempts
        )))
    }
}

#[async_trait]
impl AttestationService for GatewayClient {
    async fn submit(&self, signed: &SignedBurnIntent) -> EngineResult<Attestation> {
        let url = format!("{}/v1/transfer", self.base_url);
        let body = json!([signed.to_json()]);

        tracing::info!(
            url = %url,
            value = %signed.burn_intent.spec.value,
            source_domain = signed.burn_intent.spec.sourceDomain,
            destination_domain = signed.burn_intent.spec.destinationDomain,
            "submitting burn intent"
        );

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(service_error)?;
        let body = read_json(resp).await?;

        // A batch of one may come back as an object or a one-element array
        let entry = match &body {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };

        let transfer_id = entry["transferId"].as_str().map(str::to_string);
        if let Some(attestation) = extract_attestation(&entry, transfer_id.as_deref())? {
            return Ok(attestation);
        }
        match transfer_id {
            Some(id) => {
                tracing::info!(transfer_id = %id, "attestation pending, polling");
                self.poll(&id).await
            }
            None => Err(EngineError::AttestationServiceError(format!(
                "response has neither attestation nor transferId: {}",
                entry
            ))),
        }
    }
}

fn service_error(err: reqwest::Error) -> EngineError {
    EngineError::AttestationServiceError(err.to_string())
}

async fn read_json(resp: reqwest::Response) -> EngineResult<Value> {
    let status = resp.status();
    let text = resp.text().await.map_err(service_error)?;
    if !status.is_success() {
        return Err(EngineError::AttestationServiceError(format!(
            "status {}: {}",
            status, text
        )));
    }
    serde_json::from_str(&text)
        .map_err(|e| EngineError::AttestationServiceError(format!("invalid JSON: {}", e)))
}

fn extract_attestation(body: &Value, transfer_id: Option<&str>) -> EngineResult<Option<Attestation>> {
    let (Some(attestation), Some(signature)) =
        (body["attestation"].as_str(), body["signature"].as_str())
    else {
        return Ok(None);
    };
    Ok(Some(Attestation {
        attestation: decode_hex(attestation)?,
        signature: decode_hex(signature)?,
        transfer_id: transfer_id.map(str::to_string),
    }))
}

fn decode_hex(raw: &str) -> EngineResult<Bytes> {
    hex::decode(raw.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|e| EngineError::AttestationServiceError(format!("bad hex {}: {}", raw, e)))
}

/// Canned attestation service for tests and local dry runs
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::sync::Notify;

    pub struct StaticAttestations {
        result: EngineResult<Attestation>,
        gate: Option<Arc<Notify>>,
        submitted: Mutex<Vec<SignedBurnIntent>>,
    }

    impl StaticAttestations {
        pub fn ok() -> Self {
            Self::with_result(Ok(Attestation {
                attestation: Bytes::from(vec![0xa7; 32]),
                signature: Bytes::from(vec![0x5e; 65]),
                transfer_id: Some("static".to_string()),
            }))
        }

        pub fn failing(err: EngineError) -> Self {
            Self::with_result(Err(err))
        }

        fn with_result(result: EngineResult<Attestation>) -> Self {
            Self {
                result,
                gate: None,
                submitted: Mutex::new(Vec::new()),
            }
        }

        /// Hold every submission until the gate is notified
        pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn submissions(&self) -> Vec<SignedBurnIntent> {
            self.submitted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl AttestationService for StaticAttestations {
        async fn submit(&self, signed: &SignedBurnIntent) -> EngineResult<Attestation> {
            self.submitted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(signed.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result.clone()
        }
    }
}
