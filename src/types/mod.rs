//! Shared types and error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the routing and execution engine.
///
/// None of these are retried internally. Executors record them in their
/// `Error` state and hand them back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("no {asset} token configured for chain {chain}")]
    NoTokenForChain { asset: String, chain: String },

    #[error("{contract} is not deployed on {chain}")]
    ContractNotDeployed { contract: &'static str, chain: String },

    #[error("unsupported pair: {0}")]
    UnsupportedPair(String),

    #[error("fee tier {0} does not fit in 24 bits")]
    InvalidFeeTier(u32),

    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("signing rejected: {0}")]
    SigningRejected(String),

    #[error("attestation service error: {0}")]
    AttestationServiceError(String),

    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("transaction reverted: {0}")]
    OnChainRevert(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("execution in progress: {0}")]
    Busy(String),

    #[error("execution was reset while an operation was in flight")]
    Superseded,

    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    /// Stable machine-readable code, used in execution state and API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidAmount(_) => "INVALID_AMOUNT",
            EngineError::InvalidAddress(_) => "INVALID_ADDRESS",
            EngineError::UnsupportedChain(_) => "UNSUPPORTED_CHAIN",
            EngineError::NoTokenForChain { .. } => "NO_TOKEN_FOR_CHAIN",
            EngineError::ContractNotDeployed { .. } => "CONTRACT_NOT_DEPLOYED",
            EngineError::UnsupportedPair(_) => "UNSUPPORTED_PAIR",
            EngineError::InvalidFeeTier(_) => "INVALID_FEE_TIER",
            EngineError::WalletUnavailable(_) => "WALLET_UNAVAILABLE",
            EngineError::SigningRejected(_) => "SIGNING_REJECTED",
            EngineError::AttestationServiceError(_) => "ATTESTATION_SERVICE_ERROR",
            EngineError::QuoteUnavailable(_) => "QUOTE_UNAVAILABLE",
            EngineError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            EngineError::OnChainRevert(_) => "ON_CHAIN_REVERT",
            EngineError::Transport(_) => "TRANSPORT_ERROR",
            EngineError::Busy(_) => "BUSY",
            EngineError::Superseded => "SUPERSEDED",
            EngineError::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Input problems that are detected before any signature or network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidAmount(_)
                | EngineError::InvalidAddress(_)
                | EngineError::UnsupportedChain(_)
                | EngineError::NoTokenForChain { .. }
                | EngineError::ContractNotDeployed { .. }
                | EngineError::UnsupportedPair(_)
                | EngineError::InvalidFeeTier(_)
        )
    }
}

/// API error types
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            e if e.is_validation() => ApiError::BadRequest(err.to_string()),
            EngineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::Busy(_) | EngineError::Superseded => ApiError::Conflict(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
