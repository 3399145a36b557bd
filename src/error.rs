//! The gateway's error taxonomy.
//!
//! Every layer maps its native errors into [`GatewayError`] exactly once, at
//! the boundary where it would otherwise propagate out of the crate (the
//! Router, a `BackendWrapper`, or a translator). The Router's envelope
//! construction is then a single match over this enum rather than a
//! throw-with-structured-body control flow.

use serde_json::Value;

/// Abstract error kinds, each carrying a fixed JSON-RPC error code.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Parse error: {0}")]
    MalformedRequest(String),

    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown signer for address {0}")]
    UnknownSigner(String),

    #[error("Unknown filter id {0}")]
    UnsupportedFilter(String),

    #[error("Execution reverted: {0}")]
    ExecutionError(String),

    #[error("Gas price {estimated} exceeds threshold {threshold}")]
    GasPriceAboveThreshold { estimated: u128, threshold: u128 },

    #[error("Gas limit {estimated} exceeds threshold {threshold}")]
    GasLimitAboveThreshold { estimated: u128, threshold: u128 },

    #[error("Unable to predict gas price: {0}")]
    UnpredictableGasPrice(String),

    #[error("Unable to predict gas limit: {0}")]
    UnpredictableGasLimit(String),

    #[error("Backend returned a body that could not be parsed as JSON: {0}")]
    InvalidJsonResponse(String),

    /// A backend error that already carried its own JSON-RPC `{code, message,
    /// data}` triple. Passed through unchanged except for envelope wrapping.
    #[error("{message}")]
    Upstream {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("{0}")]
    Generic(String),
}

impl GatewayError {
    /// The JSON-RPC error code for this kind.
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::MalformedRequest(_) => -32700,
            GatewayError::UnknownMethod(_) => -32601,
            GatewayError::InvalidParameter(_) => -32602,
            GatewayError::UnknownSigner(_) => -32000,
            GatewayError::UnsupportedFilter(_) => -32500,
            GatewayError::ExecutionError(_) => -32015,
            GatewayError::GasPriceAboveThreshold { .. }
            | GatewayError::GasLimitAboveThreshold { .. }
            | GatewayError::UnpredictableGasPrice(_)
            | GatewayError::UnpredictableGasLimit(_) => -32099,
            GatewayError::InvalidJsonResponse(_) => -32700,
            GatewayError::Upstream { code, .. } => *code,
            GatewayError::Generic(_) => -32099,
        }
    }

    /// Extra structured detail to place in the error envelope's `data` field.
    pub fn data(&self) -> Option<Value> {
        match self {
            GatewayError::Upstream { data, .. } => data.clone(),
            _ => None,
        }
    }

    /// Wraps a backend-reported error lacking its own `code` as an
    /// [`ExecutionError`](Self::ExecutionError), stashing the original
    /// stringification in `data`.
    pub fn from_codeless_backend_error(body: impl Into<String>) -> Self {
        GatewayError::ExecutionError(body.into())
    }
}

/// Invalid CIP-37/hex address conversion, surfaced as [`GatewayError::InvalidParameter`].
#[derive(Debug, thiserror::Error)]
pub enum AddressTranslationError {
    #[error("not a valid 20-byte hex address: {0}")]
    InvalidHex(String),
    #[error("not a valid CIP-37 address: {0}")]
    InvalidCip37(String),
    #[error("address network id {found} does not match configured network id {expected}")]
    NetworkMismatch { expected: u32, found: u32 },
}

impl From<AddressTranslationError> for GatewayError {
    fn from(value: AddressTranslationError) -> Self {
        GatewayError::InvalidParameter(value.to_string())
    }
}
