//! Bidirectional converters between Ethereum JSON-RPC shape and a
//! backend's native shape: parameter rewriting on the way in, response
//! rewriting on the way out. Translators are side-effect-free except for
//! tracing.

pub mod conflux;
pub mod reef;

use serde_json::Value;

use crate::error::GatewayError;

/// A translator for one backend. The Router looks translators up by the
/// *original* Ethereum method name: translators encode what Ethereum
/// clients send, while handlers encode what a backend natively understands.
pub trait Translator: Send + Sync {
    /// Rewrites the method name if this backend speaks a different
    /// dialect (e.g. Conflux's `cfx_*` aliases). Returns `None` when the
    /// method is forwarded under its original name.
    fn method_alias(&self, original_method: &str) -> Option<&'static str>;

    /// Rewrites `params` from Ethereum shape to backend shape. A no-op
    /// default suits backends with no parameter dialect of their own.
    fn rewrite_params(&self, _original_method: &str, params: Value) -> Result<Value, GatewayError> {
        Ok(params)
    }

    /// Rewrites a successful `result` from backend shape back to Ethereum
    /// shape. Only invoked when the original method was `eth_*` and the
    /// result is a structured (object/array) value.
    fn rewrite_response(&self, _original_method: &str, result: Value) -> Value {
        result
    }
}

/// A translator that does nothing: used by backends that speak native
/// Ethereum JSON-RPC already (generic EVM, Infura, zkSync).
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn method_alias(&self, _original_method: &str) -> Option<&'static str> {
        None
    }
}
