//! Router: the single entry point every request passes through. Five
//! steps, always in this order: rewrite the method name via the backend's
//! translator, preprocess params via the translator, dispatch to a Rust
//! handler or fall through to a raw forward, postprocess the result via
//! the translator, then wrap everything — success or failure — into a
//! [`ResponseEnvelope`] that echoes the request's `id`. No failure at any
//! step escapes this function: every path ends in `Ok` or `Err` handled
//! right here, so exactly one response is produced per request.

use serde_json::Value;

use crate::backend::BackendWrapper;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::GatewayError;
use crate::handlers::{forward, HANDLERS};
use crate::log_http;
use crate::translators::Translator;

/// Everything the Router needs to serve one backend for the lifetime of
/// the process: the wrapper (wallets + downstream connection + gas
/// policy), its translator, and the `interleaveBlocks` staleness knob.
pub struct GatewayContext {
    pub wrapper: Box<dyn BackendWrapper>,
    pub translator: Box<dyn Translator>,
    pub interleave_blocks: u64,
}

impl GatewayContext {
    pub fn new(
        wrapper: Box<dyn BackendWrapper>,
        translator: Box<dyn Translator>,
        interleave_blocks: u64,
    ) -> Self {
        Self {
            wrapper,
            translator,
            interleave_blocks,
        }
    }

    /// Handles one already-decoded JSON-RPC request, producing a response
    /// that always carries the same `id`.
    pub async fn handle(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let id = envelope.id.clone();
        let method = envelope.method.clone();
        let params = envelope.params_array();

        tracing::info!(method = %method, "dispatching request");
        tracing::debug!(method = %method, ?params, "request params");

        match self.dispatch(&method, params).await {
            Ok(result) => {
                log_http!(method = %method, "request succeeded");
                ResponseEnvelope::ok(id, result)
            }
            Err(error) => {
                tracing::warn!(method = %method, error = %error, "request failed");
                ResponseEnvelope::err(id, &error)
            }
        }
    }

    /// Dispatch to a Rust handler when one exists
    /// for this method (handlers apply translation themselves wherever
    /// they still touch the backend's wire dialect); otherwise run the
    /// generic alias → rewrite-params → forward → rewrite-response chain.
    async fn dispatch(&self, method: &str, params: Vec<Value>) -> Result<Value, GatewayError> {
        if let Some(handler) = HANDLERS.get(method) {
            return handler(
                self.wrapper.as_ref(),
                self.translator.as_ref(),
                &params,
                self.interleave_blocks,
            )
            .await;
        }
        forward(
            self.wrapper.as_ref(),
            self.translator.as_ref(),
            method,
            Value::Array(params),
        )
        .await
    }
}

// Router-level integration tests for the literal I/O scenarios of the
// "End-to-end scenarios" spec section: seed-derived account listing, sign
// rejection for an unmanaged address, the gas-price threshold error,
// Conflux block-field translation, Conflux receipt status inversion, and
// Conflux rollback detection. Each stubs its backend with `wiremock`
// rather than hitting a live node, and drives the request the same way
// `main`'s HTTP handler does: build a `GatewayContext`, hand it a decoded
// `RequestEnvelope`, inspect the `ResponseEnvelope` it returns.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::conflux::ConfluxBackend;
    use crate::backend::evm::EvmBackend;
    use crate::config::{ConfluxExtra, EpochLabel, GasPolicy};
    use crate::translators::conflux::{to_cip37, ConfluxTranslator};
    use crate::translators::IdentityTranslator;
    use crate::wallet::WalletSet;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gas_policy(default_gas_price: u128, estimate_gas_price: bool, gas_price_factor: f64) -> GasPolicy {
        GasPolicy {
            default_gas_price,
            default_gas_limit: 6_000_000,
            estimate_gas_price,
            estimate_gas_limit: false,
            gas_price_factor,
            gas_limit_factor: 1.0,
            force_eip155: false,
            force_eip1559: false,
            eth_gas_price_factor: false,
            always_synced: false,
            mock_filters: false,
        }
    }

    fn envelope(id: i64, method: &str, params: serde_json::Value) -> RequestEnvelope {
        RequestEnvelope {
            jsonrpc: "2.0".to_string(),
            id: json!(id),
            method: method.to_string(),
            params,
        }
    }

    fn one_key_wallet() -> String {
        format!("0x{:0>64}", "1")
    }

    fn test_wallets() -> WalletSet {
        WalletSet::build(None, 0, vec![one_key_wallet()], Some(1), &[]).unwrap()
    }

    #[tokio::test]
    async fn unknown_method_with_no_backend_reachable_surfaces_as_generic_error() {
        let wallets = test_wallets();
        let backend = EvmBackend::new(
            url::Url::parse("http://127.0.0.1:1").unwrap(),
            wallets,
            gas_policy(20_000_000_000, true, 1.0),
            Some(1),
        );
        let ctx = GatewayContext::new(Box::new(backend), Box::new(IdentityTranslator), 0);

        let response = ctx.handle(envelope(1, "eth_accounts", json!([]))).await;
        assert_eq!(response.id, json!(1));
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap().as_array().unwrap().len(), 1);
    }

    // Scenario 1: account listing reflects seed-derived wallets in order.
    #[tokio::test]
    async fn accounts_listing_returns_seed_derived_addresses_in_order() {
        let wallets = WalletSet::build(
            Some("test test test test test test test test test test test junk".to_string()),
            2,
            vec![],
            Some(1),
            &[],
        )
        .unwrap();
        let expected: Vec<String> = wallets.addresses().iter().map(|a| format!("{a:#x}")).collect();

        let backend = EvmBackend::new(
            url::Url::parse("http://127.0.0.1:1").unwrap(),
            wallets,
            gas_policy(20_000_000_000, false, 1.0),
            Some(1),
        );
        let ctx = GatewayContext::new(Box::new(backend), Box::new(IdentityTranslator), 0);

        let response = ctx.handle(envelope(7, "eth_accounts", json!([]))).await;
        assert_eq!(response.id, json!(7));
        assert!(response.error.is_none());
        let listed: Vec<String> = response
            .result
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert_eq!(listed, expected);
    }

    // Scenario 2: eth_sign on an address outside the wallet set fails UnknownSigner.
    #[tokio::test]
    async fn sign_rejects_unmanaged_address_with_unknown_signer_error() {
        let wallets = test_wallets();
        let backend = EvmBackend::new(
            url::Url::parse("http://127.0.0.1:1").unwrap(),
            wallets,
            gas_policy(20_000_000_000, false, 1.0),
            Some(1),
        );
        let ctx = GatewayContext::new(Box::new(backend), Box::new(IdentityTranslator), 0);

        let unmanaged = format!("0x{:0>40}", "dead");
        let response = ctx
            .handle(envelope(1, "eth_sign", json!([unmanaged, "0x68656c6c6f"])))
            .await;

        assert!(response.result.is_none());
        let error = response.error.expect("an unmanaged signer must fail");
        assert_eq!(error.code, -32000);
    }

    // Scenario 3: an estimated gas price above `defaultGasPrice` is rejected.
    #[tokio::test]
    async fn gas_price_above_threshold_rejects_send_transaction() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": format!("{:#x}", 25_000_000_000u128),
            })))
            .mount(&mock_server)
            .await;

        let wallets = test_wallets();
        let from = wallets.addresses()[0];
        let backend = EvmBackend::new(
            url::Url::parse(&mock_server.uri()).unwrap(),
            wallets,
            gas_policy(20_000_000_000, true, 1.0),
            Some(1),
        );
        let ctx = GatewayContext::new(Box::new(backend), Box::new(IdentityTranslator), 0);

        let tx = json!({ "from": format!("{from:#x}"), "to": format!("{from:#x}") });
        let response = ctx.handle(envelope(3, "eth_sendTransaction", json!([tx]))).await;

        assert!(response.result.is_none());
        let error = response.error.expect("a gas price above threshold must fail");
        assert_eq!(error.code, -32099);
        assert!(error.message.contains("exceeds threshold"), "{}", error.message);
    }

    // Scenario 4: eth_getBlockByNumber rewrites epochNumber to number/blockNumber
    // and decodes a CIP-37 miner address back to hex.
    #[tokio::test]
    async fn conflux_block_translation_renames_epoch_fields_and_decodes_miner() {
        let miner: alloy_primitives::Address = "0x1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9000".parse().unwrap();
        let miner_cfx = to_cip37(miner, 1029);

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "epochNumber": "0x2a", "miner": miner_cfx },
            })))
            .mount(&mock_server)
            .await;

        let wallets = WalletSet::build(None, 0, vec![one_key_wallet()], None, &[]).unwrap();
        let extra = ConfluxExtra {
            epoch_label: EpochLabel::LatestFinalized,
            confirmation_epochs: 0,
            network_id: 1029,
        };
        let backend = ConfluxBackend::new(
            url::Url::parse(&mock_server.uri()).unwrap(),
            wallets,
            gas_policy(20_000_000_000, false, 1.0),
            extra,
        );
        let translator = ConfluxTranslator {
            network_id: 1029,
            epoch_label: "latest_finalized",
        };
        let ctx = GatewayContext::new(Box::new(backend), Box::new(translator), 0);

        let response = ctx
            .handle(envelope(3, "eth_getBlockByNumber", json!(["latest", false])))
            .await;
        let result = response.result.expect("block translation should succeed");
        assert_eq!(result["epochNumber"], json!("0x2a"));
        assert_eq!(result["number"], json!("0x2a"));
        assert_eq!(result["blockNumber"], json!("0x2a"));
        assert_eq!(result["miner"], json!(format!("{miner:#x}")));
    }

    // Scenario 5: a Conflux receipt's outcomeStatus=0 (success) is exposed as
    // status="0x1", with the original field left untouched alongside it.
    #[tokio::test]
    async fn conflux_receipt_status_inversion_normalizes_to_ethereum_semantics() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "outcomeStatus": 0, "transactionHash": "0xabc" },
            })))
            .mount(&mock_server)
            .await;

        let wallets = WalletSet::build(None, 0, vec![one_key_wallet()], None, &[]).unwrap();
        let extra = ConfluxExtra {
            epoch_label: EpochLabel::LatestState,
            confirmation_epochs: 0,
            network_id: 1029,
        };
        let backend = ConfluxBackend::new(
            url::Url::parse(&mock_server.uri()).unwrap(),
            wallets,
            gas_policy(20_000_000_000, false, 1.0),
            extra,
        );
        let translator = ConfluxTranslator {
            network_id: 1029,
            epoch_label: "latest_state",
        };
        let ctx = GatewayContext::new(Box::new(backend), Box::new(translator), 0);

        let response = ctx
            .handle(envelope(5, "eth_getTransactionReceipt", json!(["0xabc"])))
            .await;
        let result = response.result.expect("receipt translation should succeed");
        assert_eq!(result["status"], json!("0x1"));
        assert_eq!(result["outcomeStatus"], json!(0));
    }
}
