//! Conflux Core Space backend — the hardest of the non-EVM cases.
//!
//! Talks `cfx_*` JSON-RPC to the node; parameter/response translation and
//! rollback detection live in [`crate::translators::conflux`]. This module
//! is the transport + threshold-enforcement layer that
//! [`crate::backend::compose_transaction`] runs against.

use alloy_primitives::{Address, Bytes};
use alloy_rpc_client::RpcClient;
use alloy_transport_http::Http;
use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::config::{ConfluxExtra, GasPolicy};
use crate::error::GatewayError;
use crate::rollback::RollbackState;
use crate::wallet::WalletSet;

use super::{BackendWrapper, ComposedTransaction};

pub struct ConfluxBackend {
    client: RpcClient,
    wallets: WalletSet,
    gas_policy: GasPolicy,
    pub extra: ConfluxExtra,
    pub rollback: RollbackState,
}

impl ConfluxBackend {
    pub fn new(url: Url, wallets: WalletSet, gas_policy: GasPolicy, extra: ConfluxExtra) -> Self {
        let client = RpcClient::new(Http::new(url), false);
        Self {
            client,
            wallets,
            gas_policy,
            extra,
            rollback: RollbackState::new(0),
        }
    }

    /// Fetches the current epoch number at the configured epoch label.
    /// Used both for `eth_blockNumber`→`cfx_epochNumber` forwarding and for
    /// rollback detection ahead of every read-only `cfx_call`.
    pub async fn epoch_at_label(&self, label: &str) -> Result<u64, GatewayError> {
        let result: Value = self
            .client
            .request::<_, Value>("cfx_epochNumber", vec![Value::String(label.to_string())])
            .await
            .map_err(|e| GatewayError::Generic(format!("cfx_epochNumber failed: {e}")))?;
        let hex = result
            .as_str()
            .ok_or_else(|| GatewayError::InvalidJsonResponse("cfx_epochNumber".into()))?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|_| GatewayError::InvalidJsonResponse("cfx_epochNumber".into()))
    }

    /// Rollback detection: before every read-only `cfx_call`,
    /// fetch the epoch at the configured label and compare to
    /// `lastKnownEpoch`. Never aborts; only traces and updates state, then
    /// returns the epoch the call itself should bind to (offset by
    /// `confirmationEpochs` when configured).
    pub async fn check_rollbacks(&self) -> Result<u64, GatewayError> {
        let observed = self.epoch_at_label(self.extra.epoch_label.as_str()).await?;
        match self.rollback.observe(observed, self.extra.confirmation_epochs) {
            crate::rollback::RollbackObservation::Advanced => {}
            crate::rollback::RollbackObservation::Filtered { gap } => {
                tracing::warn!(gap, observed, "Conflux epoch rollback observed (filtered)");
            }
            crate::rollback::RollbackObservation::Compromising { gap } => {
                tracing::error!(gap, observed, "Conflux epoch rollback observed (compromising)");
            }
        }
        Ok(observed.saturating_sub(self.extra.confirmation_epochs))
    }
}

#[async_trait]
impl BackendWrapper for ConfluxBackend {
    fn gas_policy(&self) -> &GasPolicy {
        &self.gas_policy
    }

    fn wallets(&self) -> &WalletSet {
        &self.wallets
    }

    fn chain_id(&self) -> Option<u64> {
        None
    }

    async fn raw_gas_price(&self) -> Result<u128, GatewayError> {
        let result: Value = self
            .client
            .request::<_, Value>("cfx_gasPrice", Vec::<Value>::new())
            .await
            .map_err(|e| GatewayError::Generic(format!("cfx_gasPrice failed: {e}")))?;
        result
            .as_str()
            .and_then(|s| u128::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| GatewayError::InvalidJsonResponse("cfx_gasPrice".into()))
    }

    async fn raw_estimate_gas(&self, tx: &ComposedTransaction) -> Result<u128, GatewayError> {
        let mut obj = serde_json::Map::new();
        if let Some(from) = tx.from {
            obj.insert("from".into(), json!(format!("{:#x}", from)));
        }
        if let Some(to) = tx.to {
            obj.insert("to".into(), json!(format!("{:#x}", to)));
        }
        if let Some(value) = tx.value {
            obj.insert("value".into(), json!(format!("{:#x}", value)));
        }
        if let Some(data) = &tx.data {
            obj.insert("data".into(), json!(format!("0x{}", hex::encode(data))));
        }
        let result: Value = self
            .client
            .request::<_, Value>("cfx_estimateGasAndCollateral", vec![Value::Object(obj)])
            .await
            .map_err(|e| GatewayError::Generic(format!("cfx_estimateGasAndCollateral failed: {e}")))?;
        result
            .get("gasUsed")
            .and_then(Value::as_str)
            .and_then(|s| u128::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| GatewayError::InvalidJsonResponse("cfx_estimateGasAndCollateral".into()))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, GatewayError> {
        // `cfx_getNextNonce` expects a CIP-37 address; translation happens
        // in the router before this is ever reached for `eth_getTransactionCount`,
        // but the nonce-acquisition suspension point inside `compose_transaction`
        // always deals in plain hex, so we translate here too.
        let cip37 = crate::translators::conflux::to_cip37(address, self.extra.network_id);
        let result: Value = self
            .client
            .request::<_, Value>("cfx_getNextNonce", vec![Value::String(cip37)])
            .await
            .map_err(|e| GatewayError::Generic(format!("cfx_getNextNonce failed: {e}")))?;
        let hex = result
            .as_str()
            .ok_or_else(|| GatewayError::InvalidJsonResponse("cfx_getNextNonce".into()))?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|_| GatewayError::InvalidJsonResponse("cfx_getNextNonce".into()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<String, GatewayError> {
        let result: Value = self
            .client
            .request::<_, Value>(
                "cfx_sendRawTransaction",
                vec![Value::String(format!("0x{}", hex::encode(&raw)))],
            )
            .await
            .map_err(|e| GatewayError::Generic(format!("cfx_sendRawTransaction failed: {e}")))?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| GatewayError::InvalidJsonResponse("cfx_sendRawTransaction".into()))
    }

    async fn raw_forward(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let params_array = match params {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        self.client
            .request::<_, Value>(method.to_string(), params_array)
            .await
            .map_err(|e| GatewayError::Generic(format!("{method} forward failed: {e}")))
    }

    /// `interleaveBlocks == 0` skips rollback detection entirely (the
    /// zero-cost path); otherwise runs it and binds the call to the epoch
    /// `checkRollbacks` already resolved (`lastKnownEpoch − confirmationEpochs`,
    /// per spec §4.4/§8 scenario 6 — `interleaveBlocks` gates *whether*
    /// rollback detection runs at all, it is not a second offset stacked
    /// on top of `confirmationEpochs`).
    async fn resolve_read_tag(&self, interleave_blocks: u64) -> Result<Option<String>, GatewayError> {
        if interleave_blocks == 0 {
            return Ok(None);
        }
        let target = self.check_rollbacks().await?;
        Ok(Some(format!("{target:#x}")))
    }
}

// Scenario 6 of the "End-to-end scenarios" spec section: a rollback is
// never fatal. A gap below `confirmationEpochs` logs a warning and still
// resolves a bound epoch; a gap at or above it logs an error and still
// resolves one.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EpochLabel;
    use crate::wallet::WalletSet;

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn one_key_wallet() -> WalletSet {
        let key = format!("0x{:0>64}", "1");
        WalletSet::build(None, 0, vec![key], None, &[]).unwrap()
    }

    fn gas_policy() -> GasPolicy {
        GasPolicy {
            default_gas_price: 20_000_000_000,
            default_gas_limit: 6_000_000,
            estimate_gas_price: false,
            estimate_gas_limit: false,
            gas_price_factor: 1.0,
            gas_limit_factor: 1.0,
            force_eip155: false,
            force_eip1559: false,
            eth_gas_price_factor: false,
            always_synced: false,
            mock_filters: false,
        }
    }

    #[tokio::test]
    async fn rollback_below_confirmation_gap_still_resolves_bound_epoch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x5f", // 95
            })))
            .mount(&mock_server)
            .await;

        let extra = ConfluxExtra {
            epoch_label: EpochLabel::LatestState,
            confirmation_epochs: 12,
            network_id: 1029,
        };
        let backend = ConfluxBackend::new(
            url::Url::parse(&mock_server.uri()).unwrap(),
            one_key_wallet(),
            gas_policy(),
            extra,
        );
        backend.rollback.observe(100, 12); // seed lastKnownEpoch = 100

        let bound_epoch = backend.check_rollbacks().await.unwrap();
        assert_eq!(backend.rollback.last_known(), 95);
        assert_eq!(bound_epoch, 95 - 12);
    }

    #[tokio::test]
    async fn rollback_at_or_above_confirmation_gap_still_resolves_bound_epoch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x50", // 80
            })))
            .mount(&mock_server)
            .await;

        let extra = ConfluxExtra {
            epoch_label: EpochLabel::LatestState,
            confirmation_epochs: 12,
            network_id: 1029,
        };
        let backend = ConfluxBackend::new(
            url::Url::parse(&mock_server.uri()).unwrap(),
            one_key_wallet(),
            gas_policy(),
            extra,
        );
        backend.rollback.observe(95, 12); // seed lastKnownEpoch = 95

        let bound_epoch = backend.check_rollbacks().await.unwrap();
        assert_eq!(backend.rollback.last_known(), 80);
        assert_eq!(bound_epoch, 80 - 12);
    }
}
