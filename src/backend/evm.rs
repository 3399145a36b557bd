//! Generic EVM-compatible backend (Infura-style included), reached via a
//! plain Ethereum JSON-RPC client. zkSync-era is EVM-compatible at the
//! JSON-RPC surface this gateway touches, so it reuses this wrapper
//! unmodified — it needs no dedicated specialization, unlike
//! Conflux/Celo/Reef (see DESIGN.md).

use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::BlockId;
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::config::GasPolicy;
use crate::error::GatewayError;
use crate::wallet::WalletSet;

use super::{BackendWrapper, ComposedTransaction};

/// Generic EVM/Infura backend wrapper.
pub struct EvmBackend {
    provider: RootProvider,
    wallets: WalletSet,
    gas_policy: GasPolicy,
    chain_id: Option<u64>,
}

impl EvmBackend {
    pub fn new(url: Url, wallets: WalletSet, gas_policy: GasPolicy, chain_id: Option<u64>) -> Self {
        let provider = ProviderBuilder::new().connect_http(url);
        Self {
            provider,
            wallets,
            gas_policy,
            chain_id,
        }
    }

    pub fn wallets(&self) -> &WalletSet {
        &self.wallets
    }

    /// Rebuilds this wrapper with a different [`GasPolicy`], keeping the
    /// same provider and wallet set. Used by [`super::celo::CeloBackend`]
    /// to fold `gasPriceMax` into the shared threshold field.
    pub fn new_with_policy(self, gas_policy: GasPolicy) -> Self {
        Self { gas_policy, ..self }
    }
}

#[async_trait]
impl BackendWrapper for EvmBackend {
    fn gas_policy(&self) -> &GasPolicy {
        &self.gas_policy
    }

    fn wallets(&self) -> &WalletSet {
        &self.wallets
    }

    fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    async fn raw_gas_price(&self) -> Result<u128, GatewayError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| GatewayError::Generic(format!("eth_gasPrice failed: {e}")))
    }

    async fn raw_estimate_gas(&self, tx: &ComposedTransaction) -> Result<u128, GatewayError> {
        let request = to_transaction_request(tx);
        let estimate = self
            .provider
            .estimate_gas(request)
            .block(BlockId::pending())
            .await
            .map_err(|e| GatewayError::Generic(format!("eth_estimateGas failed: {e}")))?;
        Ok(estimate as u128)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, GatewayError> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(|e| GatewayError::Generic(format!("eth_getTransactionCount failed: {e}")))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<String, GatewayError> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| GatewayError::Generic(format!("eth_sendRawTransaction failed: {e}")))?;
        Ok(format!("{:#x}", pending.tx_hash()))
    }

    async fn raw_forward(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let params_array = match params {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        self.provider
            .client()
            .request(method.to_string(), params_array)
            .await
            .map_err(|e| GatewayError::Generic(format!("{method} forward failed: {e}")))
    }
}

/// Builds an `alloy` transaction request from our backend-neutral
/// [`ComposedTransaction`], for gas estimation purposes only (signing
/// happens later, after nonce resolution, via `Wallet::sign_transaction`).
pub fn to_transaction_request(tx: &ComposedTransaction) -> alloy_rpc_types_eth::TransactionRequest {
    use alloy_network::TransactionBuilder;

    let mut req = alloy_rpc_types_eth::TransactionRequest::default();
    if let Some(from) = tx.from {
        req = req.with_from(from);
    }
    if let Some(to) = tx.to {
        req = req.with_to(to);
    }
    if let Some(value) = tx.value {
        req = req.with_value(value);
    }
    if let Some(data) = &tx.data {
        req = req.with_input(data.clone());
    }
    if let Some(nonce) = tx.nonce {
        req = req.with_nonce(nonce);
    }
    if let Some(gas_price) = tx.gas_price {
        req = req.with_gas_price(gas_price);
    }
    if let Some(gas_limit) = tx.gas_limit {
        req = req.with_gas_limit(gas_limit as u64);
    }
    if let Some(max_fee) = tx.max_fee_per_gas {
        req = req.with_max_fee_per_gas(max_fee);
    }
    if let Some(max_priority) = tx.max_priority_fee_per_gas {
        req = req.with_max_priority_fee_per_gas(max_priority);
    }
    if let Some(chain_id) = tx.chain_id {
        req = req.with_chain_id(chain_id);
    }
    if let Some(fee_currency) = tx.fee_currency {
        req.other.insert("feeCurrency".to_string(), serde_json::json!(format!("{fee_currency:#x}")));
    }
    req
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_request_round_trips_value() {
        let mut tx = ComposedTransaction::default();
        tx.value = Some(U256::from(42u64));
        let request = to_transaction_request(&tx);
        assert_eq!(request.value, Some(U256::from(42u64)));
    }
}
