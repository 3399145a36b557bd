//! Celo specialization: adds `feeCurrency` to every signed
//! transaction and asks the backend for a fee-currency-aware gas price.
//! Otherwise identical envelope and handler set to generic EVM, so this
//! wraps an [`EvmBackend`] rather than re-implementing transport.

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::GasPolicy;
use crate::error::GatewayError;
use crate::wallet::WalletSet;

use super::{BackendWrapper, ComposedTransaction};
use super::evm::EvmBackend;

pub struct CeloBackend {
    inner: EvmBackend,
    fee_currency: Option<Address>,
}

impl CeloBackend {
    /// `gas_price_max` is folded into the shared [`GasPolicy`] as
    /// `default_gas_price` so the generic `compose_transaction` threshold
    /// check enforces it without a Celo-specific code
    /// path — Celo's only structural difference is the feeCurrency-aware
    /// price query and the extra field on the signed tx.
    pub fn new(
        inner: EvmBackend,
        fee_currency: Option<Address>,
        gas_price_max: u128,
    ) -> Self {
        let mut policy = inner.gas_policy().clone();
        policy.default_gas_price = gas_price_max;
        Self {
            inner: EvmBackend::new_with_policy(inner, policy),
            fee_currency,
        }
    }

    pub fn fee_currency(&self) -> Option<Address> {
        self.fee_currency
    }
}

#[async_trait]
impl BackendWrapper for CeloBackend {
    fn gas_policy(&self) -> &GasPolicy {
        self.inner.gas_policy()
    }

    fn wallets(&self) -> &WalletSet {
        self.inner.wallets()
    }

    fn chain_id(&self) -> Option<u64> {
        self.inner.chain_id()
    }

    fn fee_currency(&self) -> Option<Address> {
        self.fee_currency
    }

    /// Asks the backend for `eth_gasPrice` with the configured
    /// `feeCurrency`.
    async fn raw_gas_price(&self) -> Result<u128, GatewayError> {
        match self.fee_currency {
            Some(currency) => {
                let result = self
                    .inner
                    .raw_forward("eth_gasPrice", json!([format!("{:#x}", currency)]))
                    .await?;
                result
                    .as_str()
                    .and_then(|s| u128::from_str_radix(s.trim_start_matches("0x"), 16).ok())
                    .ok_or_else(|| GatewayError::InvalidJsonResponse("eth_gasPrice".into()))
            }
            None => self.inner.raw_gas_price().await,
        }
    }

    async fn raw_estimate_gas(&self, tx: &ComposedTransaction) -> Result<u128, GatewayError> {
        self.inner.raw_estimate_gas(tx).await
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, GatewayError> {
        self.inner.transaction_count(address).await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<String, GatewayError> {
        self.inner.send_raw_transaction(raw).await
    }

    async fn raw_forward(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        self.inner.raw_forward(method, params).await
    }
}
