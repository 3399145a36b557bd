//! BackendWrapper — the component that holds the wallet set, the
//! downstream connection, the tuning knobs, and composes/signs/forwards
//! transactions. Specialized per backend in sibling modules; this module
//! holds the shared contract and the `compose_transaction` algorithm,
//! which is identical across every signing backend and therefore
//! implemented once, generic over the [`BackendWrapper`] trait.

pub mod celo;
pub mod conflux;
pub mod evm;
pub mod reef;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::GasPolicy;
use crate::error::GatewayError;
use crate::wallet::WalletSet;

/// A logical transaction under construction, backend-neutral until a
/// specific `BackendWrapper` turns it into a wire request.
#[derive(Debug, Clone, Default)]
pub struct ComposedTransaction {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: Option<U256>,
    pub data: Option<Bytes>,
    pub nonce: Option<u64>,
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub chain_id: Option<u64>,
    /// `0` legacy, `2` EIP-1559.
    pub tx_type: Option<u8>,
    /// Celo's ERC-20 gas-payment token, folded in by `compose_transaction`
    /// from [`BackendWrapper::fee_currency`]. `None` on every other backend.
    pub fee_currency: Option<Address>,
}

impl ComposedTransaction {
    /// Parses the first positional JSON-RPC param (an object) into a
    /// partially-filled transaction. Unknown/absent fields stay `None`.
    pub fn from_params(value: &Value) -> Result<Self, GatewayError> {
        let obj = value
            .as_object()
            .ok_or_else(|| GatewayError::InvalidParameter("expected transaction object".into()))?;

        let parse_address = |key: &str| -> Result<Option<Address>, GatewayError> {
            match obj.get(key).and_then(Value::as_str) {
                Some(s) => Address::parse_checksummed(s, None)
                    .or_else(|_| s.parse())
                    .map(Some)
                    .map_err(|_| GatewayError::InvalidParameter(format!("invalid address in `{key}`"))),
                None => Ok(None),
            }
        };
        let parse_u256 = |key: &str| -> Result<Option<U256>, GatewayError> {
            match obj.get(key).and_then(Value::as_str) {
                Some(s) => U256::from_str_radix(s.trim_start_matches("0x"), 16)
                    .map(Some)
                    .map_err(|_| GatewayError::InvalidParameter(format!("invalid integer in `{key}`"))),
                None => Ok(None),
            }
        };
        let parse_u128 = |key: &str| -> Result<Option<u128>, GatewayError> {
            match obj.get(key).and_then(Value::as_str) {
                Some(s) => u128::from_str_radix(s.trim_start_matches("0x"), 16)
                    .map(Some)
                    .map_err(|_| GatewayError::InvalidParameter(format!("invalid integer in `{key}`"))),
                None => Ok(None),
            }
        };
        let parse_u64 = |key: &str| -> Result<Option<u64>, GatewayError> {
            match obj.get(key).and_then(Value::as_str) {
                Some(s) => u64::from_str_radix(s.trim_start_matches("0x"), 16)
                    .map(Some)
                    .map_err(|_| GatewayError::InvalidParameter(format!("invalid integer in `{key}`"))),
                None => Ok(None),
            }
        };
        let data = match obj.get("data").or_else(|| obj.get("input")).and_then(Value::as_str) {
            Some(s) => Some(
                Bytes::from_str_hex_or_empty(s)
                    .map_err(|_| GatewayError::InvalidParameter("invalid `data`".into()))?,
            ),
            None => None,
        };

        Ok(ComposedTransaction {
            from: parse_address("from")?,
            to: parse_address("to")?,
            value: parse_u256("value")?,
            data,
            nonce: parse_u64("nonce")?,
            gas_price: parse_u128("gasPrice")?,
            gas_limit: parse_u128("gas")?.or(parse_u128("gasLimit")?),
            max_fee_per_gas: parse_u128("maxFeePerGas")?,
            max_priority_fee_per_gas: parse_u128("maxPriorityFeePerGas")?,
            chain_id: parse_u64("chainId")?,
            tx_type: None,
            fee_currency: None,
        })
    }
}

/// A small extension trait kept local to this module: alloy's `Bytes`
/// doesn't parse an optional `0x` prefix by itself via `FromStr` the way
/// we want for lenient JSON-RPC input.
trait BytesExt: Sized {
    fn from_str_hex_or_empty(s: &str) -> Result<Self, hex::FromHexError>;
}

impl BytesExt for Bytes {
    fn from_str_hex_or_empty(s: &str) -> Result<Self, hex::FromHexError> {
        let trimmed = s.trim_start_matches("0x");
        if trimmed.is_empty() {
            return Ok(Bytes::new());
        }
        hex::decode(trimmed).map(Bytes::from)
    }
}

/// The contract every signing backend (EVM/Conflux/Celo/zkSync/Reef)
/// implements. `rawSend`/forwarding and the three suspension points of
/// `compose_transaction` (getGasPrice, getGasLimit, getTransactionCount)
/// all live here.
#[async_trait]
pub trait BackendWrapper: Send + Sync {
    fn gas_policy(&self) -> &GasPolicy;
    fn wallets(&self) -> &WalletSet;
    /// `None` when the backend doesn't bind a fixed chain id (e.g. Reef).
    fn chain_id(&self) -> Option<u64>;
    /// Celo's fee-currency ERC-20 address, added to every composed
    /// transaction. `None` on every backend but Celo.
    fn fee_currency(&self) -> Option<Address> {
        None
    }

    /// Asks the backend for its current gas price (no factor applied).
    /// Surfaces any backend failure as `UnpredictableGasPrice` — done by
    /// the caller, not here, so this trait stays a thin transport shim.
    async fn raw_gas_price(&self) -> Result<u128, GatewayError>;

    /// Asks the backend to estimate gas for `tx` (no factor applied).
    async fn raw_estimate_gas(&self, tx: &ComposedTransaction) -> Result<u128, GatewayError>;

    /// `eth_getTransactionCount`-equivalent for `address`.
    async fn transaction_count(&self, address: Address) -> Result<u64, GatewayError>;

    /// Submits a signed raw transaction, returning its hash (as `0x`-hex).
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<String, GatewayError>;

    /// Signs and submits a fully composed transaction, returning its hash.
    /// Default: ECDSA-sign with `wallet` (every EVM-family backend —
    /// EVM/Infura/Conflux/Celo/zkSync) and hand the raw RLP to
    /// [`BackendWrapper::send_raw_transaction`]. [`reef::ReefBackend`]
    /// overrides this: Reef has no ECDSA step at all, so it hands the
    /// still-unsigned composed fields straight to its `ReefSigner`, which
    /// sr25519-signs them as a Substrate extrinsic.
    async fn submit_transaction(
        &self,
        tx: &ComposedTransaction,
        wallet: &crate::wallet::Wallet,
    ) -> Result<String, GatewayError> {
        let mut request = evm::to_transaction_request(tx);
        let raw = wallet.sign_transaction(&mut request).await?;
        self.send_raw_transaction(raw).await
    }

    /// Forwards `method`/`params` verbatim to the backend and returns its
    /// raw JSON result, for methods with neither a handler nor a
    /// translator of their own.
    async fn raw_forward(&self, method: &str, params: Value) -> Result<Value, GatewayError>;

    /// Resolves the block/epoch tag a read-only call (`eth_call`) should
    /// bind to, folding in `interleaveBlocks` staleness and any
    /// backend-specific rollback detection. `None` means "let the backend
    /// pick its own latest" — the zero-cost path taken whenever
    /// `interleaveBlocks == 0`. Only [`conflux::ConfluxBackend`] overrides
    /// this; every other backend has no reorg hazard at the epoch
    /// granularity Conflux does.
    async fn resolve_read_tag(&self, _interleave_blocks: u64) -> Result<Option<String>, GatewayError> {
        Ok(None)
    }
}

/// `getGasPrice()`: if `estimate_gas_price`, ask the
/// backend, multiply by `gas_price_factor` (ceiling of ×100 then ÷100),
/// fail iff above `default_gas_price`; else return `default_gas_price`
/// verbatim. Any backend failure surfaces as `UnpredictableGasPrice`.
pub(crate) async fn resolve_gas_price(wrapper: &dyn BackendWrapper) -> Result<u128, GatewayError> {
    let policy = wrapper.gas_policy();
    if !policy.estimate_gas_price {
        return Ok(policy.default_gas_price);
    }
    let raw = wrapper
        .raw_gas_price()
        .await
        .map_err(|e| GatewayError::UnpredictableGasPrice(e.to_string()))?;
    let factored = apply_factor_ceiling(raw, policy.gas_price_factor);
    if factored > policy.default_gas_price {
        return Err(GatewayError::GasPriceAboveThreshold {
            estimated: factored,
            threshold: policy.default_gas_price,
        });
    }
    Ok(factored)
}

/// `getGasLimit()`, symmetric to `resolve_gas_price`.
async fn resolve_gas_limit(
    wrapper: &dyn BackendWrapper,
    tx: &ComposedTransaction,
) -> Result<u128, GatewayError> {
    let policy = wrapper.gas_policy();
    if !policy.estimate_gas_limit {
        return Ok(policy.default_gas_limit);
    }
    let raw = wrapper
        .raw_estimate_gas(tx)
        .await
        .map_err(|e| GatewayError::UnpredictableGasLimit(e.to_string()))?;
    let factored = apply_factor_ceiling(raw, policy.gas_limit_factor);
    if factored > policy.default_gas_limit {
        return Err(GatewayError::GasLimitAboveThreshold {
            estimated: factored,
            threshold: policy.default_gas_limit,
        });
    }
    Ok(factored)
}

/// `ceiling(ceiling(value * factor * 100) / 100)`: the rounding rule for
/// multiplicative gas factors. The inner ceiling rounds up to the nearest
/// cent-of-gwei at `factor`'s own precision; the outer one then rounds that
/// back up to a whole unit, so a factor like `1.005` applied to `3` reports
/// `4` rather than silently discounting the threshold to `3`.
pub(crate) fn apply_factor_ceiling(value: u128, factor: f64) -> u128 {
    let scaled = (value as f64) * factor * 100.0;
    (scaled.ceil() / 100.0).ceil() as u128
}

/// `composeTransaction`'s ordered steps. Generic over any
/// [`BackendWrapper`] so EVM/Conflux/Celo share one implementation.
///
/// Nonce is deliberately **not** resolved here — that's reserved for the
/// caller (`eth_sendTransaction`'s handler), after wallet resolution.
pub async fn compose_transaction(
    wrapper: &dyn BackendWrapper,
    params: &Value,
) -> Result<ComposedTransaction, GatewayError> {
    // Step 1: base transaction from input params.
    let mut tx = ComposedTransaction::from_params(params)?;
    tx.fee_currency = wrapper.fee_currency();

    // Step 2: forceEIP155 -> bind chainId to the provider's network.
    let policy = wrapper.gas_policy();
    if policy.force_eip155 {
        tx.chain_id = wrapper.chain_id();
    }

    // Step 3: forceEIP1559 -> type = 2.
    if policy.force_eip1559 {
        tx.tx_type = Some(2);
    }

    // Step 4: gas price resolution.
    let is_read_only = tx.from.is_none();
    match (is_read_only, tx.gas_price) {
        (true, None) => {
            // Read-only call with no gasPrice: leave unset.
        }
        (_, None) => {
            tx.gas_price = Some(resolve_gas_price(wrapper).await?);
        }
        (_, Some(requested)) => {
            if requested > policy.default_gas_price {
                return Err(GatewayError::GasPriceAboveThreshold {
                    estimated: requested,
                    threshold: policy.default_gas_price,
                });
            }
        }
    }

    // Step 6 (done before final shaping so gas_limit is ready for the
    // EIP-1559 mirror below): gas limit resolution mirrors gas price.
    if tx.gas_limit.is_none() {
        tx.gas_limit = Some(resolve_gas_limit(wrapper, &tx).await?);
    } else if let Some(requested) = tx.gas_limit {
        if requested > policy.default_gas_limit {
            return Err(GatewayError::GasLimitAboveThreshold {
                estimated: requested,
                threshold: policy.default_gas_limit,
            });
        }
    }

    // Step 7: forceEIP1559 -> copy gasPrice into both fee fields when unset.
    if policy.force_eip1559 {
        if let Some(gas_price) = tx.gas_price {
            tx.max_fee_per_gas.get_or_insert(gas_price);
            tx.max_priority_fee_per_gas.get_or_insert(gas_price);
        }
    }

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_ceiling_rounds_up_fractional_cents() {
        // 25e9 * 1.0 -> 25e9, no fractional ceiling needed.
        assert_eq!(apply_factor_ceiling(25_000_000_000, 1.0), 25_000_000_000);
        // A factor that leaves a fractional cent-of-gwei rounds up.
        assert_eq!(apply_factor_ceiling(3, 1.005), 4);
    }
}
