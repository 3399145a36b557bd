//! MethodHandlers: the account/tx-scoped Ethereum methods this
//! gateway intercepts rather than forwarding verbatim, because they need
//! the local [`crate::wallet::WalletSet`] or gas-policy tuning. Everything
//! not named here falls through to the Router's generic forward path.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::backend::evm::to_transaction_request;
use crate::backend::{compose_transaction, BackendWrapper, ComposedTransaction};
use crate::error::GatewayError;
use crate::translators::Translator;

/// A single intercepted method. Takes the backend, its translator, the
/// already-decoded params array, and `interleaveBlocks`; returns the
/// JSON-RPC `result`.
pub type Handler = for<'a> fn(
    &'a dyn BackendWrapper,
    &'a dyn Translator,
    &'a [Value],
    u64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, GatewayError>> + Send + 'a>>;

/// The method table, keyed by the original Ethereum method name. Built
/// once; every backend shares it — backend-specific behavior lives inside
/// [`crate::backend::BackendWrapper`] implementations, not here.
pub static HANDLERS: Lazy<HashMap<&'static str, Handler>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, Handler> = HashMap::new();
    m.insert("eth_accounts", |w, t, p, i| Box::pin(eth_accounts(w, t, p, i)));
    m.insert("eth_chainId", |w, t, p, i| Box::pin(eth_chain_id(w, t, p, i)));
    m.insert("net_version", |w, t, p, i| Box::pin(net_version(w, t, p, i)));
    m.insert("eth_sign", |w, t, p, i| Box::pin(eth_sign(w, t, p, i)));
    m.insert("eth_sendTransaction", |w, t, p, i| Box::pin(eth_send_transaction(w, t, p, i)));
    m.insert("eth_estimateGas", |w, t, p, i| Box::pin(eth_estimate_gas(w, t, p, i)));
    m.insert("eth_gasPrice", |w, t, p, i| Box::pin(eth_gas_price(w, t, p, i)));
    m.insert("eth_call", |w, t, p, i| Box::pin(eth_call(w, t, p, i)));
    m.insert("eth_getBlockByNumber", |w, t, p, i| Box::pin(eth_get_block_by_number(w, t, p, i)));
    m.insert("eth_syncing", |w, t, p, i| Box::pin(eth_syncing(w, t, p, i)));
    m.insert("eth_newBlockFilter", |w, t, p, i| Box::pin(eth_new_block_filter(w, t, p, i)));
    m.insert("eth_getFilterChanges", |w, t, p, i| Box::pin(eth_get_filter_changes(w, t, p, i)));
    m.insert("eth_uninstallFilter", |w, t, p, i| Box::pin(eth_uninstall_filter(w, t, p, i)));
    m
});

fn param(params: &[Value], index: usize) -> Value {
    params.get(index).cloned().unwrap_or(Value::Null)
}

/// Forwards `method`/`params` through the translator's method alias and
/// parameter/response rewriting, then to the backend. The single place a
/// handler reaches the backend's native dialect, so every fallback-to-raw
/// branch below gets Conflux/Celo/Reef translation for free.
pub(crate) async fn forward(
    wrapper: &dyn BackendWrapper,
    translator: &dyn Translator,
    method: &str,
    params: Value,
) -> Result<Value, GatewayError> {
    let backend_method = translator.method_alias(method).unwrap_or(method);
    let backend_params = translator.rewrite_params(method, params)?;
    let result = wrapper.raw_forward(backend_method, backend_params).await?;
    Ok(translator.rewrite_response(method, result))
}

/// `eth_accounts`: the managed address list, in wallet-set order.
async fn eth_accounts(
    wrapper: &dyn BackendWrapper,
    _translator: &dyn Translator,
    _params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    let addresses: Vec<Value> = wrapper
        .wallets()
        .addresses()
        .into_iter()
        .map(|a| json!(format!("{a:#x}")))
        .collect();
    Ok(Value::Array(addresses))
}

/// `eth_chainId`: the chain id this wrapper's wallets were bound to at
/// startup, or `null` for chains (Conflux, Reef) that don't use EIP-155.
async fn eth_chain_id(
    wrapper: &dyn BackendWrapper,
    _translator: &dyn Translator,
    _params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    Ok(match wrapper.chain_id() {
        Some(id) => json!(format!("{id:#x}")),
        None => Value::Null,
    })
}

/// `net_version`: decimal-string rendering of the chain id.
async fn net_version(
    wrapper: &dyn BackendWrapper,
    _translator: &dyn Translator,
    _params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    Ok(match wrapper.chain_id() {
        Some(id) => json!(id.to_string()),
        None => Value::Null,
    })
}

/// `eth_sign`: looks the requested signer up case-insensitively (trivial
/// here since [`alloy_primitives::Address`] equality already is), signs
/// the message, returns the 65-byte signature. `UnknownSigner` on miss.
async fn eth_sign(
    wrapper: &dyn BackendWrapper,
    _translator: &dyn Translator,
    params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    let address_str = param(params, 0);
    let address_str = address_str
        .as_str()
        .ok_or_else(|| GatewayError::InvalidParameter("expected an address".into()))?;
    let address: alloy_primitives::Address = address_str
        .parse()
        .map_err(|_| GatewayError::InvalidParameter("invalid address".into()))?;
    let wallet = wrapper
        .wallets()
        .by_address(address)
        .ok_or_else(|| GatewayError::UnknownSigner(address_str.to_string()))?;

    let message_hex = param(params, 1);
    let message_hex = message_hex
        .as_str()
        .ok_or_else(|| GatewayError::InvalidParameter("expected a message".into()))?;
    let message = hex::decode(message_hex.trim_start_matches("0x"))
        .map_err(|_| GatewayError::InvalidParameter("invalid message".into()))?;

    let signature = wallet.sign_message(&message).await?;
    Ok(json!(format!("0x{}", hex::encode(signature))))
}

/// `eth_sendTransaction`: compose → resolve sender → resolve nonce if
/// absent → submit via [`BackendWrapper::submit_transaction`]. The only
/// handler that fetches a fresh nonce, since `compose_transaction`
/// deliberately leaves that suspension point to the caller. Signing
/// itself is backend-specific (ECDSA for every EVM-family backend,
/// sr25519-via-`ReefSigner` for Reef) and lives behind that trait method,
/// not here.
async fn eth_send_transaction(
    wrapper: &dyn BackendWrapper,
    _translator: &dyn Translator,
    params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    let tx_value = param(params, 0);
    let mut tx = compose_transaction(wrapper, &tx_value).await?;

    let from = tx.from.unwrap_or_else(|| wrapper.wallets().default_wallet().address());
    tx.from = Some(from);
    let wallet = wrapper
        .wallets()
        .by_address(from)
        .ok_or_else(|| GatewayError::UnknownSigner(format!("{from:#x}")))?;

    if tx.nonce.is_none() {
        tx.nonce = Some(wrapper.transaction_count(from).await?);
    }

    let hash = wrapper.submit_transaction(&tx, wallet).await?;
    Ok(json!(hash))
}

/// `eth_estimateGas`: composes with any caller-supplied gas fields
/// cleared, so the backend's estimator — not the caller's guess — decides
/// the returned limit.
async fn eth_estimate_gas(
    wrapper: &dyn BackendWrapper,
    _translator: &dyn Translator,
    params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    let mut tx_value = param(params, 0);
    if let Some(obj) = tx_value.as_object_mut() {
        obj.remove("gas");
        obj.remove("gasLimit");
    }
    let tx: ComposedTransaction = compose_transaction(wrapper, &tx_value).await?;
    Ok(json!(format!("{:#x}", tx.gas_limit.unwrap_or(0))))
}

/// `eth_gasPrice`: the backend's raw price, factored only when
/// `ethGasPriceFactor` is enabled — unlike `compose_transaction`'s
/// `getGasPrice`, a plain price query enforces no `defaultGasPrice` ceiling.
async fn eth_gas_price(
    wrapper: &dyn BackendWrapper,
    _translator: &dyn Translator,
    _params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    let raw = wrapper
        .raw_gas_price()
        .await
        .map_err(|e| GatewayError::UnpredictableGasPrice(e.to_string()))?;
    let policy = wrapper.gas_policy();
    let price = if policy.eth_gas_price_factor {
        crate::backend::apply_factor_ceiling(raw, policy.gas_price_factor)
    } else {
        raw
    };
    Ok(json!(format!("{price:#x}")))
}

/// `eth_call`: composes a read-only transaction and forwards it bound to
/// whatever block/epoch tag [`BackendWrapper::resolve_read_tag`] picks
/// (the caller's own tag, unless `interleaveBlocks` overrides it), through
/// the translator so Conflux's CIP-37/tag rewriting still applies.
async fn eth_call(
    wrapper: &dyn BackendWrapper,
    translator: &dyn Translator,
    params: &[Value],
    interleave: u64,
) -> Result<Value, GatewayError> {
    let tx_value = param(params, 0);
    let tx = compose_transaction(wrapper, &tx_value).await?;
    let request = to_transaction_request(&tx);
    let call_object = serde_json::to_value(&request)
        .map_err(|e| GatewayError::InvalidParameter(format!("could not encode call: {e}")))?;

    let resolved_tag = wrapper.resolve_read_tag(interleave).await?;
    let tag = match resolved_tag {
        Some(tag) => json!(tag),
        None => param(params, 1),
    };
    forward(wrapper, translator, "eth_call", json!([call_object, tag])).await
}

/// `eth_getBlockByNumber`: forwards (through the translator, so Conflux's
/// epoch aliasing/tag rewriting still applies), then hex-normalizes the
/// handful of block fields some backends return as decimal integers
/// rather than `0x`-prefixed hex.
async fn eth_get_block_by_number(
    wrapper: &dyn BackendWrapper,
    translator: &dyn Translator,
    params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    let result = forward(wrapper, translator, "eth_getBlockByNumber", Value::Array(params.to_vec())).await?;
    Ok(hex_normalize_block(result))
}

/// Rewrites `baseFeePerGas`, `_difficulty`, `gasLimit`, `gasUsed` to
/// `0x`-hex when present as a JSON number or a bare decimal string,
/// leaving already-hex values untouched.
fn hex_normalize_block(mut result: Value) -> Value {
    if let Some(obj) = result.as_object_mut() {
        for key in ["baseFeePerGas", "_difficulty", "gasLimit", "gasUsed"] {
            if let Some(value) = obj.get_mut(key) {
                if let Some(hex) = to_hex_string(value) {
                    *value = json!(hex);
                }
            }
        }
    }
    result
}

fn to_hex_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.starts_with("0x") || s.starts_with("0X") => None,
        Value::String(s) => s.parse::<u128>().ok().map(|n| format!("{n:#x}")),
        Value::Number(n) => n.as_u64().map(|n| format!("{n:#x}")),
        _ => None,
    }
}

/// `eth_syncing`: when `alwaysSynced` is set, this gateway claims the
/// chain is never behind — useful for backends that don't expose a real
/// sync-status RPC.
async fn eth_syncing(
    wrapper: &dyn BackendWrapper,
    translator: &dyn Translator,
    _params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    if wrapper.gas_policy().always_synced {
        Ok(json!(false))
    } else {
        forward(wrapper, translator, "eth_syncing", Value::Null).await
    }
}

/// `eth_newBlockFilter`: when `mockFilters` is set, fabricates a filter id
/// instead of forwarding to a backend that may not support filters at all.
async fn eth_new_block_filter(
    wrapper: &dyn BackendWrapper,
    translator: &dyn Translator,
    _params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    if wrapper.gas_policy().mock_filters {
        Ok(json!("0x1"))
    } else {
        forward(wrapper, translator, "eth_newBlockFilter", Value::Null).await
    }
}

/// `eth_getFilterChanges`: resolved Open Question — a mocked filter
/// "changes" response is the current block number, wrapped in a
/// single-element array, so clients polling for new blocks see forward
/// progress without this gateway tracking real filter state.
async fn eth_get_filter_changes(
    wrapper: &dyn BackendWrapper,
    translator: &dyn Translator,
    params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    if wrapper.gas_policy().mock_filters {
        let block_number = forward(wrapper, translator, "eth_blockNumber", Value::Null).await?;
        Ok(json!([block_number]))
    } else {
        forward(wrapper, translator, "eth_getFilterChanges", Value::Array(params.to_vec())).await
    }
}

/// `eth_uninstallFilter`: mocked filters always uninstall successfully.
async fn eth_uninstall_filter(
    wrapper: &dyn BackendWrapper,
    translator: &dyn Translator,
    params: &[Value],
    _interleave: u64,
) -> Result<Value, GatewayError> {
    if wrapper.gas_policy().mock_filters {
        Ok(json!(true))
    } else {
        forward(wrapper, translator, "eth_uninstallFilter", Value::Array(params.to_vec())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_table_covers_every_intercepted_method() {
        for method in [
            "eth_accounts",
            "eth_chainId",
            "net_version",
            "eth_sign",
            "eth_sendTransaction",
            "eth_estimateGas",
            "eth_gasPrice",
            "eth_call",
            "eth_getBlockByNumber",
            "eth_syncing",
            "eth_newBlockFilter",
            "eth_getFilterChanges",
            "eth_uninstallFilter",
        ] {
            assert!(HANDLERS.contains_key(method), "missing handler for {method}");
        }
    }

    #[test]
    fn hex_normalize_block_converts_decimal_fields_and_leaves_hex_alone() {
        let block = json!({
            "baseFeePerGas": 1000,
            "_difficulty": "123456",
            "gasLimit": "0x5208",
            "gasUsed": 21000,
            "hash": "0xdead",
        });
        let normalized = hex_normalize_block(block);
        assert_eq!(normalized["baseFeePerGas"], json!("0x3e8"));
        assert_eq!(normalized["_difficulty"], json!("0x1e240"));
        assert_eq!(normalized["gasLimit"], json!("0x5208"));
        assert_eq!(normalized["gasUsed"], json!("0x5208"));
        assert_eq!(normalized["hash"], json!("0xdead"));
    }
}
