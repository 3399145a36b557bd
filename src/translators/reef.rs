//! Reef specialization: Reef has no native Ethereum RPC, so
//! Ethereum shape is synthesized from a Substrate provider plus a GraphQL
//! index. This module is the GraphQL half — querying the index and
//! projecting its results onto Ethereum-shaped blocks/txs/receipts/logs.
//! Substrate extrinsic submission and sr25519 signing are vendored
//! cryptographic primitives out of scope here and are represented only
//! as the [`ReefSigner`] contract.

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::error::GatewayError;

/// Contract for submitting a signed Ethereum-shaped transaction as a
/// Substrate extrinsic. The wire format (extrinsic encoding, sr25519
/// signing) is a vendored cryptographic primitive and is not
/// implemented by this crate — only its contract is defined here, to be
/// satisfied by whatever Substrate client library the deployment links.
#[async_trait]
pub trait ReefSigner: Send + Sync {
    /// Submits `tx` as a Substrate extrinsic and returns its resulting
    /// Ethereum-style transaction hash. `tx` is Ethereum-shaped and already
    /// gas/nonce resolved, but deliberately **unsigned** — there is no
    /// ECDSA signature anywhere in it, since Reef has no ECDSA step at
    /// all. A `substrateAddress` field (see
    /// [`crate::backend::reef::unsigned_transaction_payload`]) names which
    /// keypair the implementation should sr25519-sign with.
    async fn send_transaction(&self, tx: Value) -> Result<String, GatewayError>;

    /// Claims the given EVM address on-chain for the bound keypair, if it
    /// is not already claimed. Invoked once at startup.
    async fn claim_default_account(&self) -> Result<(), GatewayError>;
}

/// Placeholder [`ReefSigner`] for deployments that haven't linked a
/// Substrate client library yet. Every method fails with a clear message
/// rather than silently pretending to submit a transaction — sr25519
/// signing and extrinsic encoding are vendored primitives this crate does
/// not implement.
pub struct UnimplementedReefSigner;

#[async_trait]
impl ReefSigner for UnimplementedReefSigner {
    async fn send_transaction(&self, _tx: Value) -> Result<String, GatewayError> {
        Err(GatewayError::Generic(
            "no Substrate client is linked: configure a ReefSigner that can submit extrinsics".into(),
        ))
    }

    async fn claim_default_account(&self) -> Result<(), GatewayError> {
        Err(GatewayError::Generic(
            "no Substrate client is linked: configure a ReefSigner that can claim accounts".into(),
        ))
    }
}

/// A thin GraphQL client over the Reef indexer.
pub struct ReefGraphQlClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl ReefGraphQlClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    async fn query(&self, query: &str, variables: Value) -> Result<Value, GatewayError> {
        let body = json!({ "query": query, "variables": variables });
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Generic(format!("GraphQL request failed: {e}")))?;
        let parsed: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidJsonResponse(e.to_string()))?;
        if let Some(errors) = parsed.get("errors") {
            return Err(GatewayError::ExecutionError(errors.to_string()));
        }
        parsed
            .get("data")
            .cloned()
            .ok_or_else(|| GatewayError::InvalidJsonResponse("missing `data`".into()))
    }

    /// Query for the latest finalized block plus its evm-tagged extrinsics,
    /// used to serve `eth_getBlockByNumber`.
    pub async fn latest_finalized_block(&self) -> Result<Value, GatewayError> {
        let query = r#"
            query LatestBlock {
              blocks(orderBy: height_DESC, where: { finalized_eq: true }, limit: 1) {
                id
                hash
                parentHash
                height
                stateRoot
                timestamp
                extrinsics(where: { section_eq: "evm" }) {
                  hash
                  events { section method data }
                }
              }
            }
        "#;
        let data = self.query(query, Value::Null).await?;
        data.get("blocks")
            .and_then(|v| v.get(0))
            .cloned()
            .ok_or_else(|| GatewayError::ExecutionError("block not found".into()))
    }

    /// Query for a single evm extrinsic and its block, by transaction
    /// hash, used to serve `eth_getTransactionByHash` /
    /// `eth_getTransactionReceipt`. Requires `block.finalized`.
    pub async fn extrinsic_by_hash(&self, hash: &str) -> Result<Value, GatewayError> {
        let query = r#"
            query ExtrinsicByHash($hash: String!) {
              extrinsics(where: { hash_eq: $hash, section_eq: "evm" }, limit: 1) {
                hash
                index
                signer
                partialFee
                weight
                block { id hash height finalized }
                events { section method data }
              }
            }
        "#;
        let data = self.query(query, json!({ "hash": hash })).await?;
        let extrinsic = data
            .get("extrinsics")
            .and_then(|v| v.get(0))
            .cloned()
            .ok_or_else(|| GatewayError::ExecutionError("transaction not found".into()))?;
        let finalized = extrinsic
            .get("block")
            .and_then(|b| b.get("finalized"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !finalized {
            return Err(GatewayError::ExecutionError("transaction not yet finalized".into()));
        }
        Ok(extrinsic)
    }
}

/// Projects a GraphQL block into Ethereum `eth_getBlockByNumber` shape.
pub fn project_block(block: &Value) -> Value {
    let transactions: Vec<Value> = block
        .get("extrinsics")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(|e| e.get("hash").cloned().unwrap_or(Value::Null)).collect())
        .unwrap_or_default();

    json!({
        "hash": block.get("hash").cloned().unwrap_or(Value::Null),
        "parentHash": block.get("parentHash").cloned().unwrap_or(Value::Null),
        "number": block.get("height").and_then(Value::as_u64).map(|h| format!("{h:#x}")),
        "stateRoot": block.get("stateRoot").cloned().unwrap_or(Value::Null),
        "timestamp": block.get("timestamp").and_then(Value::as_i64).map(|t| format!("{:#x}", t / 1000)),
        "nonce": "0x0000000000000000",
        "difficulty": "0x0",
        "gasLimit": "0xffffffff",
        "gasUsed": "0xffffffff",
        "miner": "0x0000000000000000000000000000000000000000",
        "extraData": "0x",
        "transactions": transactions,
    })
}

/// Projects a GraphQL extrinsic into Ethereum `eth_getTransactionByHash`
/// shape. Reef's indexed extrinsic carries no explicit `to`/`value` for an
/// arbitrary evm call, so those fall back to `null`/`"0x0"`; everything
/// this gateway can actually source from the index (hash, block linkage,
/// sender, a fee-derived gas price) is populated.
pub fn project_transaction(extrinsic: &Value, block_number: u64, tx_index: u64) -> Value {
    let partial_fee: f64 = extrinsic
        .get("partialFee")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    let weight: f64 = extrinsic
        .get("weight")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1.0);
    let gas_price = if weight > 0.0 { partial_fee / weight } else { 0.0 };

    json!({
        "hash": extrinsic.get("hash").cloned().unwrap_or(Value::Null),
        "nonce": "0x0",
        "blockHash": extrinsic.get("block").and_then(|b| b.get("hash")).cloned().unwrap_or(Value::Null),
        "blockNumber": format!("{block_number:#x}"),
        "transactionIndex": format!("{tx_index:#x}"),
        "from": extrinsic.get("signer").cloned().unwrap_or(Value::Null),
        "to": Value::Null,
        "value": "0x0",
        "gas": format!("{:#x}", weight as u128),
        "gasPrice": format!("{:#x}", gas_price as u128),
        "input": "0x",
    })
}

/// Projects a GraphQL extrinsic into Ethereum `eth_getTransactionReceipt`
/// shape. Status maps `"success" → "0x1"`, else `"0x0"`; contract address
/// is read from a `Created` event's data; logs are built from `Log`-method
/// events with synthesized indices; `effectiveGasPrice = partialFee /
/// weight`.
pub fn project_receipt(extrinsic: &Value, block_number: u64, tx_index: u64) -> Value {
    let empty = Vec::new();
    let events = extrinsic.get("events").and_then(Value::as_array).unwrap_or(&empty);
    let tx_hash = extrinsic.get("hash").cloned().unwrap_or(Value::Null);
    let block_hash = extrinsic
        .get("block")
        .and_then(|b| b.get("hash"))
        .cloned()
        .unwrap_or(Value::Null);

    let status = events
        .iter()
        .find(|e| e.get("method").and_then(Value::as_str) == Some("Executed"))
        .and_then(|e| e.get("data"))
        .and_then(|d| d.get("status"))
        .and_then(Value::as_str)
        .map(|s| if s == "success" { "0x1" } else { "0x0" })
        .unwrap_or("0x0");

    let contract_address = events
        .iter()
        .find(|e| e.get("method").and_then(Value::as_str) == Some("Created"))
        .and_then(|e| e.get("data"))
        .and_then(|d| d.get("address"))
        .cloned();

    let partial_fee: f64 = extrinsic
        .get("partialFee")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    let weight: f64 = extrinsic
        .get("weight")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1.0);
    let effective_gas_price = if weight > 0.0 { partial_fee / weight } else { 0.0 };

    let logs: Vec<Value> = events
        .iter()
        .filter(|e| e.get("method").and_then(Value::as_str) == Some("Log"))
        .enumerate()
        .map(|(i, e)| {
            json!({
                "address": e.get("data").and_then(|d| d.get("address")).cloned().unwrap_or(Value::Null),
                "topics": e.get("data").and_then(|d| d.get("topics")).cloned().unwrap_or(json!([])),
                "data": e.get("data").and_then(|d| d.get("data")).cloned().unwrap_or(Value::Null),
                "logIndex": format!("{i:#x}"),
                "transactionIndex": format!("{tx_index:#x}"),
                "transactionHash": tx_hash,
                "blockHash": block_hash,
                "blockNumber": format!("{block_number:#x}"),
            })
        })
        .collect();

    json!({
        "transactionHash": tx_hash,
        "transactionIndex": format!("{tx_index:#x}"),
        "blockHash": block_hash,
        "blockNumber": format!("{block_number:#x}"),
        "status": status,
        "contractAddress": contract_address,
        "effectiveGasPrice": format!("{:#x}", effective_gas_price as u128),
        "logs": logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_receipt_maps_success_status() {
        let extrinsic = json!({
            "hash": "0xabc",
            "partialFee": "100",
            "weight": "10",
            "block": { "hash": "0xblockhash" },
            "events": [
                { "section": "evm", "method": "Executed", "data": { "status": "success" } }
            ]
        });
        let receipt = project_receipt(&extrinsic, 10, 0);
        assert_eq!(receipt["status"], json!("0x1"));
        assert_eq!(receipt["effectiveGasPrice"], json!("0xa"));
    }

    #[test]
    fn project_receipt_maps_failure_status() {
        let extrinsic = json!({
            "hash": "0xabc",
            "block": { "hash": "0xblockhash" },
            "events": [
                { "section": "evm", "method": "Executed", "data": { "status": "fail" } }
            ]
        });
        let receipt = project_receipt(&extrinsic, 10, 0);
        assert_eq!(receipt["status"], json!("0x0"));
    }
}
