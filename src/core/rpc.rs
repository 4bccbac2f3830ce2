// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Narrow JSON-RPC transport to an EVM-compatible node.
//!
//! All integer quantities are `0x` hex strings on the wire; this module is
//! the only place that converts between hex and decimal. Failures are not
//! retried here.

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::utils::{from_hex_quantity, to_hex_quantity};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("rpc request failed with status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rpc error [{code}]: {message}")]
    Rpc { code: i64, message: String },
    #[error("failed to reach rpc endpoint: {0}")]
    Connection(#[from] reqwest::Error),
    #[error("malformed rpc response: {0}")]
    MalformedResponse(String),
}

/// Skeleton of a transaction, for `eth_call`, `eth_estimateGas` and
/// `eth_sendTransaction`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxRequest {
    pub from: Option<String>,
    pub to: Option<String>,
    pub data: Option<String>,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub value: Option<U256>,
}

impl TxRequest {
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    /// Wire representation with numeric fields as hex quantities.
    pub fn to_wire(&self) -> Value {
        let mut obj = serde_json::Map::new();
        if let Some(from) = &self.from {
            obj.insert("from".into(), json!(from));
        }
        if let Some(to) = &self.to {
            obj.insert("to".into(), json!(to));
        }
        if let Some(data) = &self.data {
            obj.insert("data".into(), json!(data));
        }
        if let Some(gas) = self.gas {
            obj.insert("gas".into(), json!(to_hex_quantity(gas.into())));
        }
        if let Some(gas_price) = self.gas_price {
            obj.insert("gasPrice".into(), json!(to_hex_quantity(gas_price)));
        }
        if let Some(value) = self.value {
            obj.insert("value".into(), json!(format!("{value:#x}")));
        }
        Value::Object(obj)
    }
}

/// A transaction receipt, normalized from its wire encoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub block_hash: Option<String>,
    pub contract_address: Option<String>,
    pub gas_used: Option<u64>,
    pub status: bool,
    pub from: Option<String>,
    pub to: Option<String>,
    pub logs: Vec<Value>,
}

/// Transport boundary consumed by the EVM driver.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn block_number(&self) -> Result<u64, TransportError>;
    async fn chain_id(&self) -> Result<u64, TransportError>;
    async fn gas_price(&self) -> Result<u128, TransportError>;
    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, TransportError>;
    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, TransportError>;
    async fn call(&self, tx: &TxRequest) -> Result<String, TransportError>;
    async fn get_balance(&self, address: &str) -> Result<U256, TransportError>;
    async fn get_transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>, TransportError>;
}

/// JSON-RPC 2.0 client over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: String,
}

impl JsonRpcClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let response = self.http.post(&self.endpoint).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(TransportError::Rpc { code, message });
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<u128, TransportError> {
        let result = self.request(method, params).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| TransportError::MalformedResponse(format!("{method}: {result}")))?;
        from_hex_quantity(hex)
            .ok_or_else(|| TransportError::MalformedResponse(format!("{method}: {hex}")))
    }
}

#[async_trait]
impl LedgerRpc for JsonRpcClient {
    async fn block_number(&self) -> Result<u64, TransportError> {
        Ok(self.quantity("eth_blockNumber", json!([])).await? as u64)
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        Ok(self.quantity("eth_chainId", json!([])).await? as u64)
    }

    async fn gas_price(&self) -> Result<u128, TransportError> {
        self.quantity("eth_gasPrice", json!([])).await
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, TransportError> {
        Ok(self
            .quantity("eth_estimateGas", json!([tx.to_wire()]))
            .await? as u64)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, TransportError> {
        let result = self
            .request("eth_sendTransaction", json!([tx.to_wire()]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::MalformedResponse(format!("eth_sendTransaction: {result}")))
    }

    async fn call(&self, tx: &TxRequest) -> Result<String, TransportError> {
        let result = self
            .request("eth_call", json!([tx.to_wire(), "latest"]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::MalformedResponse(format!("eth_call: {result}")))
    }

    async fn get_balance(&self, address: &str) -> Result<U256, TransportError> {
        let result = self.request("eth_getBalance", json!([address, "latest"])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| TransportError::MalformedResponse(format!("eth_getBalance: {result}")))?;
        U256::from_str_radix(hex.strip_prefix("0x").unwrap_or(hex), 16)
            .map_err(|_| TransportError::MalformedResponse(format!("eth_getBalance: {hex}")))
    }

    async fn get_transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionReceipt>, TransportError> {
        let result = self.request("eth_getTransactionReceipt", json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(normalize_receipt(hash, &result)))
    }
}

/// Converts a wire receipt into its normalized form, mapping hex quantities
/// to integers. A missing `status` field is treated as success.
pub fn normalize_receipt(hash: &str, wire: &Value) -> TransactionReceipt {
    let field = |name: &str| wire.get(name).and_then(Value::as_str);
    let quantity = |name: &str| field(name).and_then(from_hex_quantity);

    TransactionReceipt {
        transaction_hash: field("transactionHash").unwrap_or(hash).to_string(),
        block_number: quantity("blockNumber").map(|n| n as u64),
        block_hash: field("blockHash").map(str::to_string),
        contract_address: field("contractAddress").map(str::to_string),
        gas_used: quantity("gasUsed").map(|n| n as u64),
        status: quantity("status").map(|s| s == 1).unwrap_or(true),
        from: field("from").map(str::to_string),
        to: field("to").map(str::to_string),
        logs: wire
            .get("logs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_request_wire_format() {
        let tx = TxRequest {
            from: Some("0xabc".into()),
            data: Some("0xdead".into()),
            gas: Some(3_000_000),
            gas_price: Some(20_000_000_000),
            ..Default::default()
        };
        let wire = tx.to_wire();
        assert_eq!(wire["from"], "0xabc");
        assert_eq!(wire["data"], "0xdead");
        assert_eq!(wire["gas"], "0x2dc6c0");
        assert_eq!(wire["gasPrice"], "0x4a817c800");
        assert!(wire.get("to").is_none());
        assert!(wire.get("value").is_none());
    }

    #[test]
    fn test_normalize_receipt_converts_quantities() {
        let wire = serde_json::json!({
            "transactionHash": "0x01",
            "blockNumber": "0x10",
            "contractAddress": "0xc0ffee",
            "gasUsed": "0x5208",
            "status": "0x1",
        });
        let receipt = normalize_receipt("0x01", &wire);
        assert_eq!(receipt.block_number, Some(16));
        assert_eq!(receipt.gas_used, Some(21_000));
        assert!(receipt.status);
        assert_eq!(receipt.contract_address.as_deref(), Some("0xc0ffee"));
    }

    #[test]
    fn test_normalize_receipt_defaults() {
        let receipt = normalize_receipt("0x02", &serde_json::json!({}));
        assert_eq!(receipt.transaction_hash, "0x02");
        assert_eq!(receipt.block_number, None);
        assert!(receipt.status);
        assert!(receipt.logs.is_empty());
    }

    #[test]
    fn test_failed_status_is_normalized() {
        let wire = serde_json::json!({ "status": "0x0" });
        assert!(!normalize_receipt("0x03", &wire).status);
    }
}
