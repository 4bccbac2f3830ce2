// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Ledger-database backend driver.
//!
//! The backend is an append-style document store with no contract execution
//! or gas model. Contract operations degrade to synthetic transaction ids so
//! the orchestration layers keep working against it, and the native
//! primitives are document recording plus integrity verification.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::core::abi::AbiDocument;
use crate::core::rpc::{TransactionReceipt, TxRequest};

use super::{
    ChainDriver, DeployOutcome, DeployParams, DriverError, DriverInfo, DriverKind,
};

#[derive(Debug, thiserror::Error)]
#[error("ledger error: {0}")]
pub struct LedgerError(pub String);

/// Document storage behind the ledger-db driver.
#[async_trait]
pub trait DocumentLedger: Send + Sync {
    async fn put(&self, id: &str, doc: Value) -> Result<(), LedgerError>;
    async fn get(&self, id: &str) -> Result<Option<Value>, LedgerError>;
    async fn available(&self) -> bool {
        true
    }
}

/// In-memory [`DocumentLedger`], for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    docs: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl DocumentLedger for MemoryLedger {
    async fn put(&self, id: &str, doc: Value) -> Result<(), LedgerError> {
        self.docs
            .lock()
            .map_err(|_| LedgerError("ledger lock poisoned".into()))?
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Value>, LedgerError> {
        Ok(self
            .docs
            .lock()
            .map_err(|_| LedgerError("ledger lock poisoned".into()))?
            .get(id)
            .cloned())
    }
}

#[derive(Debug, Clone)]
pub struct LedgerDbConfig {
    pub ledger_name: String,
}

impl Default for LedgerDbConfig {
    fn default() -> Self {
        Self {
            ledger_name: "contract-ledger".to_string(),
        }
    }
}

/// Driver for document-ledger backends.
#[derive(Debug)]
pub struct LedgerDbDriver<L> {
    ledger: L,
    config: LedgerDbConfig,
}

impl<L: DocumentLedger> LedgerDbDriver<L> {
    pub fn new(ledger: L, config: LedgerDbConfig) -> Self {
        Self { ledger, config }
    }

    /// Hash binding a document's payload to this ledger. Recomputed during
    /// verification, so the serialization must stay deterministic.
    fn integrity_hash(&self, data: &Value) -> Result<String, DriverError> {
        let serialized = serde_json::to_string(data)
            .map_err(|err| LedgerError(format!("unserializable document: {err}")))?;
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        hasher.update(self.config.ledger_name.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    fn fresh_id(prefix: &str) -> String {
        format!("{prefix}_{:016x}_{}", rand::random::<u64>(), Utc::now().timestamp())
    }
}

#[async_trait]
impl<L: DocumentLedger> ChainDriver for LedgerDbDriver<L> {
    fn kind(&self) -> DriverKind {
        DriverKind::LedgerDb
    }

    fn network(&self) -> &str {
        &self.config.ledger_name
    }

    fn supports_contracts(&self) -> bool {
        false
    }

    fn supports_gas(&self) -> bool {
        false
    }

    async fn deploy(&self, params: DeployParams) -> Result<DeployOutcome, DriverError> {
        warn!(@yellow, "{} does not execute contracts; recording deployment as a document", self.config.ledger_name);

        let tx_id = Self::fresh_id("contract_deploy");
        let doc = json!({
            "operation": "deploy",
            "bytecode": params.bytecode,
            "constructor_args": params.constructor_args,
            "from": params.from,
        });
        self.record_event(&doc).await?;

        Ok(DeployOutcome {
            address: None,
            tx_hash: tx_id,
            gas_used: Some(0),
            network: self.config.ledger_name.clone(),
            supported: false,
        })
    }

    async fn call_method(
        &self,
        _address: &str,
        _abi: &AbiDocument,
        _method: &str,
        _args: &[Value],
    ) -> Result<Value, DriverError> {
        Err(DriverError::NotSupported {
            operation: "contract method call",
            kind: DriverKind::LedgerDb,
        })
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<u64, DriverError> {
        Ok(0)
    }

    async fn get_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, DriverError> {
        // Documents confirm on write, so a found document is a final receipt.
        let Some(_) = self.ledger.get(hash).await? else {
            return Ok(None);
        };
        Ok(Some(TransactionReceipt {
            transaction_hash: hash.to_string(),
            status: true,
            ..Default::default()
        }))
    }

    async fn gas_price(&self) -> Result<u128, DriverError> {
        Ok(0)
    }

    async fn balance(&self, _address: &str) -> Result<U256, DriverError> {
        Ok(U256::ZERO)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, DriverError> {
        let doc = json!({
            "operation": "transaction",
            "from": tx.from,
            "to": tx.to,
            "data": tx.data,
        });
        self.record_event(&doc).await
    }

    async fn is_available(&self) -> bool {
        self.ledger.available().await
    }

    async fn record_event(&self, data: &Value) -> Result<String, DriverError> {
        let id = Self::fresh_id("doc");
        let doc = json!({
            "id": id,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
            "hash": self.integrity_hash(data)?,
        });
        self.ledger.put(&id, doc).await?;
        debug!(@grey, "recorded document {id} in {}", self.config.ledger_name);
        Ok(id)
    }

    async fn get_event(&self, id: &str) -> Result<Option<Value>, DriverError> {
        Ok(self.ledger.get(id).await?)
    }

    async fn verify_integrity(&self, id: &str, data: &Value) -> Result<bool, DriverError> {
        let Some(doc) = self.ledger.get(id).await? else {
            return Ok(false);
        };
        let stored_hash = doc.get("hash").and_then(Value::as_str).unwrap_or_default();
        Ok(stored_hash == self.integrity_hash(data)?)
    }

    async fn info(&self) -> DriverInfo {
        DriverInfo {
            kind: DriverKind::LedgerDb,
            network: self.config.ledger_name.clone(),
            details: json!({
                "ledger_name": self.config.ledger_name,
                "available": self.ledger.available().await,
            }),
        }
    }
}
