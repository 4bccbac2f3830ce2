// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Scripted driver and compiler doubles for exercising orchestration without
//! a node or a solidity toolchain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::abi::AbiDocument;
use crate::core::compiler::{Artifacts, CompilerError, ContractCompiler};
use crate::core::driver::{
    ChainDriver, DeployOutcome, DeployParams, DriverError, DriverInfo, DriverKind,
};
use crate::core::rpc::{TransactionReceipt, TransportError, TxRequest};

/// Scripted [`ChainDriver`]. Builder methods script the responses; every
/// submitted transaction gets a unique hash and a receipt on demand.
pub struct MockDriver {
    network: String,
    deploy_address: Option<String>,
    fail_deploy: bool,
    gas_estimate: u64,
    fail_estimate: bool,
    gas_price: u128,
    balance: U256,
    call_result: Value,
    receipt_status: bool,
    tx_counter: AtomicU64,
    sent: Mutex<Vec<TxRequest>>,
    events: Mutex<HashMap<String, Value>>,
}

impl MockDriver {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            deploy_address: None,
            fail_deploy: false,
            gas_estimate: 21_000,
            fail_estimate: false,
            gas_price: 0,
            balance: U256::ZERO,
            call_result: Value::Null,
            receipt_status: true,
            tx_counter: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            events: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_deploy_address(mut self, address: impl Into<String>) -> Self {
        self.deploy_address = Some(address.into());
        self
    }

    pub fn with_deploy_failure(mut self) -> Self {
        self.fail_deploy = true;
        self
    }

    pub fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.gas_estimate = gas;
        self
    }

    pub fn with_estimate_failure(mut self) -> Self {
        self.fail_estimate = true;
        self
    }

    pub fn with_gas_price(mut self, price: u128) -> Self {
        self.gas_price = price;
        self
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_call_result(mut self, result: Value) -> Self {
        self.call_result = result;
        self
    }

    pub fn with_receipt_status(mut self, status: bool) -> Self {
        self.receipt_status = status;
        self
    }

    /// Transactions submitted through [`ChainDriver::send_transaction`].
    pub fn sent_transactions(&self) -> Vec<TxRequest> {
        self.sent.lock().unwrap().clone()
    }

    fn next_hash(&self) -> String {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        format!("0xtx{n:04}")
    }
}

#[async_trait]
impl ChainDriver for MockDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Evm
    }

    fn network(&self) -> &str {
        &self.network
    }

    fn supports_contracts(&self) -> bool {
        true
    }

    fn supports_gas(&self) -> bool {
        true
    }

    async fn deploy(&self, _params: DeployParams) -> Result<DeployOutcome, DriverError> {
        if self.fail_deploy {
            return Err(DriverError::Transport(TransportError::Rpc {
                code: -32000,
                message: "scripted deploy failure".into(),
            }));
        }
        Ok(DeployOutcome {
            address: self.deploy_address.clone(),
            tx_hash: self.next_hash(),
            gas_used: Some(self.gas_estimate),
            network: self.network.clone(),
            supported: true,
        })
    }

    async fn call_method(
        &self,
        _address: &str,
        _abi: &AbiDocument,
        _method: &str,
        _args: &[Value],
    ) -> Result<Value, DriverError> {
        Ok(self.call_result.clone())
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<u64, DriverError> {
        if self.fail_estimate {
            return Err(DriverError::Transport(TransportError::Rpc {
                code: -32000,
                message: "scripted estimation failure".into(),
            }));
        }
        Ok(self.gas_estimate)
    }

    async fn get_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, DriverError> {
        // Receipts exist only for hashes this driver handed out.
        if !hash.starts_with("0xtx") {
            return Ok(None);
        }
        Ok(Some(TransactionReceipt {
            transaction_hash: hash.to_string(),
            block_number: Some(1),
            gas_used: Some(self.gas_estimate),
            status: self.receipt_status,
            ..Default::default()
        }))
    }

    async fn gas_price(&self) -> Result<u128, DriverError> {
        Ok(self.gas_price)
    }

    async fn balance(&self, _address: &str) -> Result<U256, DriverError> {
        Ok(self.balance)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, DriverError> {
        self.sent.lock().unwrap().push(tx.clone());
        Ok(self.next_hash())
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn record_event(&self, data: &Value) -> Result<String, DriverError> {
        let id = format!("evt_{}", self.tx_counter.fetch_add(1, Ordering::SeqCst));
        self.events.lock().unwrap().insert(id.clone(), data.clone());
        Ok(id)
    }

    async fn get_event(&self, id: &str) -> Result<Option<Value>, DriverError> {
        Ok(self.events.lock().unwrap().get(id).cloned())
    }

    async fn verify_integrity(&self, id: &str, data: &Value) -> Result<bool, DriverError> {
        Ok(self.events.lock().unwrap().get(id) == Some(data))
    }

    async fn info(&self) -> DriverInfo {
        DriverInfo {
            kind: DriverKind::Evm,
            network: self.network.clone(),
            details: json!({ "mock": true }),
        }
    }
}

/// Scripted [`ContractCompiler`] backed by an in-memory artifact map.
#[derive(Default)]
pub struct MockCompiler {
    compiled: Option<Artifacts>,
    stored: Mutex<HashMap<(String, String), Artifacts>>,
}

impl MockCompiler {
    /// Scripts what [`ContractCompiler::compile`] yields.
    pub fn with_compiled(mut self, artifacts: Artifacts) -> Self {
        self.compiled = Some(artifacts);
        self
    }

    pub fn preload(self, name: &str, version: &str, artifacts: Artifacts) -> Self {
        self.stored
            .lock()
            .unwrap()
            .insert((name.to_string(), version.to_string()), artifacts);
        self
    }
}

impl ContractCompiler for MockCompiler {
    fn compile(&self, name: &str, _source: &str) -> Result<Artifacts, CompilerError> {
        self.compiled
            .clone()
            .ok_or_else(|| CompilerError::MissingContract {
                name: name.to_string(),
            })
    }

    fn load_artifacts(&self, name: &str, version: &str) -> Option<Artifacts> {
        self.stored
            .lock()
            .unwrap()
            .get(&(name.to_string(), version.to_string()))
            .cloned()
    }

    fn store_artifacts(
        &self,
        name: &str,
        version: &str,
        artifacts: &Artifacts,
    ) -> Result<(), CompilerError> {
        self.stored
            .lock()
            .unwrap()
            .insert((name.to_string(), version.to_string()), artifacts.clone());
        Ok(())
    }
}
