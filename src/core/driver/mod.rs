// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Backend drivers: a common capability contract over an EVM node and a
//! ledger-database, plus an explicit registry.
//!
//! Callers branch on capability probes (`supports_contracts`,
//! `supports_gas`), never on the concrete backend type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::abi::{AbiDocument, AbiError};
use super::rpc::{TransactionReceipt, TransportError, TxRequest};

pub mod evm;
pub mod ledger_db;

pub use evm::{EvmConfig, EvmDriver};
pub use ledger_db::{DocumentLedger, LedgerDbConfig, LedgerDbDriver, LedgerError, MemoryLedger};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("abi error: {0}")]
    Abi(#[from] AbiError),
    #[error("a from address is required; none given and no default account configured")]
    MissingFromAddress,
    #[error("{operation} is not supported by the {kind} backend")]
    NotSupported {
        operation: &'static str,
        kind: DriverKind,
    },
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Which backend family a driver (or a record) belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverKind {
    #[default]
    #[serde(rename = "evm")]
    Evm,
    #[serde(rename = "ledger-db")]
    LedgerDb,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Evm => write!(f, "evm"),
            DriverKind::LedgerDb => write!(f, "ledger-db"),
        }
    }
}

/// Parameters for deploying bytecode through a driver.
#[derive(Debug, Clone, Default)]
pub struct DeployParams {
    /// Hex-encoded bytecode, with or without `0x` prefix.
    pub bytecode: String,
    pub abi: AbiDocument,
    pub constructor_args: Vec<Value>,
    pub from: Option<String>,
    pub gas_limit: Option<u64>,
}

/// What a deployment produced.
///
/// `address: None` means "submitted, address unknown" (the receipt never
/// surfaced within the polling budget), not failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub address: Option<String>,
    pub tx_hash: String,
    pub gas_used: Option<u64>,
    pub network: String,
    /// False when the backend has no contract semantics and produced a
    /// synthetic transaction id instead.
    pub supported: bool,
}

/// Point-in-time driver diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInfo {
    pub kind: DriverKind,
    pub network: String,
    pub details: Value,
}

/// The capability contract every backend implements.
#[async_trait]
pub trait ChainDriver: Send + Sync {
    fn kind(&self) -> DriverKind;
    fn network(&self) -> &str;
    fn supports_contracts(&self) -> bool;
    fn supports_gas(&self) -> bool;

    async fn deploy(&self, params: DeployParams) -> Result<DeployOutcome, DriverError>;
    async fn call_method(
        &self,
        address: &str,
        abi: &AbiDocument,
        method: &str,
        args: &[Value],
    ) -> Result<Value, DriverError>;
    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, DriverError>;
    async fn get_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, DriverError>;
    async fn gas_price(&self) -> Result<u128, DriverError>;
    async fn balance(&self, address: &str) -> Result<U256, DriverError>;
    async fn send_transaction(&self, tx: &TxRequest) -> Result<String, DriverError>;
    async fn is_available(&self) -> bool;

    /// Event primitives: the ledger-database substitute for contract calls.
    async fn record_event(&self, data: &Value) -> Result<String, DriverError>;
    async fn get_event(&self, id: &str) -> Result<Option<Value>, DriverError>;
    async fn verify_integrity(&self, id: &str, data: &Value) -> Result<bool, DriverError>;

    async fn info(&self) -> DriverInfo;
}

pub type DynDriver = Arc<dyn ChainDriver>;

/// Explicit driver registry, constructed once at startup and passed by
/// reference. There is no ambient global.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, DynDriver>,
    default_name: Option<String>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver. The first registration becomes the default until
    /// [`set_default`](Self::set_default) overrides it.
    pub fn register(&mut self, name: impl Into<String>, driver: DynDriver) {
        let name = name.into();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.drivers.insert(name, driver);
    }

    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_name = Some(name.into());
    }

    pub fn get(&self, name: &str) -> Option<DynDriver> {
        self.drivers.get(name).cloned()
    }

    pub fn default_driver(&self) -> Option<DynDriver> {
        self.default_name.as_deref().and_then(|name| self.get(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}
