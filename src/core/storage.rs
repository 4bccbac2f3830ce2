// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Contract and transaction records, and the persistence boundary the
//! orchestrators drive.
//!
//! Records are owned by the [`ContractStore`] collaborator; orchestrators
//! hold them only for the duration of one operation. `(name, network)` forms
//! a version history ordered by creation time.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::abi::AbiDocument;
use super::driver::DriverKind;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("duplicate transaction hash: {0}")]
    DuplicateTransaction(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRecordId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    #[default]
    Deployed,
    Upgraded,
    Deprecated,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Reverted,
}

/// One deployed version of a logical contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: ContractId,
    pub name: String,
    pub version: String,
    pub backend: DriverKind,
    pub address: Option<String>,
    pub network: String,
    pub deployer_address: Option<String>,
    pub abi: Option<AbiDocument>,
    pub bytecode_hash: Option<String>,
    pub constructor_params: Value,
    pub deployed_at: Option<DateTime<Utc>>,
    pub transaction_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub status: ContractStatus,
    pub is_upgradeable: bool,
    pub proxy_contract_id: Option<ContractId>,
    pub implementation_of: Option<ContractId>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for a contract record about to be created.
#[derive(Debug, Clone, Default)]
pub struct NewContract {
    pub name: String,
    pub version: String,
    pub backend: DriverKind,
    pub address: Option<String>,
    pub network: String,
    pub deployer_address: Option<String>,
    pub abi: Option<AbiDocument>,
    pub bytecode_hash: Option<String>,
    pub constructor_params: Value,
    pub deployed_at: Option<DateTime<Utc>>,
    pub transaction_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub status: ContractStatus,
    pub is_upgradeable: bool,
    pub proxy_contract_id: Option<ContractId>,
    pub implementation_of: Option<ContractId>,
    pub metadata: Value,
}

/// Partial update of a contract record. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ContractUpdate {
    pub status: Option<ContractStatus>,
    pub address: Option<String>,
    pub is_upgradeable: Option<bool>,
    pub proxy_contract_id: Option<ContractId>,
    pub implementation_of: Option<ContractId>,
    pub metadata: Option<Value>,
}

/// One on-chain interaction: constructor call, method call, or rollback
/// marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TxRecordId,
    pub transaction_hash: String,
    pub contract_id: ContractId,
    pub method_name: String,
    pub parameters: Value,
    pub return_values: Value,
    pub gas_used: Option<u64>,
    pub gas_price: Option<u128>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub status: TxStatus,
    pub error_message: Option<String>,
    pub rollback_id: Option<TxRecordId>,
    pub block_number: Option<u64>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTransaction {
    pub transaction_hash: String,
    pub contract_id: ContractId,
    pub method_name: String,
    pub parameters: Value,
    pub return_values: Value,
    pub gas_used: Option<u64>,
    pub gas_price: Option<u128>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub status: TxStatus,
    pub error_message: Option<String>,
    pub rollback_id: Option<TxRecordId>,
    pub block_number: Option<u64>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Partial update of a transaction record, applied once a receipt (or a
/// timeout) settles its status.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub status: Option<TxStatus>,
    pub gas_used: Option<u64>,
    pub block_number: Option<u64>,
    pub return_values: Option<Value>,
    pub error_message: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Persistence boundary for contract and transaction records.
///
/// Implementations must provide read-your-writes within a [`transaction`]
/// scope; the orchestrators group every mutation of one lifecycle transition
/// inside a single scope so that no partial state survives a failure.
///
/// [`transaction`]: ContractStore::transaction
pub trait ContractStore: Send + Sync {
    fn create_contract(&self, new: NewContract) -> Result<ContractRecord, StoreError>;
    fn find_contract(&self, id: ContractId) -> Result<Option<ContractRecord>, StoreError>;
    fn update_contract(
        &self,
        id: ContractId,
        update: ContractUpdate,
    ) -> Result<ContractRecord, StoreError>;
    /// Most recently created record for the `(name, network)` family.
    fn find_latest(
        &self,
        name: &str,
        network: &str,
    ) -> Result<Option<ContractRecord>, StoreError>;
    /// The rollback target: the `target_version` match within the family, or
    /// the most recently created record older than `current`.
    fn previous_version(
        &self,
        current: &ContractRecord,
        target_version: Option<&str>,
    ) -> Result<Option<ContractRecord>, StoreError>;
    fn create_transaction(&self, new: NewTransaction)
        -> Result<TransactionRecord, StoreError>;
    fn update_transaction(
        &self,
        id: TxRecordId,
        update: TransactionUpdate,
    ) -> Result<TransactionRecord, StoreError>;
    /// Most recent transaction of `contract` with the given method name.
    fn latest_transaction(
        &self,
        contract: ContractId,
        method: &str,
    ) -> Result<Option<TransactionRecord>, StoreError>;
    /// Runs `f` in a single atomic scope: either every mutation it performs
    /// is persisted, or none is.
    fn transaction(
        &self,
        f: &mut dyn FnMut(&dyn ContractStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}

/// In-memory store, for tests and lightweight embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Clone, Default)]
struct MemoryInner {
    contracts: HashMap<u64, ContractRecord>,
    transactions: HashMap<u64, TransactionRecord>,
    next_contract: u64,
    next_tx: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract_count(&self) -> usize {
        self.lock().map(|inner| inner.contracts.len()).unwrap_or(0)
    }

    pub fn transaction_count(&self) -> usize {
        self.lock().map(|inner| inner.transactions.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }
}

impl ContractStore for MemoryStore {
    fn create_contract(&self, new: NewContract) -> Result<ContractRecord, StoreError> {
        let mut inner = self.lock()?;
        inner.next_contract += 1;
        let record = ContractRecord {
            id: ContractId(inner.next_contract),
            name: new.name,
            version: new.version,
            backend: new.backend,
            address: new.address,
            network: new.network,
            deployer_address: new.deployer_address,
            abi: new.abi,
            bytecode_hash: new.bytecode_hash,
            constructor_params: new.constructor_params,
            deployed_at: new.deployed_at,
            transaction_hash: new.transaction_hash,
            gas_used: new.gas_used,
            status: new.status,
            is_upgradeable: new.is_upgradeable,
            proxy_contract_id: new.proxy_contract_id,
            implementation_of: new.implementation_of,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        inner.contracts.insert(record.id.0, record.clone());
        Ok(record)
    }

    fn find_contract(&self, id: ContractId) -> Result<Option<ContractRecord>, StoreError> {
        Ok(self.lock()?.contracts.get(&id.0).cloned())
    }

    fn update_contract(
        &self,
        id: ContractId,
        update: ContractUpdate,
    ) -> Result<ContractRecord, StoreError> {
        let mut inner = self.lock()?;
        let record = inner
            .contracts
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("contract {}", id.0)))?;
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(address) = update.address {
            record.address = Some(address);
        }
        if let Some(upgradeable) = update.is_upgradeable {
            record.is_upgradeable = upgradeable;
        }
        if let Some(proxy) = update.proxy_contract_id {
            record.proxy_contract_id = Some(proxy);
        }
        if let Some(implementation) = update.implementation_of {
            record.implementation_of = Some(implementation);
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }
        Ok(record.clone())
    }

    fn find_latest(
        &self,
        name: &str,
        network: &str,
    ) -> Result<Option<ContractRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .contracts
            .values()
            .filter(|c| c.name == name && c.network == network)
            .max_by_key(|c| (c.created_at, c.id.0))
            .cloned())
    }

    fn previous_version(
        &self,
        current: &ContractRecord,
        target_version: Option<&str>,
    ) -> Result<Option<ContractRecord>, StoreError> {
        let inner = self.lock()?;
        let family = inner
            .contracts
            .values()
            .filter(|c| c.name == current.name && c.network == current.network && c.id != current.id);
        let found = match target_version {
            Some(version) => family
                .filter(|c| c.version == version)
                .max_by_key(|c| (c.created_at, c.id.0)),
            None => family
                .filter(|c| (c.created_at, c.id.0) < (current.created_at, current.id.0))
                .max_by_key(|c| (c.created_at, c.id.0)),
        };
        Ok(found.cloned())
    }

    fn create_transaction(
        &self,
        new: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        let mut inner = self.lock()?;
        if inner
            .transactions
            .values()
            .any(|t| t.transaction_hash == new.transaction_hash)
        {
            return Err(StoreError::DuplicateTransaction(new.transaction_hash));
        }
        inner.next_tx += 1;
        let record = TransactionRecord {
            id: TxRecordId(inner.next_tx),
            transaction_hash: new.transaction_hash,
            contract_id: new.contract_id,
            method_name: new.method_name,
            parameters: new.parameters,
            return_values: new.return_values,
            gas_used: new.gas_used,
            gas_price: new.gas_price,
            from_address: new.from_address,
            to_address: new.to_address,
            status: new.status,
            error_message: new.error_message,
            rollback_id: new.rollback_id,
            block_number: new.block_number,
            confirmed_at: new.confirmed_at,
            created_at: Utc::now(),
        };
        inner.transactions.insert(record.id.0, record.clone());
        Ok(record)
    }

    fn update_transaction(
        &self,
        id: TxRecordId,
        update: TransactionUpdate,
    ) -> Result<TransactionRecord, StoreError> {
        let mut inner = self.lock()?;
        let record = inner
            .transactions
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id.0)))?;
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(gas_used) = update.gas_used {
            record.gas_used = Some(gas_used);
        }
        if let Some(block_number) = update.block_number {
            record.block_number = Some(block_number);
        }
        if let Some(return_values) = update.return_values {
            record.return_values = return_values;
        }
        if let Some(error_message) = update.error_message {
            record.error_message = Some(error_message);
        }
        if let Some(confirmed_at) = update.confirmed_at {
            record.confirmed_at = Some(confirmed_at);
        }
        Ok(record.clone())
    }

    fn latest_transaction(
        &self,
        contract: ContractId,
        method: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .transactions
            .values()
            .filter(|t| t.contract_id == contract && t.method_name == method)
            .max_by_key(|t| (t.created_at, t.id.0))
            .cloned())
    }

    fn transaction(
        &self,
        f: &mut dyn FnMut(&dyn ContractStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        // Mutations apply eagerly; an error restores the pre-scope snapshot.
        let snapshot = self.lock()?.clone();
        match f(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                *self.lock()? = snapshot;
                Err(err)
            }
        }
    }
}
