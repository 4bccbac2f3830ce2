// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Calling methods on deployed contracts.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::core::abi::{self, AbiError};
use crate::core::driver::{ChainDriver, DriverError};
use crate::core::rpc::TxRequest;
use crate::core::storage::{
    ContractRecord, ContractStore, NewTransaction, StoreError, TransactionRecord,
    TransactionUpdate, TxStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("contract {0} has no ABI on record")]
    MissingAbi(String),
    #[error("contract {0} has no address; was its deployment confirmed?")]
    MissingAddress(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("abi error: {0}")]
    Abi(#[from] AbiError),
}

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub from: Option<String>,
    /// Wait for the receipt of a state-changing call and finalize its record.
    pub wait: bool,
    pub gas_limit: Option<u64>,
}

/// What a call produced: a decoded value for views, a transaction record for
/// state changes.
#[derive(Debug, Clone)]
pub enum CallResult {
    Value(Value),
    Transaction(TransactionRecord),
}

/// Method-call orchestrator over stored contract records.
#[derive(Clone)]
pub struct Interactor {
    driver: Arc<dyn ChainDriver>,
    store: Arc<dyn ContractStore>,
}

impl Interactor {
    pub fn new(driver: Arc<dyn ChainDriver>, store: Arc<dyn ContractStore>) -> Self {
        Self { driver, store }
    }

    pub async fn call(
        &self,
        contract: &ContractRecord,
        method: &str,
        args: &[Value],
        options: CallOptions,
    ) -> Result<CallResult, InteractionError> {
        let abi_doc = contract
            .abi
            .as_ref()
            .ok_or_else(|| InteractionError::MissingAbi(contract.name.clone()))?;
        let address = contract
            .address
            .as_deref()
            .ok_or_else(|| InteractionError::MissingAddress(contract.name.clone()))?;

        let entry = abi_doc.function(method)?;
        let mutability = entry.state_mutability.as_deref().unwrap_or("nonpayable");
        if matches!(mutability, "view" | "pure") {
            let value = self.driver.call_method(address, abi_doc, method, args).await?;
            return Ok(CallResult::Value(value));
        }

        // State-changing call: submit, record, optionally wait.
        let data = abi::encode_call(method, args, entry)?;
        let mut tx = TxRequest::default()
            .with_to(address)
            .with_data(format!("0x{}", hex::encode(data)));
        if let Some(from) = &options.from {
            tx = tx.with_from(from.clone());
        }
        if let Some(gas) = options.gas_limit {
            tx = tx.with_gas(gas);
        }

        let tx_hash = self.driver.send_transaction(&tx).await?;
        debug!(@grey, "submitted {method} on {} as {tx_hash}", contract.name);

        let mut record = self.store.create_transaction(NewTransaction {
            transaction_hash: tx_hash.clone(),
            contract_id: contract.id,
            method_name: method.to_string(),
            parameters: json!(args),
            from_address: options.from.clone(),
            to_address: Some(address.to_string()),
            status: TxStatus::Pending,
            ..Default::default()
        })?;

        if options.wait {
            record = self.finalize(record).await?;
        }
        Ok(CallResult::Transaction(record))
    }

    pub async fn estimate_gas(
        &self,
        contract: &ContractRecord,
        method: &str,
        args: &[Value],
        from: Option<&str>,
    ) -> Result<u64, InteractionError> {
        let abi_doc = contract
            .abi
            .as_ref()
            .ok_or_else(|| InteractionError::MissingAbi(contract.name.clone()))?;
        let address = contract
            .address
            .as_deref()
            .ok_or_else(|| InteractionError::MissingAddress(contract.name.clone()))?;

        let entry = abi_doc.function(method)?;
        let data = abi::encode_call(method, args, entry)?;
        let mut tx = TxRequest::default()
            .with_to(address)
            .with_data(format!("0x{}", hex::encode(data)));
        if let Some(from) = from {
            tx = tx.with_from(from);
        }
        Ok(self.driver.estimate_gas(&tx).await?)
    }

    /// Fetches the receipt for a pending transaction record and settles its
    /// status. Leaves the record pending when no receipt exists yet.
    pub async fn finalize(
        &self,
        record: TransactionRecord,
    ) -> Result<TransactionRecord, InteractionError> {
        let Some(receipt) = self.driver.get_receipt(&record.transaction_hash).await? else {
            return Ok(record);
        };
        let status = if receipt.status {
            TxStatus::Success
        } else {
            TxStatus::Reverted
        };
        let updated = self.store.update_transaction(
            record.id,
            TransactionUpdate {
                status: Some(status),
                gas_used: receipt.gas_used,
                block_number: receipt.block_number,
                confirmed_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
        )?;
        Ok(updated)
    }
}

/// Parses user-entered call arguments: a JSON array verbatim, anything else
/// as comma-separated strings.
pub fn parse_params(input: &str) -> Vec<Value> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return vec![];
    }
    if let Ok(Value::Array(values)) = serde_json::from_str(trimmed) {
        return values;
    }
    trimmed
        .split(',')
        .map(|part| Value::String(part.trim().to_string()))
        .collect()
}

/// Renders a decoded return value for display.
pub fn format_return_value(value: &Value, as_json: bool) -> String {
    if as_json {
        return serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    }
    match value {
        Value::Null => "(no return value)".to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| format_return_value(item, false))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::core::abi::{AbiDocument, AbiEntry, AbiParam};
    use crate::core::storage::{MemoryStore, NewContract};
    use crate::testing::MockDriver;

    use super::*;

    fn token_abi() -> AbiDocument {
        AbiDocument(vec![
            AbiEntry {
                kind: "function".into(),
                name: Some("totalSupply".into()),
                outputs: vec![AbiParam::new("", "uint256")],
                state_mutability: Some("view".into()),
                ..Default::default()
            },
            AbiEntry {
                kind: "function".into(),
                name: Some("transfer".into()),
                inputs: vec![
                    AbiParam::new("to", "address"),
                    AbiParam::new("amount", "uint256"),
                ],
                outputs: vec![AbiParam::new("", "bool")],
                state_mutability: Some("nonpayable".into()),
                ..Default::default()
            },
        ])
    }

    fn setup(driver: MockDriver) -> (Interactor, Arc<MemoryStore>, ContractRecord) {
        let store = Arc::new(MemoryStore::new());
        let contract = store
            .create_contract(NewContract {
                name: "Token".into(),
                version: "1.0.0".into(),
                network: "testnet".into(),
                address: Some("0xtoken".into()),
                abi: Some(token_abi()),
                ..Default::default()
            })
            .unwrap();
        (
            Interactor::new(Arc::new(driver), store.clone()),
            store,
            contract,
        )
    }

    #[tokio::test]
    async fn test_view_call_returns_value_without_record() {
        let driver = MockDriver::new("testnet").with_call_result(json!(1000));
        let (interactor, store, contract) = setup(driver);

        let result = interactor
            .call(&contract, "totalSupply", &[], CallOptions::default())
            .await
            .unwrap();
        let CallResult::Value(value) = result else {
            panic!("expected a value");
        };
        assert_eq!(value, json!(1000));
        assert_eq!(store.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_mutating_call_records_pending_transaction() {
        let driver = MockDriver::new("testnet");
        let (interactor, store, contract) = setup(driver);

        let result = interactor
            .call(
                &contract,
                "transfer",
                &[json!("0x2222222222222222222222222222222222222222"), json!(5)],
                CallOptions {
                    from: Some("0xsender".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let CallResult::Transaction(record) = result else {
            panic!("expected a transaction record");
        };
        assert_eq!(record.status, TxStatus::Pending);
        assert_eq!(record.method_name, "transfer");
        assert_eq!(record.to_address.as_deref(), Some("0xtoken"));
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_waited_call_settles_from_receipt() {
        let driver = MockDriver::new("testnet").with_receipt_status(false);
        let (interactor, _, contract) = setup(driver);

        let result = interactor
            .call(
                &contract,
                "transfer",
                &[json!("0x2222222222222222222222222222222222222222"), json!(5)],
                CallOptions {
                    wait: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let CallResult::Transaction(record) = result else {
            panic!("expected a transaction record");
        };
        assert_eq!(record.status, TxStatus::Reverted);
        assert!(record.confirmed_at.is_some());
    }

    #[tokio::test]
    async fn test_call_requires_abi_and_address() {
        let driver = MockDriver::new("testnet");
        let store = Arc::new(MemoryStore::new());
        let bare = store
            .create_contract(NewContract {
                name: "Bare".into(),
                version: "1.0.0".into(),
                network: "testnet".into(),
                ..Default::default()
            })
            .unwrap();
        let interactor = Interactor::new(Arc::new(driver), store);

        let err = interactor
            .call(&bare, "anything", &[], CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InteractionError::MissingAbi(_)));
    }

    #[test]
    fn test_parse_params_json_array() {
        assert_eq!(
            parse_params(r#"["0xabc", 5, true]"#),
            vec![json!("0xabc"), json!(5), json!(true)],
        );
    }

    #[test]
    fn test_parse_params_comma_separated() {
        assert_eq!(
            parse_params("0xabc, 5"),
            vec![json!("0xabc"), json!("5")],
        );
        assert!(parse_params("  ").is_empty());
    }

    #[test]
    fn test_format_return_value() {
        assert_eq!(format_return_value(&json!(null), false), "(no return value)");
        assert_eq!(format_return_value(&json!("0xabc"), false), "0xabc");
        assert_eq!(format_return_value(&json!([1, 2]), false), "1, 2");
        assert_eq!(format_return_value(&json!(7), true), "7");
    }
}
