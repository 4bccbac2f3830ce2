// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Proxy-based contract upgrades and rollbacks.
//!
//! An upgradeable contract is a pair of records: the implementation and a
//! proxy that delegates to it. Upgrading deploys a new implementation and
//! repoints the proxy; rolling back repoints it at a previously deployed
//! version. Record writes for each transition are grouped in one store
//! transaction, after the chain has accepted the repoint.

use serde_json::{json, Value};

use crate::core::abi::{self, AbiDocument};
use crate::core::deployment::{Deployer, DeployRequest, Deployment, DeploymentError};
use crate::core::driver::DriverError;
use crate::core::proxy;
use crate::core::rpc::TxRequest;
use crate::core::storage::{
    ContractRecord, ContractStatus, ContractUpdate, NewTransaction, StoreError, TxStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("{name} is not upgradeable; deploy it behind a proxy first")]
    NotUpgradeable { name: String },
    #[error("no previous version of {name} on {network} to roll back to")]
    RollbackTargetNotFound { name: String, network: String },
    #[error("no proxy record for {name}; the upgradeable pair is incomplete")]
    ProxyNotFound { name: String },
    #[error("the new implementation has no address yet; cannot repoint the proxy")]
    ImplementationAddressUnknown,
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("abi error: {0}")]
    Abi(#[from] abi::AbiError),
}

#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    /// Repoint the proxy so existing state carries over. When false the new
    /// implementation stands alone.
    pub preserve_state: bool,
    pub from: Option<String>,
    /// Free-form migration note, recorded with the upgrade.
    pub migration: Option<String>,
    pub abi: Option<AbiDocument>,
    pub bytecode: Option<String>,
    pub source_code: Option<String>,
    pub source_file: Option<std::path::PathBuf>,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            preserve_state: true,
            from: None,
            migration: None,
            abi: None,
            bytecode: None,
            source_code: None,
            source_file: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    pub from: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Upgrade {
    pub old_contract: ContractRecord,
    pub new_contract: ContractRecord,
    /// Hash of the proxy repoint transaction, when state was preserved.
    pub upgrade_tx_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Rollback {
    pub deprecated: ContractRecord,
    pub restored: ContractRecord,
    pub rollback_tx_hash: String,
}

#[derive(Debug, Clone)]
pub struct UpgradeablePair {
    pub implementation: ContractRecord,
    pub proxy: ContractRecord,
}

/// Upgrade orchestrator, layered over [`Deployer`].
#[derive(Clone)]
pub struct Upgrader {
    deployer: Deployer,
}

impl Upgrader {
    pub fn new(deployer: Deployer) -> Self {
        Self { deployer }
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    /// Deploys a new implementation version and, unless state preservation is
    /// off, repoints the contract's proxy at it.
    pub async fn upgrade(
        &self,
        old: &ContractRecord,
        new_version: &str,
        options: UpgradeOptions,
    ) -> Result<Upgrade, UpgradeError> {
        if !old.is_upgradeable {
            return Err(UpgradeError::NotUpgradeable {
                name: old.name.clone(),
            });
        }
        info!(@grey, "upgrading {} {} -> {} on {}", old.name.mint(), old.version, new_version, old.network);

        let deployment = self.deploy_implementation(old, new_version, &options).await?;
        let outcome = &deployment.outcome;

        // (repoint tx hash, proxy address) when state is preserved.
        let repoint = if options.preserve_state {
            let proxy_id = old
                .proxy_contract_id
                .ok_or_else(|| UpgradeError::ProxyNotFound {
                    name: old.name.clone(),
                })?;
            let proxy_record = self
                .deployer
                .store()
                .find_contract(proxy_id)?
                .ok_or_else(|| UpgradeError::ProxyNotFound {
                    name: old.name.clone(),
                })?;
            let new_address = outcome
                .address
                .as_deref()
                .ok_or(UpgradeError::ImplementationAddressUnknown)?;
            let tx_hash = self
                .repoint_proxy(&proxy_record, new_address, options.from.as_deref())
                .await?;
            Some((tx_hash, proxy_record.address))
        } else {
            None
        };

        if let Some(note) = &options.migration {
            info!(@grey, "migration note for {} {}: {note}", old.name, new_version);
        }

        // Remote work is done; now persist the transition atomically.
        let store = self.deployer.store();
        let mut result = None;
        store.transaction(&mut |txn| {
            let new_contract = txn.update_contract(
                deployment.contract.id,
                ContractUpdate {
                    is_upgradeable: Some(true),
                    proxy_contract_id: old.proxy_contract_id,
                    metadata: Some(json!({
                        "upgraded_from": old.version,
                        "migration": options.migration,
                    })),
                    ..Default::default()
                },
            )?;
            if let Some((tx_hash, proxy_address)) = &repoint {
                txn.create_transaction(NewTransaction {
                    transaction_hash: tx_hash.clone(),
                    contract_id: new_contract.id,
                    method_name: "upgradeTo".to_string(),
                    parameters: json!([new_contract.address]),
                    from_address: options.from.clone(),
                    to_address: proxy_address.clone(),
                    status: TxStatus::Pending,
                    ..Default::default()
                })?;
            }
            txn.update_contract(
                old.id,
                ContractUpdate {
                    status: Some(ContractStatus::Upgraded),
                    ..Default::default()
                },
            )?;
            result = Some(new_contract);
            Ok(())
        })?;

        let new_contract = result
            .ok_or(StoreError::Backend("transaction scope yielded no record".into()))?;
        info!(@mint, "upgraded {} to {} ({})", old.name, new_version, new_contract.address.as_deref().unwrap_or("pending"));

        Ok(Upgrade {
            old_contract: old.clone(),
            new_contract,
            upgrade_tx_hash: repoint.map(|(tx_hash, _)| tx_hash),
        })
    }

    /// Repoints the proxy back at an earlier implementation.
    pub async fn rollback(
        &self,
        current: &ContractRecord,
        target_version: Option<&str>,
        options: RollbackOptions,
    ) -> Result<Rollback, UpgradeError> {
        if !current.is_upgradeable {
            return Err(UpgradeError::NotUpgradeable {
                name: current.name.clone(),
            });
        }

        let store = self.deployer.store();
        let target = store
            .previous_version(current, target_version)?
            .ok_or_else(|| UpgradeError::RollbackTargetNotFound {
                name: current.name.clone(),
                network: current.network.clone(),
            })?;
        let target_address = target
            .address
            .as_deref()
            .ok_or(UpgradeError::ImplementationAddressUnknown)?;

        let proxy_id = current
            .proxy_contract_id
            .ok_or_else(|| UpgradeError::ProxyNotFound {
                name: current.name.clone(),
            })?;
        let proxy_record = store
            .find_contract(proxy_id)?
            .ok_or_else(|| UpgradeError::ProxyNotFound {
                name: current.name.clone(),
            })?;

        warn!(@yellow, "rolling back {} {} -> {}", current.name, current.version, target.version);
        let tx_hash = self
            .repoint_proxy(&proxy_record, target_address, options.from.as_deref())
            .await?;

        // The rollback record links the repoint transaction to the upgrade
        // being undone, when one is on file.
        let undone = store.latest_transaction(current.id, "upgradeTo")?;

        let mut restored_out = None;
        let mut deprecated_out = None;
        store.transaction(&mut |txn| {
            txn.create_transaction(NewTransaction {
                transaction_hash: tx_hash.clone(),
                contract_id: target.id,
                method_name: "rollback".to_string(),
                parameters: json!([target.address]),
                from_address: options.from.clone(),
                status: TxStatus::Success,
                rollback_id: undone.as_ref().map(|tx| tx.id),
                confirmed_at: Some(chrono::Utc::now()),
                ..Default::default()
            })?;
            deprecated_out = Some(txn.update_contract(
                current.id,
                ContractUpdate {
                    status: Some(ContractStatus::Deprecated),
                    ..Default::default()
                },
            )?);
            restored_out = Some(txn.update_contract(
                target.id,
                ContractUpdate {
                    status: Some(ContractStatus::Deployed),
                    ..Default::default()
                },
            )?);
            Ok(())
        })?;

        let restored = restored_out
            .ok_or(StoreError::Backend("transaction scope yielded no record".into()))?;
        let deprecated = deprecated_out
            .ok_or(StoreError::Backend("transaction scope yielded no record".into()))?;
        info!(@mint, "rolled back {} to {}", current.name, restored.version);

        Ok(Rollback {
            deprecated,
            restored,
            rollback_tx_hash: tx_hash,
        })
    }

    /// Deploys an implementation plus its proxy and links the two records.
    pub async fn create_upgradeable_contract(
        &self,
        request: DeployRequest,
    ) -> Result<UpgradeablePair, UpgradeError> {
        let name = request.name.clone();
        let implementation = self.deployer.submit(request).await?;
        let implementation_address = implementation
            .contract
            .address
            .clone()
            .ok_or(UpgradeError::ImplementationAddressUnknown)?;

        let proxy = self
            .deployer
            .submit(DeployRequest {
                name: format!("{name}_Proxy"),
                version: implementation.contract.version.clone(),
                network: Some(implementation.contract.network.clone()),
                abi: Some(proxy::proxy_abi()),
                bytecode: Some(proxy::PROXY_BYTECODE.to_string()),
                constructor_args: vec![Value::String(implementation_address)],
                from: implementation.contract.deployer_address.clone(),
                ..Default::default()
            })
            .await?;

        let store = self.deployer.store();
        let mut linked = None;
        store.transaction(&mut |txn| {
            let implementation = txn.update_contract(
                implementation.contract.id,
                ContractUpdate {
                    is_upgradeable: Some(true),
                    proxy_contract_id: Some(proxy.contract.id),
                    ..Default::default()
                },
            )?;
            let proxy = txn.update_contract(
                proxy.contract.id,
                ContractUpdate {
                    is_upgradeable: Some(true),
                    implementation_of: Some(implementation.id),
                    ..Default::default()
                },
            )?;
            linked = Some((implementation, proxy));
            Ok(())
        })?;

        let (implementation, proxy) = linked
            .ok_or(StoreError::Backend("transaction scope yielded no record".into()))?;
        info!(@mint, "created upgradeable {} (impl {} behind proxy {})",
            name,
            implementation.address.as_deref().unwrap_or("?"),
            proxy.address.as_deref().unwrap_or("?"));

        Ok(UpgradeablePair {
            implementation,
            proxy,
        })
    }

    async fn deploy_implementation(
        &self,
        old: &ContractRecord,
        new_version: &str,
        options: &UpgradeOptions,
    ) -> Result<Deployment, UpgradeError> {
        self.deployer
            .submit(DeployRequest {
                name: old.name.clone(),
                version: new_version.to_string(),
                network: Some(old.network.clone()),
                abi: options.abi.clone().or_else(|| old.abi.clone()),
                bytecode: options.bytecode.clone(),
                source_code: options.source_code.clone(),
                source_file: options.source_file.clone(),
                from: options.from.clone().or_else(|| old.deployer_address.clone()),
                ..Default::default()
            })
            .await
            .map_err(Into::into)
    }

    async fn repoint_proxy(
        &self,
        proxy_record: &ContractRecord,
        new_implementation: &str,
        from: Option<&str>,
    ) -> Result<String, UpgradeError> {
        let proxy_address =
            proxy_record
                .address
                .as_deref()
                .ok_or_else(|| UpgradeError::ProxyNotFound {
                    name: proxy_record.name.clone(),
                })?;

        let abi_doc = proxy::proxy_abi();
        let entry = abi_doc.function("upgradeTo")?;
        let data = abi::encode_call(
            "upgradeTo",
            &[Value::String(new_implementation.to_string())],
            entry,
        )?;

        let mut tx = TxRequest::default()
            .with_to(proxy_address)
            .with_data(format!("0x{}", hex::encode(data)));
        if let Some(from) = from {
            tx = tx.with_from(from);
        }
        let tx_hash = self.deployer.driver().send_transaction(&tx).await?;
        debug!(@grey, "repointed proxy {proxy_address} at {new_implementation} ({tx_hash})");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::core::deployment::DeployConfig;
    use crate::core::storage::{ContractStore, MemoryStore, NewContract};
    use crate::testing::{MockCompiler, MockDriver};

    use super::*;

    // Any valid 20-byte hex address works; the repoint path ABI-encodes it.
    const IMPL_ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

    fn upgrader(driver: MockDriver) -> (Upgrader, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let deployer = Deployer::new(
            Arc::new(driver),
            store.clone(),
            Arc::new(MockCompiler::default()),
            DeployConfig::default(),
        );
        (Upgrader::new(deployer), store)
    }

    async fn seed_pair(upgrader: &Upgrader) -> UpgradeablePair {
        upgrader
            .create_upgradeable_contract(DeployRequest {
                name: "Token".into(),
                version: "1.0.0".into(),
                network: Some("testnet".into()),
                bytecode: Some("0x6001".into()),
                from: Some("0xadmin".into()),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_upgradeable_contract_links_pair() {
        let driver = MockDriver::new("testnet").with_deploy_address(IMPL_ADDRESS);
        let (upgrader, store) = upgrader(driver);
        let pair = seed_pair(&upgrader).await;

        assert!(pair.implementation.is_upgradeable);
        assert_eq!(pair.implementation.proxy_contract_id, Some(pair.proxy.id));
        assert_eq!(pair.proxy.implementation_of, Some(pair.implementation.id));
        assert_eq!(pair.proxy.name, "Token_Proxy");
        // Proxy constructor received the implementation address.
        assert_eq!(
            pair.proxy.constructor_params,
            json!([pair.implementation.address]),
        );
        assert_eq!(store.contract_count(), 2);
    }

    #[tokio::test]
    async fn test_create_upgradeable_contract_ignores_preview_flag() {
        let driver = MockDriver::new("testnet").with_deploy_address(IMPL_ADDRESS);
        let (upgrader, store) = upgrader(driver);

        // A stray preview flag must not derail the two-step deployment.
        let pair = upgrader
            .create_upgradeable_contract(DeployRequest {
                name: "Token".into(),
                version: "1.0.0".into(),
                network: Some("testnet".into()),
                bytecode: Some("0x6001".into()),
                from: Some("0xadmin".into()),
                preview: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(pair.implementation.address.is_some());
        assert_eq!(store.contract_count(), 2);
    }

    #[tokio::test]
    async fn test_upgrade_repoints_proxy_and_retires_old() {
        let driver = MockDriver::new("testnet").with_deploy_address(IMPL_ADDRESS);
        let (upgrader, store) = upgrader(driver);
        let pair = seed_pair(&upgrader).await;

        let upgrade = upgrader
            .upgrade(
                &pair.implementation,
                "2.0.0",
                UpgradeOptions {
                    bytecode: Some("0x6002".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(upgrade.new_contract.version, "2.0.0");
        assert!(upgrade.new_contract.is_upgradeable);
        assert_eq!(upgrade.new_contract.proxy_contract_id, Some(pair.proxy.id));
        assert!(upgrade.upgrade_tx_hash.is_some());

        let old = store.find_contract(pair.implementation.id).unwrap().unwrap();
        assert_eq!(old.status, ContractStatus::Upgraded);

        // The repoint tx is on file against the new implementation.
        let tx = store
            .latest_transaction(upgrade.new_contract.id, "upgradeTo")
            .unwrap()
            .unwrap();
        assert_eq!(Some(tx.transaction_hash), upgrade.upgrade_tx_hash);
    }

    #[tokio::test]
    async fn test_upgrade_without_state_preservation_skips_repoint() {
        let driver = MockDriver::new("testnet").with_deploy_address(IMPL_ADDRESS);
        let (upgrader, store) = upgrader(driver);
        let pair = seed_pair(&upgrader).await;

        let upgrade = upgrader
            .upgrade(
                &pair.implementation,
                "2.0.0",
                UpgradeOptions {
                    preserve_state: false,
                    bytecode: Some("0x6002".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(upgrade.upgrade_tx_hash.is_none());
        assert!(store
            .latest_transaction(upgrade.new_contract.id, "upgradeTo")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upgrade_rejects_non_upgradeable() {
        let (upgrader, store) = upgrader(MockDriver::new("testnet"));
        let plain = store
            .create_contract(NewContract {
                name: "Plain".into(),
                version: "1.0.0".into(),
                network: "testnet".into(),
                ..Default::default()
            })
            .unwrap();

        let err = upgrader
            .upgrade(&plain, "2.0.0", UpgradeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UpgradeError::NotUpgradeable { .. }));
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_version() {
        let driver = MockDriver::new("testnet").with_deploy_address(IMPL_ADDRESS);
        let (upgrader, store) = upgrader(driver);
        let pair = seed_pair(&upgrader).await;
        let upgrade = upgrader
            .upgrade(
                &pair.implementation,
                "2.0.0",
                UpgradeOptions {
                    bytecode: Some("0x6002".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let rollback = upgrader
            .rollback(&upgrade.new_contract, None, RollbackOptions::default())
            .await
            .unwrap();

        assert_eq!(rollback.restored.id, pair.implementation.id);
        assert_eq!(rollback.restored.status, ContractStatus::Deployed);
        assert_eq!(rollback.deprecated.id, upgrade.new_contract.id);
        assert_eq!(rollback.deprecated.status, ContractStatus::Deprecated);

        // The rollback record points at the upgrade it undid.
        let marker = store
            .latest_transaction(pair.implementation.id, "rollback")
            .unwrap()
            .unwrap();
        assert_eq!(marker.transaction_hash, rollback.rollback_tx_hash);
        assert!(marker.rollback_id.is_some());
    }

    #[tokio::test]
    async fn test_rollback_without_previous_version_fails() {
        let driver = MockDriver::new("testnet").with_deploy_address(IMPL_ADDRESS);
        let (upgrader, _) = upgrader(driver);
        let pair = seed_pair(&upgrader).await;

        let err = upgrader
            .rollback(&pair.implementation, None, RollbackOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UpgradeError::RollbackTargetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rollback_to_named_version() {
        let driver = MockDriver::new("testnet").with_deploy_address(IMPL_ADDRESS);
        let (upgrader, _) = upgrader(driver);
        let pair = seed_pair(&upgrader).await;
        let v2 = upgrader
            .upgrade(
                &pair.implementation,
                "2.0.0",
                UpgradeOptions {
                    bytecode: Some("0x6002".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let v3 = upgrader
            .upgrade(
                &v2.new_contract,
                "3.0.0",
                UpgradeOptions {
                    bytecode: Some("0x6003".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let rollback = upgrader
            .rollback(&v3.new_contract, Some("1.0.0"), RollbackOptions::default())
            .await
            .unwrap();
        assert_eq!(rollback.restored.version, "1.0.0");
    }
}
