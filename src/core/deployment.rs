// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Contract deployment orchestration.
//!
//! Resolves artifacts (explicit, cached, or compiled), submits the deployment
//! through a [`ChainDriver`], and persists the resulting records. All record
//! writes for one deployment happen in a single store transaction, and only
//! after every remote call has succeeded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::core::abi::AbiDocument;
use crate::core::compiler::{Artifacts, CompilerError, ContractCompiler};
use crate::core::driver::{ChainDriver, DeployOutcome, DeployParams, DriverError};
use crate::core::rpc::{TransactionReceipt, TxRequest};
use crate::core::storage::{
    ContractRecord, ContractStatus, ContractStore, NewContract, NewTransaction, StoreError,
    TxStatus,
};
use crate::utils::format_gas;

#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    #[error("no artifacts available for {name}: provide bytecode, cached artifacts, or source")]
    ArtifactsUnavailable { name: String },
    #[error("transaction {tx_hash} was not confirmed within {timeout_secs}s")]
    ConfirmationTimedOut { tx_hash: String, timeout_secs: u64 },
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Compiler(#[from] CompilerError),
}

#[derive(Debug, Clone)]
pub struct GasConfig {
    pub default_limit: u64,
    /// Headroom applied on top of the node's estimate.
    pub estimate_multiplier: f64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            default_limit: 3_000_000,
            estimate_multiplier: 1.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub default_network: String,
    pub gas: GasConfig,
    pub confirmation_poll_interval: Duration,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            default_network: "local".to_string(),
            gas: GasConfig::default(),
            confirmation_poll_interval: Duration::from_secs(2),
        }
    }
}

/// One deployment request. Artifact sources are tried in order: explicit
/// bytecode, cached artifacts, inline source, source file.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub name: String,
    pub version: String,
    pub network: Option<String>,
    pub abi: Option<AbiDocument>,
    pub bytecode: Option<String>,
    pub source_code: Option<String>,
    pub source_file: Option<PathBuf>,
    pub constructor_args: Vec<Value>,
    pub from: Option<String>,
    pub gas_limit: Option<u64>,
    /// Estimate cost and return a preview instead of submitting.
    pub preview: bool,
}

#[derive(Debug, Clone)]
pub struct Deployment {
    pub contract: ContractRecord,
    pub outcome: DeployOutcome,
    pub artifacts: Artifacts,
}

#[derive(Debug, Clone)]
pub struct DeploymentPreview {
    pub contract_name: String,
    pub network: String,
    pub from: Option<String>,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub estimated_cost_wei: u128,
    pub constructor_args: Vec<Value>,
    pub bytecode_size: usize,
}

#[derive(Debug, Clone)]
pub enum DeployOutput {
    Deployed(Box<Deployment>),
    Preview(DeploymentPreview),
}

/// Deployment orchestrator. Cheap to clone; shares its driver, store and
/// compiler.
#[derive(Clone)]
pub struct Deployer {
    driver: Arc<dyn ChainDriver>,
    store: Arc<dyn ContractStore>,
    compiler: Arc<dyn ContractCompiler>,
    config: DeployConfig,
}

impl Deployer {
    pub fn new(
        driver: Arc<dyn ChainDriver>,
        store: Arc<dyn ContractStore>,
        compiler: Arc<dyn ContractCompiler>,
        config: DeployConfig,
    ) -> Self {
        Self {
            driver,
            store,
            compiler,
            config,
        }
    }

    pub fn driver(&self) -> &Arc<dyn ChainDriver> {
        &self.driver
    }

    pub fn store(&self) -> &Arc<dyn ContractStore> {
        &self.store
    }

    pub fn compiler(&self) -> &Arc<dyn ContractCompiler> {
        &self.compiler
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployOutput, DeploymentError> {
        if request.preview {
            return Ok(DeployOutput::Preview(self.preview(request).await?));
        }
        self.submit(request)
            .await
            .map(|d| DeployOutput::Deployed(Box::new(d)))
    }

    /// Deploys unconditionally, ignoring the request's `preview` flag.
    pub async fn submit(&self, request: DeployRequest) -> Result<Deployment, DeploymentError> {
        let network = self.resolve_network(&request);
        let artifacts = self.resolve_artifacts(&request)?;
        info!(@grey, "deploying {} {} to {}", request.name.mint(), request.version, network);

        let gas_limit = match request.gas_limit {
            Some(gas) => gas,
            None => self.estimate_deployment_gas(&artifacts, &request).await,
        };

        let params = DeployParams {
            bytecode: artifacts.bytecode.clone(),
            abi: artifacts.abi.clone(),
            constructor_args: request.constructor_args.clone(),
            from: request.from.clone(),
            gas_limit: Some(gas_limit),
        };

        let outcome = match self.driver.deploy(params).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // Record the failed attempt so the family's history shows it,
                // then surface the driver error.
                self.persist_failed(&request, &network, &err)?;
                return Err(err.into());
            }
        };

        let contract = self.persist_deployed(&request, &network, &artifacts, &outcome)?;
        match &outcome.address {
            Some(address) => {
                info!(@mint, "deployed {} at {} ({})", request.name, address, format_gas(outcome.gas_used.unwrap_or_default()));
            }
            None => {
                info!(@grey, "submitted {} as {} (address pending)", request.name, outcome.tx_hash);
            }
        }

        Ok(Deployment {
            contract,
            outcome,
            artifacts,
        })
    }

    async fn preview(&self, request: DeployRequest) -> Result<DeploymentPreview, DeploymentError> {
        let network = self.resolve_network(&request);
        // A preview must not require compilable source, so fall back to a
        // fixed-size placeholder when artifacts are missing.
        let artifacts = self.resolve_artifacts(&request).unwrap_or_else(|_| Artifacts {
            abi: AbiDocument::default(),
            bytecode: format!("0x{}", "00".repeat(100)),
        });

        let gas_limit = match request.gas_limit {
            Some(gas) => gas,
            None => self.estimate_deployment_gas(&artifacts, &request).await,
        };
        let gas_price = self.driver.gas_price().await.unwrap_or_default();

        Ok(DeploymentPreview {
            contract_name: request.name,
            network,
            from: request.from,
            gas_limit,
            gas_price,
            estimated_cost_wei: gas_price.saturating_mul(gas_limit as u128),
            constructor_args: request.constructor_args,
            bytecode_size: bytecode_len(&artifacts.bytecode),
        })
    }

    /// Waits until the transaction has a mined receipt (one carrying a block
    /// number), or the deadline passes. `Ok(None)` means timeout.
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: &str,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, DeploymentError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.driver.get_receipt(tx_hash).await? {
                if receipt.block_number.is_some() {
                    return Ok(Some(receipt));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.config.confirmation_poll_interval).await;
        }
    }

    /// Like [`wait_for_confirmation`], but a missed deadline is an error.
    ///
    /// [`wait_for_confirmation`]: Self::wait_for_confirmation
    pub async fn confirm(
        &self,
        tx_hash: &str,
        timeout: Duration,
    ) -> Result<TransactionReceipt, DeploymentError> {
        self.wait_for_confirmation(tx_hash, timeout)
            .await?
            .ok_or_else(|| DeploymentError::ConfirmationTimedOut {
                tx_hash: tx_hash.to_string(),
                timeout_secs: timeout.as_secs(),
            })
    }

    fn resolve_network(&self, request: &DeployRequest) -> String {
        request
            .network
            .clone()
            .unwrap_or_else(|| self.config.default_network.clone())
    }

    fn resolve_artifacts(&self, request: &DeployRequest) -> Result<Artifacts, DeploymentError> {
        if let Some(bytecode) = &request.bytecode {
            return Ok(Artifacts {
                abi: request.abi.clone().unwrap_or_default(),
                bytecode: bytecode.clone(),
            });
        }
        if let Some(artifacts) = self.compiler.load_artifacts(&request.name, &request.version) {
            debug!(@grey, "using cached artifacts for {} {}", request.name, request.version);
            return Ok(artifacts);
        }
        if let Some(source) = &request.source_code {
            let artifacts = self.compiler.compile(&request.name, source)?;
            self.compiler
                .store_artifacts(&request.name, &request.version, &artifacts)?;
            return Ok(artifacts);
        }
        if let Some(path) = &request.source_file {
            let artifacts = self.compiler.compile_from_file(&request.name, path)?;
            self.compiler
                .store_artifacts(&request.name, &request.version, &artifacts)?;
            return Ok(artifacts);
        }
        Err(DeploymentError::ArtifactsUnavailable {
            name: request.name.clone(),
        })
    }

    async fn estimate_deployment_gas(
        &self,
        artifacts: &Artifacts,
        request: &DeployRequest,
    ) -> u64 {
        let tx = TxRequest {
            from: request.from.clone(),
            data: Some(artifacts.bytecode.clone()),
            ..Default::default()
        };
        match self.driver.estimate_gas(&tx).await {
            Ok(estimate) => {
                (estimate as f64 * self.config.gas.estimate_multiplier) as u64
            }
            Err(err) => {
                warn!(@yellow, "gas estimation failed ({err}), using default of {}", format_gas(self.config.gas.default_limit));
                self.config.gas.default_limit
            }
        }
    }

    fn persist_deployed(
        &self,
        request: &DeployRequest,
        network: &str,
        artifacts: &Artifacts,
        outcome: &DeployOutcome,
    ) -> Result<ContractRecord, DeploymentError> {
        let now = Utc::now();
        let new_contract = NewContract {
            name: request.name.clone(),
            version: request.version.clone(),
            backend: self.driver.kind(),
            address: outcome.address.clone(),
            network: network.to_string(),
            deployer_address: request.from.clone(),
            abi: Some(artifacts.abi.clone()),
            bytecode_hash: Some(bytecode_hash(&artifacts.bytecode)),
            constructor_params: json!(request.constructor_args),
            deployed_at: Some(now),
            transaction_hash: Some(outcome.tx_hash.clone()),
            gas_used: outcome.gas_used,
            status: ContractStatus::Deployed,
            ..Default::default()
        };

        let mut created = None;
        self.store.transaction(&mut |store| {
            let contract = store.create_contract(new_contract.clone())?;
            if !outcome.tx_hash.is_empty() {
                store.create_transaction(NewTransaction {
                    transaction_hash: outcome.tx_hash.clone(),
                    contract_id: contract.id,
                    method_name: "constructor".to_string(),
                    parameters: json!(request.constructor_args),
                    gas_used: outcome.gas_used,
                    from_address: request.from.clone(),
                    to_address: outcome.address.clone(),
                    status: TxStatus::Success,
                    confirmed_at: Some(now),
                    ..Default::default()
                })?;
            }
            created = Some(contract);
            Ok(())
        })?;

        // The closure ran exactly once on success.
        created.ok_or(StoreError::Backend("transaction scope yielded no record".into()))
            .map_err(Into::into)
    }

    fn persist_failed(
        &self,
        request: &DeployRequest,
        network: &str,
        err: &DriverError,
    ) -> Result<(), DeploymentError> {
        warn!(@red, "deployment of {} failed: {err}", request.name);
        self.store.create_contract(NewContract {
            name: request.name.clone(),
            version: request.version.clone(),
            backend: self.driver.kind(),
            network: network.to_string(),
            deployer_address: request.from.clone(),
            constructor_params: json!(request.constructor_args),
            status: ContractStatus::Failed,
            metadata: json!({ "error": err.to_string() }),
            ..Default::default()
        })?;
        Ok(())
    }
}

fn bytecode_hash(bytecode: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytecode.trim_start_matches("0x").as_bytes());
    hex::encode(hasher.finalize())
}

fn bytecode_len(bytecode: &str) -> usize {
    bytecode.trim_start_matches("0x").len() / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::storage::MemoryStore;
    use crate::testing::{MockCompiler, MockDriver};

    fn deployer(driver: MockDriver) -> (Deployer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let deployer = Deployer::new(
            Arc::new(driver),
            store.clone(),
            Arc::new(MockCompiler::default()),
            DeployConfig::default(),
        );
        (deployer, store)
    }

    fn request() -> DeployRequest {
        DeployRequest {
            name: "Counter".into(),
            version: "1.0.0".into(),
            bytecode: Some("0x6001600101".into()),
            from: Some("0xdeployer".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_deploy_persists_contract_and_constructor_tx() {
        let driver = MockDriver::new("testnet").with_deploy_address("0xc0ffee");
        let (deployer, store) = deployer(driver);

        let output = deployer.deploy(request()).await.unwrap();
        let DeployOutput::Deployed(deployment) = output else {
            panic!("expected a deployment");
        };

        assert_eq!(deployment.contract.name, "Counter");
        assert_eq!(deployment.contract.address.as_deref(), Some("0xc0ffee"));
        assert_eq!(deployment.contract.status, ContractStatus::Deployed);
        assert!(deployment.contract.deployed_at.is_some());
        assert_eq!(store.contract_count(), 1);
        assert_eq!(store.transaction_count(), 1);

        let tx = store
            .latest_transaction(deployment.contract.id, "constructor")
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TxStatus::Success);
        assert_eq!(tx.to_address.as_deref(), Some("0xc0ffee"));
    }

    #[tokio::test]
    async fn test_deploy_records_failure() {
        let driver = MockDriver::new("testnet").with_deploy_failure();
        let (deployer, store) = deployer(driver);

        let err = deployer.deploy(request()).await.unwrap_err();
        assert!(matches!(err, DeploymentError::Driver(_)));

        // A failed record exists; no transaction was written.
        assert_eq!(store.contract_count(), 1);
        assert_eq!(store.transaction_count(), 0);
        let record = store.find_latest("Counter", "local").unwrap().unwrap();
        assert_eq!(record.status, ContractStatus::Failed);
        assert!(record.metadata.get("error").is_some());
    }

    #[tokio::test]
    async fn test_deploy_without_artifacts_fails_before_submission() {
        let driver = MockDriver::new("testnet");
        let (deployer, store) = deployer(driver);

        let err = deployer
            .deploy(DeployRequest {
                name: "Ghost".into(),
                version: "1.0.0".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::ArtifactsUnavailable { .. }));
        assert_eq!(store.contract_count(), 0);
    }

    #[tokio::test]
    async fn test_gas_estimate_gets_headroom() {
        let driver = MockDriver::new("testnet")
            .with_deploy_address("0xc0ffee")
            .with_gas_estimate(100_000);
        let (deployer, _) = deployer(driver);

        let gas = deployer
            .estimate_deployment_gas(
                &Artifacts {
                    bytecode: "0x6001".into(),
                    ..Default::default()
                },
                &request(),
            )
            .await;
        assert_eq!(gas, 110_000);
    }

    #[tokio::test]
    async fn test_gas_estimation_failure_uses_default() {
        let driver = MockDriver::new("testnet").with_estimate_failure();
        let (deployer, _) = deployer(driver);

        let gas = deployer
            .estimate_deployment_gas(&Artifacts::default(), &request())
            .await;
        assert_eq!(gas, 3_000_000);
    }

    #[tokio::test]
    async fn test_preview_submits_nothing() {
        let driver = MockDriver::new("testnet")
            .with_gas_estimate(50_000)
            .with_gas_price(20);
        let (deployer, store) = deployer(driver);

        let mut req = request();
        req.preview = true;
        let output = deployer.deploy(req).await.unwrap();
        let DeployOutput::Preview(preview) = output else {
            panic!("expected a preview");
        };

        assert_eq!(preview.gas_limit, 55_000);
        assert_eq!(preview.gas_price, 20);
        assert_eq!(preview.estimated_cost_wei, 55_000 * 20);
        assert_eq!(preview.bytecode_size, 5);
        assert_eq!(store.contract_count(), 0);
    }

    #[tokio::test]
    async fn test_preview_without_artifacts_uses_placeholder() {
        let driver = MockDriver::new("testnet").with_gas_estimate(50_000);
        let (deployer, _) = deployer(driver);

        let output = deployer
            .deploy(DeployRequest {
                name: "Ghost".into(),
                version: "1.0.0".into(),
                preview: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let DeployOutput::Preview(preview) = output else {
            panic!("expected a preview");
        };
        assert_eq!(preview.bytecode_size, 100);
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_returns_mined_receipt() {
        let driver = MockDriver::new("testnet").with_deploy_address("0xc0ffee");
        let (deployer, _) = deployer(driver);

        let output = deployer.deploy(request()).await.unwrap();
        let DeployOutput::Deployed(deployment) = output else {
            panic!("expected a deployment");
        };

        // The receipt carries a block number, so polling ends immediately.
        let receipt = deployer
            .wait_for_confirmation(&deployment.outcome.tx_hash, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("mined receipt");
        assert_eq!(receipt.transaction_hash, deployment.outcome.tx_hash);
        assert!(receipt.block_number.is_some());
        assert!(receipt.status);
    }

    #[tokio::test]
    async fn test_confirm_times_out() {
        let driver = MockDriver::new("testnet");
        let store = Arc::new(MemoryStore::new());
        let deployer = Deployer::new(
            Arc::new(driver),
            store,
            Arc::new(MockCompiler::default()),
            DeployConfig {
                confirmation_poll_interval: Duration::from_millis(1),
                ..Default::default()
            },
        );

        let err = deployer
            .confirm("0xmissing", Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::ConfirmationTimedOut { .. }));
    }
}
