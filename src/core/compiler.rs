// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Contract compilation and artifact management.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::abi::AbiDocument;

#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    #[error("solc not found on PATH; install solidity or provide precompiled artifacts")]
    SolcNotFound,
    #[error("compilation of {name} failed: {stderr}")]
    CompilationFailed { name: String, stderr: String },
    #[error("compiled output has no contract named {name}")]
    MissingContract { name: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed compiler output: {0}")]
    Json(#[from] serde_json::Error),
}

/// A compiled contract: everything a deployment needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifacts {
    pub abi: AbiDocument,
    /// Hex-encoded deployment bytecode, `0x`-prefixed.
    pub bytecode: String,
}

/// Compilation and artifact storage, behind a trait so orchestrators can be
/// tested without a solidity toolchain.
pub trait ContractCompiler: Send + Sync {
    fn compile(&self, name: &str, source: &str) -> Result<Artifacts, CompilerError>;

    fn compile_from_file(&self, name: &str, path: &Path) -> Result<Artifacts, CompilerError> {
        let source = fs::read_to_string(path)?;
        self.compile(name, &source)
    }

    /// Previously stored artifacts for a contract version, if any.
    fn load_artifacts(&self, name: &str, version: &str) -> Option<Artifacts>;

    fn store_artifacts(
        &self,
        name: &str,
        version: &str,
        artifacts: &Artifacts,
    ) -> Result<(), CompilerError>;
}

/// Shells out to `solc` and caches artifacts as JSON files.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    artifact_dir: PathBuf,
}

impl SolcCompiler {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }

    fn artifact_path(&self, name: &str, version: &str) -> PathBuf {
        self.artifact_dir.join(format!("{name}-{version}.json"))
    }
}

impl ContractCompiler for SolcCompiler {
    fn compile(&self, name: &str, source: &str) -> Result<Artifacts, CompilerError> {
        let mut child = Command::new("solc")
            .args(["--combined-json", "abi,bin", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => CompilerError::SolcNotFound,
                _ => CompilerError::Io(err),
            })?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(source.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(CompilerError::CompilationFailed {
                name: name.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let combined: Value = serde_json::from_slice(&output.stdout)?;
        parse_combined_json(name, &combined)
    }

    fn load_artifacts(&self, name: &str, version: &str) -> Option<Artifacts> {
        let path = self.artifact_path(name, version);
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn store_artifacts(
        &self,
        name: &str,
        version: &str,
        artifacts: &Artifacts,
    ) -> Result<(), CompilerError> {
        fs::create_dir_all(&self.artifact_dir)?;
        let path = self.artifact_path(name, version);
        fs::write(path, serde_json::to_string_pretty(artifacts)?)?;
        Ok(())
    }
}

/// Pulls one contract's artifacts out of solc `--combined-json abi,bin`
/// output. Keys look like `<stdin>:Counter`; depending on the solc version
/// the abi field is either inline JSON or a JSON-encoded string.
fn parse_combined_json(name: &str, combined: &Value) -> Result<Artifacts, CompilerError> {
    let contracts = combined
        .get("contracts")
        .and_then(Value::as_object)
        .ok_or_else(|| CompilerError::MissingContract {
            name: name.to_string(),
        })?;

    let entry = contracts
        .iter()
        .find(|(key, _)| key.ends_with(&format!(":{name}")))
        .map(|(_, value)| value)
        .ok_or_else(|| CompilerError::MissingContract {
            name: name.to_string(),
        })?;

    let abi = match entry.get("abi") {
        Some(Value::String(text)) => serde_json::from_str(text)?,
        Some(value) => serde_json::from_value(value.clone())?,
        None => AbiDocument::default(),
    };
    let bin = entry.get("bin").and_then(Value::as_str).unwrap_or_default();

    Ok(Artifacts {
        abi,
        bytecode: format!("0x{bin}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::abi::{AbiEntry, AbiParam};

    fn sample_artifacts() -> Artifacts {
        Artifacts {
            abi: AbiDocument(vec![AbiEntry {
                kind: "function".into(),
                name: Some("get".into()),
                outputs: vec![AbiParam::new("", "uint256")],
                ..Default::default()
            }]),
            bytecode: "0x6001600101".into(),
        }
    }

    #[test]
    fn test_store_and_load_artifacts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = SolcCompiler::new(dir.path());
        let artifacts = sample_artifacts();

        compiler.store_artifacts("Counter", "1.0.0", &artifacts).unwrap();
        let loaded = compiler.load_artifacts("Counter", "1.0.0").unwrap();

        assert_eq!(loaded.bytecode, artifacts.bytecode);
        assert_eq!(loaded.abi, artifacts.abi);
        assert!(compiler.load_artifacts("Counter", "2.0.0").is_none());
    }

    #[test]
    fn test_parse_combined_json_with_string_encoded_abi() {
        // Older solc emits the abi field as a JSON-encoded string.
        let combined = serde_json::json!({
            "contracts": {
                "<stdin>:Counter": {
                    "abi": "[{\"type\":\"function\",\"name\":\"get\",\"inputs\":[],\"outputs\":[{\"name\":\"\",\"type\":\"uint256\"}]}]",
                    "bin": "6001600101",
                }
            }
        });
        let artifacts = parse_combined_json("Counter", &combined).unwrap();
        assert_eq!(artifacts.bytecode, "0x6001600101");
        assert!(artifacts.abi.function("get").is_ok());
    }

    #[test]
    fn test_parse_combined_json_with_inline_abi() {
        let combined = serde_json::json!({
            "contracts": {
                "<stdin>:Counter": {
                    "abi": [{"type": "function", "name": "get", "inputs": [], "outputs": []}],
                    "bin": "6001",
                }
            }
        });
        let artifacts = parse_combined_json("Counter", &combined).unwrap();
        assert!(artifacts.abi.function("get").is_ok());
    }

    #[test]
    fn test_parse_combined_json_missing_contract() {
        let combined = serde_json::json!({ "contracts": {} });
        let err = parse_combined_json("Ghost", &combined).unwrap_err();
        assert!(matches!(err, CompilerError::MissingContract { .. }));
    }

    #[test]
    fn test_artifact_files_are_versioned() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = SolcCompiler::new(dir.path());
        compiler
            .store_artifacts("Token", "1.0.0", &sample_artifacts())
            .unwrap();

        assert!(dir.path().join("Token-1.0.0.json").exists());
    }
}
