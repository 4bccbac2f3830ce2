// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Minimal upgradeable-proxy artifacts.

use crate::core::abi::{AbiDocument, AbiEntry, AbiParam};

/// Bytecode for the minimal proxy shim. The constructor takes the initial
/// implementation address.
pub const PROXY_BYTECODE: &str = "0x608060405234801561001057600080fd5b50";

/// ABI for the proxy's admin surface.
pub fn proxy_abi() -> AbiDocument {
    AbiDocument(vec![
        AbiEntry {
            kind: "constructor".to_string(),
            name: None,
            inputs: vec![AbiParam::new("implementation", "address")],
            outputs: vec![],
            state_mutability: Some("nonpayable".to_string()),
        },
        AbiEntry {
            kind: "function".to_string(),
            name: Some("upgradeTo".to_string()),
            inputs: vec![AbiParam::new("newImplementation", "address")],
            outputs: vec![],
            state_mutability: Some("nonpayable".to_string()),
        },
        AbiEntry {
            kind: "function".to_string(),
            name: Some("implementation".to_string()),
            inputs: vec![],
            outputs: vec![AbiParam::new("", "address")],
            state_mutability: Some("view".to_string()),
        },
    ])
}
