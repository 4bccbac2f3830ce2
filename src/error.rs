// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Top-level error type, aggregating the per-module errors.

use crate::core::abi::AbiError;
use crate::core::compiler::CompilerError;
use crate::core::deployment::DeploymentError;
use crate::core::driver::DriverError;
use crate::core::interaction::InteractionError;
use crate::core::rpc::TransportError;
use crate::core::storage::StoreError;
use crate::core::upgrade::UpgradeError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Compiler(#[from] CompilerError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
    #[error(transparent)]
    Interaction(#[from] InteractionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
