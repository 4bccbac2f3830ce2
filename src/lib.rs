// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! Tools for managing the lifecycle of contracts on EVM and ledger-database
//! backends.
//!
//! The crate pairs an ABI codec ([`core::abi`]) with a deployment and upgrade
//! orchestrator ([`core::deployment`], [`core::upgrade`]) driven through a
//! narrow JSON-RPC transport ([`core::rpc`]). Persistence of contract and
//! transaction records is delegated to a [`core::storage::ContractStore`]
//! collaborator; source compilation to a [`core::compiler::ContractCompiler`].

#[macro_use]
mod macros;

pub mod core;
pub(crate) mod error;
pub mod testing;

pub mod utils;

pub use error::{Error, Result};
