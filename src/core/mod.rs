// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

pub mod abi;
pub mod compiler;
pub mod deployment;
pub mod driver;
pub mod interaction;
pub mod proxy;
pub mod rpc;
pub mod storage;
pub mod upgrade;
