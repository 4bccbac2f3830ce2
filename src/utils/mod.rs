// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! General purpose utilities.

pub mod color;

/// Strips an optional `0x` prefix from a hex string.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

/// Formats an integer as a `0x`-prefixed hex string, the way JSON-RPC
/// expects quantities on the wire.
pub fn to_hex_quantity(value: u128) -> String {
    format!("{value:#x}")
}

/// Parses a `0x`-prefixed (or bare) hex quantity into a u128.
pub fn from_hex_quantity(s: &str) -> Option<u128> {
    u128::from_str_radix(strip_hex_prefix(s), 16).ok()
}

/// Pretty-prints a gas amount.
pub fn format_gas(gas: u64) -> String {
    format!("{gas} gas units")
}
