// Copyright 2025, Offchain Labs, Inc.
// For licensing, see https://github.com/OffchainLabs/stylus-sdk-rs/blob/main/licenses/COPYRIGHT.md

//! ABI codec: translation between structured call arguments and the 32-byte
//! word calldata layout.
//!
//! The codec is deliberately simplified: arrays are encoded as a length word
//! followed by a fixed-width concatenation of their elements, and multi-output
//! decoding advances one word per field. Neither matches the official
//! head/tail offset layout for dynamic types, but both reproduce the wire
//! bytes of the artifacts this crate manages. Negative integers are likewise
//! encoded as their 64-bit two's-complement pattern without 256-bit sign
//! extension. See DESIGN.md before "fixing" any of this.

use alloy_primitives::{keccak256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::strip_hex_prefix;

/// Width of an ABI word in bytes.
pub const WORD: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("argument count mismatch: expected {expected}, got {got}")]
    ArgumentCountMismatch { expected: usize, got: usize },
    #[error("entry `{0}` not found in ABI")]
    UnrecognizedEntry(String),
    #[error("invalid hex in `{value}`")]
    InvalidHex { value: String },
    #[error("cannot encode {value} as `{kind}`")]
    UnencodableValue { kind: String, value: Value },
    #[error("return data truncated while decoding `{kind}`")]
    TruncatedData { kind: String },
    #[error("invalid ABI document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

/// A single parameter in an ABI entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl AbiParam {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// One entry (function, constructor, event, ...) of a JSON ABI document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEntry {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    #[serde(
        rename = "stateMutability",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub state_mutability: Option<String>,
}

/// A full contract ABI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiDocument(pub Vec<AbiEntry>);

impl AbiDocument {
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ABI serialization")
    }

    /// Looks up a function entry by name.
    pub fn function(&self, name: &str) -> Result<&AbiEntry, AbiError> {
        self.0
            .iter()
            .find(|e| e.kind == "function" && e.name.as_deref() == Some(name))
            .ok_or_else(|| AbiError::UnrecognizedEntry(name.to_string()))
    }

    /// First constructor entry, if the contract declares one.
    pub fn constructor(&self) -> Option<&AbiEntry> {
        self.0.iter().find(|e| e.kind == "constructor")
    }
}

/// A 4-byte function selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector(pub [u8; 4]);

impl Selector {
    pub fn to_hex(self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

/// Computes the selector for `name(type1,type2,...)`: the first 4 bytes of
/// the keccak-256 hash of the canonical signature.
pub fn function_selector(name: &str, inputs: &[AbiParam]) -> Selector {
    let types: Vec<&str> = inputs.iter().map(|p| p.kind.as_str()).collect();
    let signature = format!("{name}({})", types.join(","));
    let hash = keccak256(signature.as_bytes());
    Selector([hash[0], hash[1], hash[2], hash[3]])
}

/// Encodes a method call: selector followed by the encoded arguments.
pub fn encode_call(name: &str, args: &[Value], entry: &AbiEntry) -> Result<Vec<u8>, AbiError> {
    let selector = function_selector(name, &entry.inputs);
    let mut data = selector.0.to_vec();
    data.extend(encode_parameters(args, &entry.inputs)?);
    Ok(data)
}

/// Encodes a deployment payload: raw bytecode followed by encoded constructor
/// arguments (empty when there is no constructor or it takes no inputs).
pub fn encode_constructor(
    args: &[Value],
    constructor: Option<&AbiEntry>,
    bytecode_hex: &str,
) -> Result<Vec<u8>, AbiError> {
    let bytecode = strip_hex_prefix(bytecode_hex);
    let mut data = hex::decode(bytecode).map_err(|_| AbiError::InvalidHex {
        value: bytecode_hex.to_string(),
    })?;
    if let Some(ctor) = constructor {
        if !ctor.inputs.is_empty() {
            data.extend(encode_parameters(args, &ctor.inputs)?);
        }
    }
    Ok(data)
}

/// Encodes a positional argument list against its parameter specs.
pub fn encode_parameters(args: &[Value], inputs: &[AbiParam]) -> Result<Vec<u8>, AbiError> {
    if args.len() != inputs.len() {
        return Err(AbiError::ArgumentCountMismatch {
            expected: inputs.len(),
            got: args.len(),
        });
    }
    let mut out = Vec::with_capacity(inputs.len() * WORD);
    for (value, input) in args.iter().zip(inputs) {
        encode_parameter(value, &input.kind, &mut out)?;
    }
    Ok(out)
}

fn encode_parameter(value: &Value, kind: &str, out: &mut Vec<u8>) -> Result<(), AbiError> {
    if int_bits(kind).is_some() {
        return encode_uint(value, kind, out);
    }
    if kind == "address" {
        return encode_address(value, out);
    }
    if kind == "bool" {
        return encode_bool(value, kind, out);
    }
    if let Some(size) = fixed_bytes_size(kind) {
        return encode_bytes_fixed(value, kind, size, out);
    }
    if kind == "bytes" {
        return encode_bytes_dynamic(value, out);
    }
    if kind == "string" {
        return encode_string(value, kind, out);
    }
    if let Some(elem) = kind.strip_suffix("[]") {
        return encode_array(value, kind, elem, out);
    }
    // Unknown types fall back to the uint256 rule.
    encode_uint(value, kind, out)
}

/// `uint<N>`/`int<N>` bit width, defaulting to 256 when unsized.
fn int_bits(kind: &str) -> Option<u32> {
    let rest = kind.strip_prefix('u').unwrap_or(kind);
    let rest = rest.strip_prefix("int")?;
    if rest.is_empty() {
        return Some(256);
    }
    rest.parse().ok()
}

fn fixed_bytes_size(kind: &str) -> Option<usize> {
    let rest = kind.strip_prefix("bytes")?;
    let size: usize = rest.parse().ok()?;
    (1..=WORD).contains(&size).then_some(size)
}

fn encode_uint(value: &Value, kind: &str, out: &mut Vec<u8>) -> Result<(), AbiError> {
    let word = match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                U256::from(u)
            } else if let Some(i) = n.as_i64() {
                // 64-bit two's complement, zero-extended. Not the official
                // sign-extended layout.
                U256::from(i as u64)
            } else {
                return Err(unencodable(kind, value));
            }
        }
        Value::String(s) => {
            let parsed = if let Some(hex_digits) = s.strip_prefix("0x") {
                U256::from_str_radix(hex_digits, 16)
            } else {
                U256::from_str_radix(s, 10)
            };
            parsed.map_err(|_| unencodable(kind, value))?
        }
        Value::Bool(b) => U256::from(*b as u64),
        _ => return Err(unencodable(kind, value)),
    };
    out.extend(word.to_be_bytes::<WORD>());
    Ok(())
}

fn encode_address(value: &Value, out: &mut Vec<u8>) -> Result<(), AbiError> {
    let Value::String(s) = value else {
        return Err(unencodable("address", value));
    };
    let digits = strip_hex_prefix(s);
    if digits.len() > WORD * 2 {
        return Err(AbiError::InvalidHex { value: s.clone() });
    }
    let padded = format!("{digits:0>64}");
    let word = hex::decode(&padded).map_err(|_| AbiError::InvalidHex { value: s.clone() })?;
    out.extend(word);
    Ok(())
}

fn encode_bool(value: &Value, kind: &str, out: &mut Vec<u8>) -> Result<(), AbiError> {
    let truthy = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => return Err(unencodable(kind, value)),
    };
    out.extend(U256::from(truthy as u64).to_be_bytes::<WORD>());
    Ok(())
}

fn encode_bytes_fixed(
    value: &Value,
    kind: &str,
    size: usize,
    out: &mut Vec<u8>,
) -> Result<(), AbiError> {
    let Value::String(s) = value else {
        return Err(unencodable(kind, value));
    };
    let digits = strip_hex_prefix(s);
    if digits.len() > size * 2 {
        return Err(AbiError::InvalidHex { value: s.clone() });
    }
    // Left-aligned, zero-padded to a full word.
    let padded = format!("{digits:0<64}");
    let word = hex::decode(&padded).map_err(|_| AbiError::InvalidHex { value: s.clone() })?;
    out.extend(word);
    Ok(())
}

fn encode_bytes_dynamic(value: &Value, out: &mut Vec<u8>) -> Result<(), AbiError> {
    let Value::String(s) = value else {
        return Err(unencodable("bytes", value));
    };
    let digits = strip_hex_prefix(s);
    let content = hex::decode(digits).map_err(|_| AbiError::InvalidHex { value: s.clone() })?;
    encode_length_prefixed(&content, out);
    Ok(())
}

fn encode_string(value: &Value, kind: &str, out: &mut Vec<u8>) -> Result<(), AbiError> {
    let Value::String(s) = value else {
        return Err(unencodable(kind, value));
    };
    encode_length_prefixed(s.as_bytes(), out);
    Ok(())
}

/// Byte-count word followed by content padded to the next word boundary.
fn encode_length_prefixed(content: &[u8], out: &mut Vec<u8>) {
    out.extend(U256::from(content.len()).to_be_bytes::<WORD>());
    out.extend(content);
    let remainder = content.len() % WORD;
    if remainder != 0 {
        out.extend(std::iter::repeat(0u8).take(WORD - remainder));
    }
}

fn encode_array(value: &Value, kind: &str, elem: &str, out: &mut Vec<u8>) -> Result<(), AbiError> {
    let Value::Array(items) = value else {
        return Err(unencodable(kind, value));
    };
    out.extend(U256::from(items.len()).to_be_bytes::<WORD>());
    for item in items {
        encode_parameter(item, elem, out)?;
    }
    Ok(())
}

fn unencodable(kind: &str, value: &Value) -> AbiError {
    AbiError::UnencodableValue {
        kind: kind.to_string(),
        value: value.clone(),
    }
}

/// Decodes return data against the declared outputs.
///
/// A single output yields a scalar, multiple outputs a positional list, no
/// outputs `Value::Null`. Multi-output decoding advances one 32-byte word per
/// field regardless of the field's true width.
pub fn decode_result(data: &str, outputs: &[AbiParam]) -> Result<Value, AbiError> {
    let data = strip_hex_prefix(data);
    match outputs {
        [] => Ok(Value::Null),
        [single] => decode_parameter(data, &single.kind),
        many => {
            let mut results = Vec::with_capacity(many.len());
            let mut offset = 0;
            for output in many {
                let slice = data.get(offset..).unwrap_or("");
                results.push(decode_parameter(slice, &output.kind)?);
                offset += WORD * 2;
            }
            Ok(Value::Array(results))
        }
    }
}

fn decode_parameter(data: &str, kind: &str) -> Result<Value, AbiError> {
    let word = |range: std::ops::Range<usize>| {
        data.get(range).ok_or_else(|| AbiError::TruncatedData {
            kind: kind.to_string(),
        })
    };

    if int_bits(kind).is_some() {
        let value = parse_word(word(0..64)?, kind)?;
        return Ok(u256_to_value(value));
    }
    if kind == "address" {
        return Ok(Value::String(format!("0x{}", word(24..64)?)));
    }
    if kind == "bool" {
        let value = parse_word(word(0..64)?, kind)?;
        return Ok(Value::Bool(!value.is_zero()));
    }
    if kind == "bytes32" {
        return Ok(Value::String(format!("0x{}", word(0..64)?)));
    }
    if kind == "string" {
        let len = parse_word(word(0..64)?, kind)?;
        let len = usize::try_from(len).map_err(|_| AbiError::TruncatedData {
            kind: kind.to_string(),
        })?;
        let content = word(64..64 + len * 2)?;
        let bytes = hex::decode(content).map_err(|_| AbiError::InvalidHex {
            value: content.to_string(),
        })?;
        return Ok(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
    }
    // Default: raw hex word.
    Ok(Value::String(format!("0x{}", word(0..64)?)))
}

fn parse_word(digits: &str, kind: &str) -> Result<U256, AbiError> {
    U256::from_str_radix(digits, 16).map_err(|_| AbiError::InvalidHex {
        value: format!("{kind}: {digits}"),
    })
}

fn u256_to_value(value: U256) -> Value {
    match u64::try_from(value) {
        Ok(small) => Value::from(small),
        Err(_) => Value::String(value.to_string()),
    }
}
