use std::str::FromStr;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{Address, B256, I256, U256};
use serde_json::Value as Json;

use super::error::{AbiError, AbiResult};

/// Size of one ABI word in bytes.
pub const WORD: usize = 32;

/// Largest flattened size, in words, of any single type we accept. A fixed
/// array beyond this cannot be returned by a node within sane gas limits.
pub const MAX_TYPE_WORDS: usize = 1 << 20;

/// Parse a canonical type string such as `uint256` or `(uint24,bool)[]`
/// and reject types with no encoded size or an absurd one.
pub fn parse_type(ty: &str) -> Result<DynSolType, String> {
    let parsed = DynSolType::parse(ty).map_err(|e| e.to_string())?;
    if is_zero_sized(&parsed) {
        return Err(format!("'{}' has an empty tuple or zero-length array", ty));
    }
    if !fits_layout(&parsed) {
        return Err(format!("'{}' is too large to encode", ty));
    }
    Ok(parsed)
}

/// Tuple members, whether alloy resolved the tuple as a plain tuple or as a
/// named struct.
pub(crate) fn tuple_members(ty: &DynSolType) -> Option<&[DynSolType]> {
    ty.as_tuple()
        .or_else(|| ty.as_custom_struct().map(|(_, _, members)| members))
}

/// Dynamic types are encoded out of line behind an offset.
pub(crate) fn is_dynamic(ty: &DynSolType) -> bool {
    match ty {
        DynSolType::Bytes | DynSolType::String | DynSolType::Array(_) => true,
        DynSolType::FixedArray(element, _) => is_dynamic(element),
        _ => tuple_members(ty).is_some_and(|members| members.iter().any(is_dynamic)),
    }
}

/// True when `ty` contains an empty tuple or a zero-length fixed array.
pub(crate) fn is_zero_sized(ty: &DynSolType) -> bool {
    match ty {
        DynSolType::Array(element) => is_zero_sized(element),
        DynSolType::FixedArray(element, len) => *len == 0 || is_zero_sized(element),
        _ => match tuple_members(ty) {
            Some(members) => members.is_empty() || members.iter().any(is_zero_sized),
            None => false,
        },
    }
}

/// Flattened word count of `ty` with every fixed array expanded. `None`
/// when the count overflows.
pub(crate) fn min_words(ty: &DynSolType) -> Option<usize> {
    match ty {
        DynSolType::FixedArray(element, len) => min_words(element)?.checked_mul(*len),
        _ => match tuple_members(ty) {
            Some(members) => members
                .iter()
                .try_fold(0usize, |acc, member| acc.checked_add(min_words(member)?)),
            None => Some(1),
        },
    }
}

/// Every type nested in `ty` stays within [`MAX_TYPE_WORDS`].
pub(crate) fn fits_layout(ty: &DynSolType) -> bool {
    if !matches!(min_words(ty), Some(words) if words <= MAX_TYPE_WORDS) {
        return false;
    }
    match ty {
        DynSolType::Array(element) | DynSolType::FixedArray(element, _) => fits_layout(element),
        _ => tuple_members(ty).map_or(true, |members| members.iter().all(fits_layout)),
    }
}

/// Bytes `ty` occupies in the head of its enclosing tuple.
pub(crate) fn head_size(ty: &DynSolType) -> Option<usize> {
    if is_dynamic(ty) {
        return Some(WORD);
    }
    min_words(ty)?.checked_mul(WORD)
}

/// True when `v` is representable as a two's complement integer of `bits`.
pub(crate) fn fits_signed(v: I256, bits: usize) -> bool {
    if bits >= 256 {
        return true;
    }
    let high = v.asr(bits - 1);
    high == I256::ZERO || high == I256::MINUS_ONE
}

/// Short description of a value's type, used in mismatch errors.
pub fn kind(value: &DynSolValue) -> String {
    value
        .sol_type_name()
        .map(|name| name.into_owned())
        .unwrap_or_else(|| "value".to_string())
}

/// Build a value of type `ty` from a JSON argument. `param` names the
/// argument in error messages.
pub fn value_from_json(json: &Json, ty: &DynSolType, param: &str) -> AbiResult<DynSolValue> {
    let mismatch = |expected: &str| AbiError::ArgumentTypeMismatch {
        param: param.to_string(),
        expected: expected.to_string(),
        found: json.to_string(),
    };
    let elements = |element: &DynSolType| -> AbiResult<Vec<DynSolValue>> {
        json.as_array()
            .ok_or_else(|| mismatch("an array"))?
            .iter()
            .enumerate()
            .map(|(i, item)| value_from_json(item, element, &format!("{}[{}]", param, i)))
            .collect()
    };

    match ty {
        DynSolType::Uint(bits) => match json {
            Json::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(DynSolValue::Uint(U256::from(u), *bits))
                } else if n.as_i64().is_some() {
                    Err(AbiError::ArgumentOutOfRange {
                        param: param.to_string(),
                        ty: ty.sol_type_name().into_owned(),
                        value: n.to_string(),
                    })
                } else {
                    Err(mismatch("an unsigned integer"))
                }
            }
            Json::String(s) => parse_uint(s)
                .map(|v| DynSolValue::Uint(v, *bits))
                .ok_or_else(|| mismatch("an unsigned integer")),
            _ => Err(mismatch("an unsigned integer")),
        },
        DynSolType::Int(bits) => match json {
            Json::Number(n) if n.is_i64() || n.is_u64() => I256::from_dec_str(&n.to_string())
                .map(|v| DynSolValue::Int(v, *bits))
                .map_err(|_| mismatch("a signed integer")),
            Json::String(s) => parse_int(s)
                .map(|v| DynSolValue::Int(v, *bits))
                .ok_or_else(|| mismatch("a signed integer")),
            _ => Err(mismatch("a signed integer")),
        },
        DynSolType::Bool => json
            .as_bool()
            .map(DynSolValue::Bool)
            .ok_or_else(|| mismatch("a boolean")),
        DynSolType::Address => json
            .as_str()
            .and_then(|s| Address::from_str(s.trim()).ok())
            .map(DynSolValue::Address)
            .ok_or_else(|| mismatch("a 0x-prefixed address")),
        DynSolType::FixedBytes(_) => {
            let bytes = json
                .as_str()
                .and_then(decode_hex)
                .ok_or_else(|| mismatch("a hex string"))?;
            if bytes.len() > WORD {
                return Err(AbiError::ArgumentOutOfRange {
                    param: param.to_string(),
                    ty: ty.sol_type_name().into_owned(),
                    value: format!("{} bytes", bytes.len()),
                });
            }
            // Width is checked against the declared size when encoding
            let mut word = B256::ZERO;
            word[..bytes.len()].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(word, bytes.len()))
        }
        DynSolType::Bytes => json
            .as_str()
            .and_then(decode_hex)
            .map(DynSolValue::Bytes)
            .ok_or_else(|| mismatch("a hex string")),
        DynSolType::String => json
            .as_str()
            .map(|s| DynSolValue::String(s.to_string()))
            .ok_or_else(|| mismatch("a string")),
        DynSolType::Array(element) => elements(element).map(DynSolValue::Array),
        DynSolType::FixedArray(element, _) => elements(element).map(DynSolValue::FixedArray),
        _ => {
            let members = tuple_members(ty).ok_or_else(|| mismatch("a supported ABI type"))?;
            let items = json
                .as_array()
                .ok_or_else(|| mismatch("an array of tuple members"))?;
            if items.len() != members.len() {
                return Err(AbiError::ArgumentTypeMismatch {
                    param: param.to_string(),
                    expected: format!("{} tuple members", members.len()),
                    found: format!("{} members", items.len()),
                });
            }
            items
                .iter()
                .zip(members)
                .enumerate()
                .map(|(i, (item, member))| value_from_json(item, member, &format!("{}.{}", param, i)))
                .collect::<AbiResult<Vec<_>>>()
                .map(DynSolValue::Tuple)
        }
    }
}

/// JSON rendering. Integers become decimal strings so that 256-bit values
/// survive.
pub fn value_to_json(value: &DynSolValue) -> Json {
    match value {
        DynSolValue::Uint(v, _) => Json::String(v.to_string()),
        DynSolValue::Int(v, _) => Json::String(v.to_string()),
        DynSolValue::Bool(b) => Json::Bool(*b),
        DynSolValue::Address(a) => Json::String(a.to_checksum(None)),
        DynSolValue::FixedBytes(word, size) => {
            Json::String(format!("0x{}", hex::encode(&word[..(*size).min(WORD)])))
        }
        DynSolValue::Bytes(b) => Json::String(format!("0x{}", hex::encode(b))),
        DynSolValue::String(s) => Json::String(s.clone()),
        DynSolValue::Function(f) => Json::String(format!("0x{}", hex::encode(f.as_slice()))),
        _ => match sequence(value) {
            Some(items) => Json::Array(items.iter().map(value_to_json).collect()),
            None => Json::Null,
        },
    }
}

/// Plain-text rendering for terminal output.
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Uint(v, _) => v.to_string(),
        DynSolValue::Int(v, _) => v.to_string(),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            format!("[{}]", join_values(items))
        }
        _ => match value.as_tuple().or_else(|| value.as_fixed_seq()) {
            Some(items) => format!("({})", join_values(items)),
            None => value_to_json(value).as_str().unwrap_or_default().to_string(),
        },
    }
}

fn sequence(value: &DynSolValue) -> Option<&[DynSolValue]> {
    value.as_array().or_else(|| value.as_fixed_seq())
}

fn join_values(items: &[DynSolValue]) -> String {
    items.iter().map(format_value).collect::<Vec<_>>().join(", ")
}

fn parse_uint(s: &str) -> Option<U256> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_str_radix(s, 10).ok(),
    }
}

fn parse_int(s: &str) -> Option<I256> {
    let s = s.trim();
    if s.contains("0x") || s.contains("0X") {
        I256::from_hex_str(s).ok()
    } else {
        I256::from_dec_str(s).ok()
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(s).ok()
}
