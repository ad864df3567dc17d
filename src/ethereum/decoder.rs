use alloy::dyn_abi::{DynSolReturns, DynSolType, DynSolValue, FunctionExt};
use alloy::primitives::{I256, U256};
use serde_json::{Map, Value as Json};

use super::error::{AbiError, AbiResult};
use super::registry::FunctionDescriptor;
use super::types::{
    fits_layout, fits_signed, head_size, is_dynamic, is_zero_sized, tuple_members, value_to_json,
    WORD,
};

const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Decoded outputs of a call, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    names: Vec<String>,
    values: Vec<DynSolValue>,
}

impl CallResult {
    pub fn values(&self) -> &[DynSolValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DynSolValue> {
        self.values.get(index)
    }

    /// Look up an output by its declared name.
    pub fn get_named(&self, name: &str) -> Option<&DynSolValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    /// `(name, value)` pairs; unnamed outputs yield an empty name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DynSolValue)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    /// JSON object keyed by output name, falling back to the position for
    /// unnamed outputs.
    pub fn to_json(&self) -> Json {
        let mut map = Map::new();
        for (i, (name, value)) in self.iter().enumerate() {
            let key = if name.is_empty() || map.contains_key(name) {
                i.to_string()
            } else {
                name.to_string()
            };
            map.insert(key, value_to_json(value));
        }
        Json::Object(map)
    }
}

/// Decode the return data of `function`.
pub fn decode(function: &FunctionDescriptor, data: &[u8]) -> AbiResult<CallResult> {
    let types = function.output_types();
    check_layout(types, data)?;
    let values = if types.is_empty() {
        Vec::new()
    } else {
        function
            .function()
            .abi_decode_output(data, true)
            .map_err(|e| decode_error(e, data.len()))?
    };
    Ok(CallResult {
        names: function.outputs().iter().map(|p| p.name.clone()).collect(),
        values,
    })
}

/// Decode `data` as the tuple `types`.
pub fn decode_params(types: &[DynSolType], data: &[u8]) -> AbiResult<Vec<DynSolValue>> {
    check_layout(types, data)?;
    if types.is_empty() {
        return Ok(Vec::new());
    }
    DynSolReturns::new(types.to_vec())
        .abi_decode_output(data, true)
        .map_err(|e| decode_error(e, data.len()))
}

/// Extract a human readable reason from `Error(string)` or `Panic(uint256)`
/// revert data.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, payload) = data.split_at(4);

    if selector == ERROR_SELECTOR {
        decode_params(&[DynSolType::String], payload)
            .ok()?
            .pop()?
            .as_str()
            .map(str::to_string)
    } else if selector == PANIC_SELECTOR {
        let (code, _) = decode_params(&[DynSolType::Uint(256)], payload)
            .ok()?
            .pop()?
            .as_uint()?;
        let code = if code.bit_len() <= 64 {
            code.as_limbs()[0]
        } else {
            u64::MAX
        };
        Some(format!("panic 0x{:02x} ({})", code, panic_description(code)))
    } else {
        None
    }
}

fn panic_description(code: u64) -> &'static str {
    match code {
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "invalid enum value",
        0x22 => "corrupted storage byte array",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "call to uninitialized internal function",
        _ => "unknown panic code",
    }
}

fn decode_error(err: alloy::dyn_abi::Error, available: usize) -> AbiError {
    match err {
        alloy::dyn_abi::Error::SolTypes(alloy::sol_types::Error::Overrun) => {
            AbiError::TruncatedResponse {
                needed: available.saturating_add(WORD),
                available,
            }
        }
        other => AbiError::DecodeType {
            ty: "return data".to_string(),
            reason: other.to_string(),
        },
    }
}

/// Walk the layout of `data` as `types` without allocating, so that
/// oversized lengths and offsets fail before alloy sizes any buffer, and
/// values outside their declared width are rejected.
fn check_layout(types: &[DynSolType], data: &[u8]) -> AbiResult<()> {
    let layout = Layout { data };
    for ty in types {
        if is_zero_sized(ty) {
            return Err(invalid(ty, "empty tuple or zero-length array".to_string()));
        }
        if !fits_layout(ty) {
            return Err(layout.truncated(usize::MAX));
        }
    }
    layout.tuple(types, 0)
}

struct Layout<'a> {
    data: &'a [u8],
}

impl<'a> Layout<'a> {
    fn truncated(&self, needed: usize) -> AbiError {
        AbiError::TruncatedResponse {
            needed,
            available: self.data.len(),
        }
    }

    fn word(&self, at: usize) -> AbiResult<&'a [u8]> {
        let end = at.saturating_add(WORD);
        if end > self.data.len() {
            return Err(self.truncated(end));
        }
        Ok(&self.data[at..end])
    }

    /// Read an offset or length word. Values that cannot address this
    /// buffer are treated as truncation.
    fn usize_at(&self, at: usize) -> AbiResult<usize> {
        let word = self.word(at)?;
        if word[..24].iter().any(|b| *b != 0) {
            return Err(self.truncated(usize::MAX));
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&word[24..]);
        Ok(usize::try_from(u64::from_be_bytes(low)).unwrap_or(usize::MAX))
    }

    fn head_size(&self, ty: &DynSolType) -> AbiResult<usize> {
        head_size(ty).ok_or_else(|| self.truncated(usize::MAX))
    }

    fn tuple(&self, types: &[DynSolType], base: usize) -> AbiResult<()> {
        let mut head_len = 0usize;
        for ty in types {
            head_len = head_len.saturating_add(self.head_size(ty)?);
        }
        let needed = base.saturating_add(head_len);
        if needed > self.data.len() {
            return Err(self.truncated(needed));
        }

        let mut head = base;
        for ty in types {
            self.slot(ty, base, head)?;
            head += self.head_size(ty)?;
        }
        Ok(())
    }

    /// `count` elements of one type laid out back to back, as in an array
    /// body. The count is bounded by the bytes present before any element
    /// is visited.
    fn sequence(&self, element: &DynSolType, count: usize, base: usize) -> AbiResult<()> {
        let step = self.head_size(element)?;
        let needed = step
            .checked_mul(count)
            .and_then(|n| n.checked_add(base))
            .unwrap_or(usize::MAX);
        if needed > self.data.len() {
            return Err(self.truncated(needed));
        }

        let mut head = base;
        for _ in 0..count {
            self.slot(element, base, head)?;
            head += step;
        }
        Ok(())
    }

    fn slot(&self, ty: &DynSolType, base: usize, head: usize) -> AbiResult<()> {
        if is_dynamic(ty) {
            let offset = self.usize_at(head)?;
            self.value(ty, base.saturating_add(offset))
        } else {
            self.value(ty, head)
        }
    }

    fn value(&self, ty: &DynSolType, at: usize) -> AbiResult<()> {
        match ty {
            DynSolType::Uint(bits) => {
                let v = U256::from_be_slice(self.word(at)?);
                if v.bit_len() > *bits {
                    return Err(invalid(ty, format!("value {} exceeds {} bits", v, bits)));
                }
            }
            DynSolType::Int(bits) => {
                let v = I256::from_raw(U256::from_be_slice(self.word(at)?));
                if !fits_signed(v, *bits) {
                    return Err(invalid(ty, format!("value {} is not sign-extended", v)));
                }
            }
            DynSolType::Bool => {
                let v = U256::from_be_slice(self.word(at)?);
                if v > U256::from(1) {
                    return Err(invalid(ty, format!("word {} is neither 0 nor 1", v)));
                }
            }
            DynSolType::Address => {
                if self.word(at)?[..12].iter().any(|b| *b != 0) {
                    return Err(invalid(ty, "non-zero upper 12 bytes".to_string()));
                }
            }
            DynSolType::Function => {
                if self.word(at)?[24..].iter().any(|b| *b != 0) {
                    return Err(invalid(ty, "non-zero padding".to_string()));
                }
            }
            DynSolType::FixedBytes(len) => {
                let padding = self.word(at)?.get(*len..).unwrap_or_default();
                if *len > WORD || padding.iter().any(|b| *b != 0) {
                    return Err(invalid(ty, "non-zero padding".to_string()));
                }
            }
            DynSolType::Bytes => {
                self.packed(ty, at)?;
            }
            DynSolType::String => {
                std::str::from_utf8(self.packed(ty, at)?).map_err(|e| invalid(ty, e.to_string()))?;
            }
            DynSolType::Array(element) => {
                let len = self.usize_at(at)?;
                self.sequence(element, len, at.saturating_add(WORD))?;
            }
            DynSolType::FixedArray(element, len) => self.sequence(element, *len, at)?,
            _ => match tuple_members(ty) {
                Some(members) => self.tuple(members, at)?,
                None => return Err(invalid(ty, "unsupported type".to_string())),
            },
        }
        Ok(())
    }

    /// Contents of a length-prefixed byte string. The zero padding up to the
    /// next word boundary must be present.
    fn packed(&self, ty: &DynSolType, at: usize) -> AbiResult<&'a [u8]> {
        let len = self.usize_at(at)?;
        let start = at.saturating_add(WORD);
        let end = start.saturating_add(len);
        let padded_end = start.saturating_add(len.div_ceil(WORD).saturating_mul(WORD));
        if padded_end > self.data.len() {
            return Err(self.truncated(padded_end));
        }
        if self.data[end..padded_end].iter().any(|b| *b != 0) {
            return Err(invalid(ty, "non-zero padding".to_string()));
        }
        Ok(&self.data[start..end])
    }
}

fn invalid(ty: &DynSolType, reason: String) -> AbiError {
    AbiError::DecodeType {
        ty: ty.sol_type_name().into_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::encoder::encode_params;
    use crate::ethereum::registry::InterfaceRegistry;
    use crate::ethereum::RANDOM_NUMBER_V2_ABI;
    use alloy::primitives::{Address, B256};
    use std::str::FromStr;

    fn word(n: u64) -> [u8; 32] {
        U256::from(n).to_be_bytes::<32>()
    }

    fn registry() -> InterfaceRegistry {
        InterfaceRegistry::load(RANDOM_NUMBER_V2_ABI).unwrap()
    }

    fn uint(v: u64, bits: usize) -> DynSolValue {
        DynSolValue::Uint(U256::from(v), bits)
    }

    #[test]
    fn test_decode_get_random_number() {
        let registry = registry();
        let function = registry.lookup("getRandomNumber").unwrap();

        let mut response = Vec::new();
        response.extend_from_slice(&word(42));
        response.extend_from_slice(&word(1));
        response.extend_from_slice(&word(1_700_000_000));

        let result = decode(function, &response).unwrap();
        assert_eq!(
            result.values(),
            &[
                uint(42, 256),
                DynSolValue::Bool(true),
                uint(1_700_000_000, 256),
            ]
        );
        assert_eq!(result.get_named("_isSecureRandom"), Some(&DynSolValue::Bool(true)));
        assert_eq!(
            result.to_json(),
            serde_json::json!({
                "_randomNumber": "42",
                "_isSecureRandom": true,
                "_randomTimestamp": "1700000000"
            })
        );
    }

    #[test]
    fn test_truncated_response() {
        let registry = registry();
        let function = registry.lookup("getRandomNumber").unwrap();

        let mut response = Vec::new();
        response.extend_from_slice(&word(42));
        response.extend_from_slice(&word(1));

        match decode(function, &response) {
            Err(AbiError::TruncatedResponse { needed, available }) => {
                assert_eq!(needed, 96);
                assert_eq!(available, 64);
            }
            other => panic!("expected TruncatedResponse, got {:?}", other),
        }
        assert!(matches!(
            decode(function, &[]),
            Err(AbiError::TruncatedResponse { .. })
        ));
    }

    #[test]
    fn test_function_without_outputs() {
        let registry = registry();
        let relay = registry.lookup("relay").unwrap();
        assert!(decode(relay, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_value_constraints() {
        let bool_two = decode_params(&[DynSolType::Bool], &word(2));
        assert!(matches!(bool_two, Err(AbiError::DecodeType { .. })));

        let wide_uint8 = decode_params(&[DynSolType::Uint(8)], &word(256));
        assert!(matches!(wide_uint8, Err(AbiError::DecodeType { .. })));

        let mut dirty_address = [0u8; 32];
        dirty_address[0] = 1;
        let address = decode_params(&[DynSolType::Address], &dirty_address);
        assert!(matches!(address, Err(AbiError::DecodeType { .. })));

        let mut dirty_bytes4 = [0u8; 32];
        dirty_bytes4[4] = 1;
        let bytes4 = decode_params(&[DynSolType::FixedBytes(4)], &dirty_bytes4);
        assert!(matches!(bytes4, Err(AbiError::DecodeType { .. })));

        // -1 as int8 is a fully sign-extended word; 0xff alone is not.
        let minus_one = decode_params(&[DynSolType::Int(8)], &[0xffu8; 32]).unwrap();
        assert_eq!(minus_one, vec![DynSolValue::Int(I256::MINUS_ONE, 8)]);
        let unextended = decode_params(&[DynSolType::Int(8)], &word(0xff));
        assert!(matches!(unextended, Err(AbiError::DecodeType { .. })));

        let mut invalid_utf8 = Vec::new();
        invalid_utf8.extend_from_slice(&word(32));
        invalid_utf8.extend_from_slice(&word(2));
        let mut data = [0u8; 32];
        data[..2].copy_from_slice(&[0xc3, 0x28]);
        invalid_utf8.extend_from_slice(&data);
        let string = decode_params(&[DynSolType::String], &invalid_utf8);
        assert!(matches!(string, Err(AbiError::DecodeType { .. })));

        let mut dirty_padding = Vec::new();
        dirty_padding.extend_from_slice(&word(32));
        dirty_padding.extend_from_slice(&word(1));
        let mut data = [0u8; 32];
        data[..2].copy_from_slice(&[0xaa, 0xbb]);
        dirty_padding.extend_from_slice(&data);
        let bytes = decode_params(&[DynSolType::Bytes], &dirty_padding);
        assert!(matches!(bytes, Err(AbiError::DecodeType { .. })));
    }

    #[test]
    fn test_malicious_offsets_and_lengths() {
        // Offset beyond the buffer
        let far_offset = decode_params(&[DynSolType::Bytes], &word(4096));
        assert!(matches!(far_offset, Err(AbiError::TruncatedResponse { .. })));

        // Offset that does not fit in 64 bits
        let huge_offset = decode_params(&[DynSolType::Bytes], &[0xffu8; 32]);
        assert!(matches!(huge_offset, Err(AbiError::TruncatedResponse { .. })));

        // Array claiming far more elements than bytes present
        let mut huge_array = Vec::new();
        huge_array.extend_from_slice(&word(32));
        huge_array.extend_from_slice(&word(u64::MAX));
        let array = decode_params(
            &[DynSolType::Array(Box::new(DynSolType::Uint(256)))],
            &huge_array,
        );
        assert!(matches!(array, Err(AbiError::TruncatedResponse { .. })));

        // Dynamic elements count one offset word each
        let strings = decode_params(&[DynSolType::Array(Box::new(DynSolType::String))], &huge_array);
        assert!(matches!(strings, Err(AbiError::TruncatedResponse { .. })));

        // Byte string longer than the payload, padding included
        let mut long_bytes = Vec::new();
        long_bytes.extend_from_slice(&word(32));
        long_bytes.extend_from_slice(&word(33));
        long_bytes.extend_from_slice(&[0u8; 32]);
        let bytes = decode_params(&[DynSolType::Bytes], &long_bytes);
        assert!(matches!(
            bytes,
            Err(AbiError::TruncatedResponse { needed: 128, available: 96 })
        ));
    }

    #[test]
    fn test_array_of_empty_tuples_is_rejected() {
        let mut response = Vec::new();
        response.extend_from_slice(&word(32));
        response.extend_from_slice(&word(u64::MAX));

        let empty_tuples = DynSolType::Array(Box::new(DynSolType::Tuple(Vec::new())));
        assert!(matches!(
            decode_params(&[empty_tuples], &response),
            Err(AbiError::DecodeType { .. })
        ));
    }

    #[test]
    fn test_oversized_fixed_array_does_not_overflow() {
        let huge = DynSolType::FixedArray(Box::new(DynSolType::Uint(256)), usize::MAX / 16);
        assert!(matches!(
            decode_params(&[huge], &[0u8; 32]),
            Err(AbiError::TruncatedResponse { available: 32, .. })
        ));
    }

    #[test]
    fn test_oversized_dynamic_fixed_array_does_not_allocate() {
        let strings = DynSolType::FixedArray(Box::new(DynSolType::String), 4_000_000_000);
        assert!(matches!(
            decode_params(&[strings], &word(32)),
            Err(AbiError::TruncatedResponse { available: 32, .. })
        ));

        // Within the type limit but still far beyond the payload
        let strings = DynSolType::FixedArray(Box::new(DynSolType::String), 1 << 20);
        assert!(matches!(
            decode_params(&[strings], &word(32)),
            Err(AbiError::TruncatedResponse { .. })
        ));
    }

    #[test]
    fn test_decodes_peer_encoded_outputs() {
        let abi = r#"[{"type":"function","name":"snapshot","stateMutability":"view","inputs":[],
            "outputs":[
                {"name":"id","type":"uint32"},
                {"name":"delta","type":"int128"},
                {"name":"owner","type":"address"},
                {"name":"root","type":"bytes32"},
                {"name":"payload","type":"bytes"},
                {"name":"label","type":"string"},
                {"name":"weights","type":"uint16[]"},
                {"name":"pair","type":"uint8[2]"},
                {"name":"policy","type":"tuple","components":[
                    {"name":"seed","type":"uint256"},
                    {"name":"voters","type":"address[]"},
                    {"name":"ok","type":"bool"}]},
                {"name":"names","type":"string[]"}
            ]}]"#;
        let registry = InterfaceRegistry::load(abi).unwrap();
        let function = registry.lookup("snapshot").unwrap();

        let owner = Address::from_str("0x5CdF9eAF3EB8b44fB696984a1420B56A7575D250").unwrap();
        let root = B256::repeat_byte(0xab);
        let delta = I256::from_dec_str("-170141183460469231731687303715884105728").unwrap();

        let values = vec![
            uint(9, 32),
            DynSolValue::Int(delta, 128),
            DynSolValue::Address(owner),
            DynSolValue::FixedBytes(root, 32),
            DynSolValue::Bytes(vec![1, 2, 3]),
            DynSolValue::String("secure random".to_string()),
            DynSolValue::Array(vec![uint(100, 16), uint(65535, 16)]),
            DynSolValue::FixedArray(vec![uint(1, 8), uint(2, 8)]),
            DynSolValue::Tuple(vec![
                DynSolValue::Uint(U256::MAX, 256),
                DynSolValue::Array(vec![DynSolValue::Address(owner)]),
                DynSolValue::Bool(true),
            ]),
            DynSolValue::Array(vec![
                DynSolValue::String("a".to_string()),
                DynSolValue::String(String::new()),
            ]),
        ];
        let response = DynSolValue::Tuple(values.clone()).abi_encode_params();

        let result = decode(function, &response).unwrap();
        assert_eq!(result.values(), values.as_slice());
        assert_eq!(result.get_named("label").and_then(DynSolValue::as_str), Some("secure random"));
        assert_eq!(decode_params(function.output_types(), &response).unwrap(), values);
        assert_eq!(
            encode_params(function.output_types(), &values).unwrap(),
            response
        );
    }

    #[test]
    fn test_decode_revert_reason() {
        let mut error = ERROR_SELECTOR.to_vec();
        error.extend(
            encode_params(
                &[DynSolType::String],
                &[DynSolValue::String("Only signing policy setter".to_string())],
            )
            .unwrap(),
        );
        assert_eq!(
            decode_revert_reason(&error).as_deref(),
            Some("Only signing policy setter")
        );

        let mut panic = PANIC_SELECTOR.to_vec();
        panic.extend_from_slice(&word(0x11));
        assert_eq!(
            decode_revert_reason(&panic).as_deref(),
            Some("panic 0x11 (arithmetic overflow or underflow)")
        );

        assert_eq!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef]), None);
        assert_eq!(decode_revert_reason(&[]), None);
    }
}
