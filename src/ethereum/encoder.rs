use alloy::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt};
use alloy::primitives::{Address, Bytes};
use serde_json::Value as Json;

use super::error::{AbiError, AbiResult};
use super::registry::FunctionDescriptor;
use super::types::{fits_signed, kind, tuple_members, value_from_json, WORD};

/// A validated call of one function on one contract.
#[derive(Debug, Clone)]
pub struct CallRequest<'a> {
    pub target: Address,
    pub function: &'a FunctionDescriptor,
    args: Vec<DynSolValue>,
}

impl<'a> CallRequest<'a> {
    /// Check arity and every argument against the function's inputs.
    /// Integer and fixed-bytes widths are taken from the declaration.
    pub fn new(
        target: Address,
        function: &'a FunctionDescriptor,
        args: Vec<DynSolValue>,
    ) -> AbiResult<Self> {
        let args = validate_arguments(function, &args)?;
        Ok(Self {
            target,
            function,
            args,
        })
    }

    /// Build a request from JSON parameters, either positional (array) or
    /// named (object keyed by input name).
    pub fn from_json(
        target: Address,
        function: &'a FunctionDescriptor,
        params: &Json,
    ) -> AbiResult<Self> {
        let args = json_arguments(function, params)?;
        Self::new(target, function, args)
    }

    pub fn args(&self) -> &[DynSolValue] {
        &self.args
    }

    /// Selector followed by the encoded argument tuple.
    pub fn calldata(&self) -> AbiResult<Bytes> {
        encode_input(self.function, &self.args)
    }
}

/// Encode a call to `function` with `args`.
pub fn encode(function: &FunctionDescriptor, args: &[DynSolValue]) -> AbiResult<Bytes> {
    let args = validate_arguments(function, args)?;
    encode_input(function, &args)
}

fn encode_input(function: &FunctionDescriptor, args: &[DynSolValue]) -> AbiResult<Bytes> {
    function
        .function()
        .abi_encode_input(args)
        .map(Bytes::from)
        .map_err(|e| AbiError::ArgumentTypeMismatch {
            param: function.name().to_string(),
            expected: function.signature(),
            found: e.to_string(),
        })
}

/// Encode `values` as the tuple `types`, without a selector. This is the
/// layout of return data as produced by a contract.
pub fn encode_params(types: &[DynSolType], values: &[DynSolValue]) -> AbiResult<Vec<u8>> {
    if types.len() != values.len() {
        return Err(arity_mismatch("params", types.len(), values.len()));
    }
    let values = types
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (ty, value))| conform(ty, value, &format!("#{}", i + 1)))
        .collect::<AbiResult<Vec<_>>>()?;
    Ok(DynSolValue::Tuple(values).abi_encode_params())
}

fn validate_arguments(
    function: &FunctionDescriptor,
    args: &[DynSolValue],
) -> AbiResult<Vec<DynSolValue>> {
    let types = function.input_types();
    if args.len() != types.len() {
        return Err(arity_mismatch(function.name(), types.len(), args.len()));
    }
    types
        .iter()
        .zip(function.inputs())
        .zip(args)
        .enumerate()
        .map(|(i, ((ty, param), value))| conform(ty, value, &param_label(i, &param.name)))
        .collect()
}

fn json_arguments(function: &FunctionDescriptor, params: &Json) -> AbiResult<Vec<DynSolValue>> {
    let types = function.input_types();
    let inputs = function.inputs();
    match params {
        Json::Array(items) => {
            if items.len() != types.len() {
                return Err(arity_mismatch(function.name(), types.len(), items.len()));
            }
            types
                .iter()
                .zip(inputs)
                .zip(items)
                .enumerate()
                .map(|(i, ((ty, param), item))| {
                    value_from_json(item, ty, &param_label(i, &param.name))
                })
                .collect()
        }
        Json::Object(map) => types
            .iter()
            .zip(inputs)
            .enumerate()
            .map(|(i, (ty, param))| {
                let label = param_label(i, &param.name);
                let item = map.get(&param.name).ok_or_else(|| AbiError::ArgumentTypeMismatch {
                    param: label.clone(),
                    expected: format!("a value of type {}", ty.sol_type_name()),
                    found: "nothing".to_string(),
                })?;
                value_from_json(item, ty, &label)
            })
            .collect(),
        Json::Null if types.is_empty() => Ok(Vec::new()),
        other => Err(AbiError::ArgumentTypeMismatch {
            param: function.name().to_string(),
            expected: "a JSON array or object of parameters".to_string(),
            found: other.to_string(),
        }),
    }
}

fn arity_mismatch(name: &str, expected: usize, found: usize) -> AbiError {
    AbiError::ArgumentTypeMismatch {
        param: name.to_string(),
        expected: format!("{} arguments", expected),
        found: format!("{} arguments", found),
    }
}

fn param_label(index: usize, name: &str) -> String {
    if name.is_empty() {
        format!("#{}", index + 1)
    } else {
        format!("#{} ('{}')", index + 1, name)
    }
}

/// Verify that `value` has the shape of `ty` and fits its width, and return
/// it with the declared widths.
fn conform(ty: &DynSolType, value: &DynSolValue, param: &str) -> AbiResult<DynSolValue> {
    let out_of_range = |shown: String| AbiError::ArgumentOutOfRange {
        param: param.to_string(),
        ty: ty.sol_type_name().into_owned(),
        value: shown,
    };
    let mismatch = || AbiError::ArgumentTypeMismatch {
        param: param.to_string(),
        expected: ty.sol_type_name().into_owned(),
        found: kind(value),
    };
    let elements = |element: &DynSolType, items: &[DynSolValue]| {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| conform(element, item, &format!("{}[{}]", param, i)))
            .collect::<AbiResult<Vec<_>>>()
    };

    match (ty, value) {
        (DynSolType::Uint(bits), DynSolValue::Uint(v, _)) => {
            if v.bit_len() > *bits {
                return Err(out_of_range(v.to_string()));
            }
            Ok(DynSolValue::Uint(*v, *bits))
        }
        (DynSolType::Int(bits), DynSolValue::Int(v, _)) => {
            if !fits_signed(*v, *bits) {
                return Err(out_of_range(v.to_string()));
            }
            Ok(DynSolValue::Int(*v, *bits))
        }
        (DynSolType::FixedBytes(len), DynSolValue::FixedBytes(word, size)) => {
            if size != len || word[(*len).min(WORD)..].iter().any(|b| *b != 0) {
                return Err(out_of_range(format!(
                    "0x{} ({} bytes)",
                    hex::encode(&word[..(*size).min(WORD)]),
                    size
                )));
            }
            Ok(value.clone())
        }
        (DynSolType::Bool, DynSolValue::Bool(_))
        | (DynSolType::Address, DynSolValue::Address(_))
        | (DynSolType::Function, DynSolValue::Function(_))
        | (DynSolType::Bytes, DynSolValue::Bytes(_))
        | (DynSolType::String, DynSolValue::String(_)) => Ok(value.clone()),
        (DynSolType::Array(element), DynSolValue::Array(items)) => {
            elements(element, items).map(DynSolValue::Array)
        }
        (DynSolType::FixedArray(element, len), DynSolValue::FixedArray(items)) => {
            if items.len() != *len {
                return Err(out_of_range(format!("{} elements", items.len())));
            }
            elements(element, items).map(DynSolValue::FixedArray)
        }
        _ => {
            let members = tuple_members(ty).ok_or_else(mismatch)?;
            let items = value
                .as_tuple()
                .or_else(|| value.as_custom_struct().map(|(_, _, items)| items))
                .ok_or_else(mismatch)?;
            if items.len() != members.len() {
                return Err(AbiError::ArgumentTypeMismatch {
                    param: param.to_string(),
                    expected: format!("{} tuple members", members.len()),
                    found: format!("{} members", items.len()),
                });
            }
            members
                .iter()
                .zip(items)
                .enumerate()
                .map(|(i, (member, item))| conform(member, item, &format!("{}.{}", param, i)))
                .collect::<AbiResult<Vec<_>>>()
                .map(DynSolValue::Tuple)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::registry::InterfaceRegistry;
    use crate::ethereum::RANDOM_NUMBER_V2_ABI;
    use alloy::primitives::{B256, I256, U256};
    use serde_json::json;
    use std::str::FromStr;

    fn registry() -> InterfaceRegistry {
        InterfaceRegistry::load(RANDOM_NUMBER_V2_ABI).unwrap()
    }

    fn target() -> Address {
        Address::from_str("0x5CdF9eAF3EB8b44fB696984a1420B56A7575D250").unwrap()
    }

    fn uint(v: u64) -> DynSolValue {
        DynSolValue::Uint(U256::from(v), 256)
    }

    fn bytes4(bytes: &[u8]) -> DynSolValue {
        let mut word = B256::ZERO;
        word[..bytes.len()].copy_from_slice(bytes);
        DynSolValue::FixedBytes(word, bytes.len())
    }

    #[test]
    fn test_encode_no_arguments() {
        let registry = registry();
        let function = registry.lookup("getRandomNumber").unwrap();
        let calldata = encode(function, &[]).unwrap();
        assert_eq!(&calldata[..], &[0xdb, 0xdf, 0xf2, 0xc1]);
    }

    #[test]
    fn test_encode_static_argument() {
        let registry = registry();
        let function = registry.lookup("getVotingRoundId").unwrap();
        // A u64-sized value is widened to the declared uint256
        let request =
            CallRequest::new(target(), function, vec![DynSolValue::from(1_700_000_000u64)])
                .unwrap();
        let calldata = request.calldata().unwrap();

        assert_eq!(calldata.len(), 4 + 32);
        assert_eq!(&calldata[..4], &[0xab, 0x97, 0xdb, 0x37]);
        assert_eq!(
            U256::from_be_slice(&calldata[4..]),
            U256::from(1_700_000_000u64)
        );
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let registry = registry();
        let function = registry.lookup("merkleRoots").unwrap();

        let too_few = encode(function, &[uint(1)]);
        assert!(matches!(too_few, Err(AbiError::ArgumentTypeMismatch { .. })));

        let too_many = encode(function, &[uint(1), uint(2), uint(3)]);
        assert!(matches!(too_many, Err(AbiError::ArgumentTypeMismatch { .. })));

        let from_json = CallRequest::from_json(target(), function, &json!([1]));
        assert!(matches!(from_json, Err(AbiError::ArgumentTypeMismatch { .. })));
    }

    #[test]
    fn test_type_and_range_checks() {
        let abi = r#"[{"type":"function","name":"f","stateMutability":"view",
            "inputs":[{"name":"small","type":"uint32"},{"name":"signed","type":"int8"},
                      {"name":"hash","type":"bytes4"}],
            "outputs":[]}]"#;
        let registry = InterfaceRegistry::load(abi).unwrap();
        let function = registry.lookup("f").unwrap();
        let int = |s: &str| DynSolValue::Int(I256::from_dec_str(s).unwrap(), 256);

        let ok = encode(function, &[uint(u32::MAX as u64), int("-128"), bytes4(&[1, 2, 3, 4])]);
        assert!(ok.is_ok());

        let too_wide = encode(
            function,
            &[uint(u32::MAX as u64 + 1), int("0"), bytes4(&[1, 2, 3, 4])],
        );
        assert!(matches!(too_wide, Err(AbiError::ArgumentOutOfRange { .. })));

        let signed_too_small = encode(function, &[uint(1), int("-129"), bytes4(&[1, 2, 3, 4])]);
        assert!(matches!(signed_too_small, Err(AbiError::ArgumentOutOfRange { .. })));

        let short_bytes = encode(function, &[uint(1), int("0"), bytes4(&[1])]);
        assert!(matches!(short_bytes, Err(AbiError::ArgumentOutOfRange { .. })));

        let wrong_kind = encode(
            function,
            &[DynSolValue::Bool(true), int("0"), bytes4(&[1, 2, 3, 4])],
        );
        assert!(matches!(wrong_kind, Err(AbiError::ArgumentTypeMismatch { .. })));
    }

    #[test]
    fn test_named_json_parameters() {
        let registry = registry();
        let function = registry.lookup("merkleRoots").unwrap();

        let positional = CallRequest::from_json(target(), function, &json!(["1", 2])).unwrap();
        let named =
            CallRequest::from_json(target(), function, &json!({"protocolId": 1, "votingRoundId": "0x2"}))
                .unwrap();
        assert_eq!(positional.calldata().unwrap(), named.calldata().unwrap());

        let missing = CallRequest::from_json(target(), function, &json!({"protocolId": 1}));
        assert!(matches!(missing, Err(AbiError::ArgumentTypeMismatch { .. })));
    }

    #[test]
    fn test_dynamic_tuple_from_json() {
        let registry = registry();
        let function = registry.lookup("setSigningPolicy").unwrap();
        let voter = target();

        let policy = json!([[7, 1000, 500, U256::MAX.to_string(),
            [voter.to_string(), Address::ZERO.to_string()], [10, 20, 30]]]);
        let request = CallRequest::from_json(voter, function, &policy).unwrap();
        let calldata = request.calldata().unwrap();

        let expected = DynSolValue::Tuple(vec![DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(7), 24),
            DynSolValue::Uint(U256::from(1000), 32),
            DynSolValue::Uint(U256::from(500), 16),
            DynSolValue::Uint(U256::MAX, 256),
            DynSolValue::Array(vec![
                DynSolValue::Address(voter),
                DynSolValue::Address(Address::ZERO),
            ]),
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(10), 16),
                DynSolValue::Uint(U256::from(20), 16),
                DynSolValue::Uint(U256::from(30), 16),
            ]),
        ])])
        .abi_encode_params();

        assert_eq!(&calldata[..4], &function.selector());
        assert_eq!(&calldata[4..], expected.as_slice());

        // uint24 overflow inside the tuple is caught before encoding
        let overflow = json!([[1 << 24, 0, 0, 0, [], []]]);
        assert!(matches!(
            CallRequest::from_json(voter, function, &overflow),
            Err(AbiError::ArgumentOutOfRange { ref param, .. }) if param.starts_with("#1 ('_signingPolicy').0")
        ));
    }

    #[test]
    fn test_encode_params_widens_values() {
        let types = vec![DynSolType::Uint(8), DynSolType::String];
        let ours = encode_params(
            &types,
            &[DynSolValue::from(3u64), DynSolValue::String("flare".to_string())],
        )
        .unwrap();
        let expected = DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(3), 8),
            DynSolValue::String("flare".to_string()),
        ])
        .abi_encode_params();
        assert_eq!(ours, expected);

        assert!(matches!(
            encode_params(&types, &[DynSolValue::from(300u64), DynSolValue::String(String::new())]),
            Err(AbiError::ArgumentOutOfRange { .. })
        ));
    }
}
