use std::collections::BTreeMap;

use alloy::dyn_abi::DynSolType;
use alloy::json_abi::{Function, Param, StateMutability};
use serde_json::Value as Json;

use super::error::{AbiError, AbiResult};
use super::types::parse_type;

/// A callable contract function with its parameter types resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    function: Function,
    inputs: Vec<DynSolType>,
    outputs: Vec<DynSolType>,
}

impl FunctionDescriptor {
    fn new(function: Function) -> Result<Self, String> {
        let resolve = |params: &[Param]| {
            params
                .iter()
                .map(|p| parse_type(&p.selector_type()))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            inputs: resolve(&function.inputs)?,
            outputs: resolve(&function.outputs)?,
            function,
        })
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    /// Canonical signature, e.g. `getVotingRoundId(uint256)`.
    pub fn signature(&self) -> String {
        self.function.signature()
    }

    pub fn selector(&self) -> [u8; 4] {
        self.function.selector().0
    }

    pub fn selector_hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector()))
    }

    pub fn inputs(&self) -> &[Param] {
        &self.function.inputs
    }

    pub fn outputs(&self) -> &[Param] {
        &self.function.outputs
    }

    pub fn input_types(&self) -> &[DynSolType] {
        &self.inputs
    }

    pub fn output_types(&self) -> &[DynSolType] {
        &self.outputs
    }

    pub fn state_mutability(&self) -> StateMutability {
        self.function.state_mutability
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self.function.state_mutability,
            StateMutability::Pure | StateMutability::View
        )
    }
}

/// Immutable set of function descriptors built from a JSON interface
/// description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceRegistry {
    by_signature: BTreeMap<String, FunctionDescriptor>,
}

impl InterfaceRegistry {
    /// Parse a JSON array of interface entries. Non-function entries
    /// (constructor, events, errors, fallback, receive) are skipped.
    pub fn load(text: &str) -> AbiResult<Self> {
        let entries: Vec<Json> =
            serde_json::from_str(text).map_err(|e| AbiError::DescriptorParse {
                entry: "document".to_string(),
                reason: format!("expected a JSON array of entries: {}", e),
            })?;

        let mut by_signature = BTreeMap::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let label = entry_label(index, &entry);
            let function = match parse_function(entry) {
                Ok(Some(function)) => function,
                Ok(None) => continue,
                Err(reason) => return Err(AbiError::DescriptorParse { entry: label, reason }),
            };
            let signature = function.signature();

            if by_signature.contains_key(&signature) {
                return Err(AbiError::DuplicateDescriptor {
                    candidates: vec![signature.clone()],
                    name: signature,
                });
            }
            by_signature.insert(signature, function);
        }

        tracing::debug!("Loaded {} function descriptors", by_signature.len());
        Ok(Self { by_signature })
    }

    /// Find a function by bare name or by full signature. A bare name that
    /// matches several overloads is ambiguous and reported as a duplicate.
    pub fn lookup(&self, name: &str) -> AbiResult<&FunctionDescriptor> {
        let name = name.trim();
        if name.contains('(') {
            return self
                .by_signature
                .get(&normalize_signature(name))
                .ok_or_else(|| self.unknown(name));
        }

        let mut matches = self.by_signature.values().filter(|f| f.name() == name);
        match (matches.next(), matches.next()) {
            (Some(function), None) => Ok(function),
            (None, _) => Err(self.unknown(name)),
            (Some(_), Some(_)) => Err(AbiError::DuplicateDescriptor {
                name: name.to_string(),
                candidates: self
                    .by_signature
                    .values()
                    .filter(|f| f.name() == name)
                    .map(FunctionDescriptor::signature)
                    .collect(),
            }),
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDescriptor> {
        self.by_signature.values()
    }

    /// Distinct function names in signature order.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions().map(|f| f.name().to_string()).collect();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }

    fn unknown(&self, name: &str) -> AbiError {
        AbiError::UnknownFunction {
            name: name.to_string(),
            available: self.function_names(),
        }
    }
}

/// `Ok(None)` for entries that are not functions. Entries written before
/// `type` existed default to functions, and `inputs`/`outputs` may be left
/// out.
fn parse_function(mut entry: Json) -> Result<Option<FunctionDescriptor>, String> {
    let object = entry
        .as_object_mut()
        .ok_or_else(|| "entry is not a JSON object".to_string())?;

    let kind = object
        .entry("type")
        .or_insert_with(|| Json::String("function".to_string()));
    if kind.as_str() != Some("function") {
        return Ok(None);
    }
    for key in ["inputs", "outputs"] {
        object.entry(key).or_insert_with(|| Json::Array(Vec::new()));
    }

    let function: Function = serde_json::from_value(entry).map_err(|e| e.to_string())?;
    if function.name.is_empty() {
        return Err("function entry without a name".to_string());
    }
    FunctionDescriptor::new(function).map(Some)
}

fn entry_label(index: usize, entry: &Json) -> String {
    match entry.get("name").and_then(Json::as_str) {
        Some(name) => format!("#{} ('{}')", index, name),
        None => format!("#{}", index),
    }
}

fn normalize_signature(signature: &str) -> String {
    signature.chars().filter(|c| !c.is_whitespace()).collect()
}
