use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading an interface description or running a call.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("malformed interface entry {entry}: {reason}")]
    DescriptorParse { entry: String, reason: String },

    #[error("duplicate function descriptor '{name}' (candidates: {})", candidates.join(", "))]
    DuplicateDescriptor {
        name: String,
        candidates: Vec<String>,
    },

    #[error("function '{name}' not found in interface. Available functions: {}", available.join(", "))]
    UnknownFunction {
        name: String,
        available: Vec<String>,
    },

    #[error("argument {param}: expected {expected}, got {found}")]
    ArgumentTypeMismatch {
        param: String,
        expected: String,
        found: String,
    },

    #[error("argument {param}: value {value} does not fit {ty}")]
    ArgumentOutOfRange {
        param: String,
        ty: String,
        value: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("response truncated: layout needs {needed} bytes, got {available}")]
    TruncatedResponse { needed: usize, available: usize },

    #[error("invalid {ty} in response: {reason}")]
    DecodeType { ty: String, reason: String },
}

/// Failures of the JSON-RPC collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid RPC endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("node returned error {code}: {message}")]
    Node {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// `data` is the raw revert payload as returned by the node, if any.
    #[error("call reverted: {reason}")]
    Reverted {
        reason: String,
        data: Option<String>,
    },

    #[error("request timed out after {0:?}; the RPC endpoint may be overloaded or unreachable")]
    Timeout(Duration),

    #[error("cannot reach RPC endpoint: {0}. Check the RPC URL and network connectivity")]
    Network(String),
}

pub type AbiResult<T> = std::result::Result<T, AbiError>;
