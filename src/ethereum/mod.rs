pub mod abi;
pub mod contract;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod provider;
pub mod registry;
pub mod types;

pub use contract::ContractClient;
pub use decoder::{decode, decode_params, decode_revert_reason, CallResult};
pub use encoder::{encode, encode_params, CallRequest};
pub use error::{AbiError, AbiResult, TransportError};
pub use provider::{HttpTransport, ProviderManager, Transport};
pub use registry::{FunctionDescriptor, InterfaceRegistry};
pub use types::{format_value, parse_type, value_from_json, value_to_json};

use serde::{Deserialize, Serialize};

/// RandomNumberV2 on Coston2, where the secure random number is served
pub const RANDOM_NUMBER_V2_ADDRESS: &str = "0x5CdF9eAF3EB8b44fB696984a1420B56A7575D250";

/// Interface description of RandomNumberV2
pub const RANDOM_NUMBER_V2_ABI: &str = include_str!("../../contracts/RandomNumberV2.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReport {
    pub network: String,
    pub address: String,
    pub signature: String,
    pub selector: String,
    pub result: serde_json::Value,
}

impl QueryReport {
    pub fn new(
        network: &str,
        address: &alloy::primitives::Address,
        function: &FunctionDescriptor,
        result: &CallResult,
    ) -> Self {
        Self {
            network: network.to_string(),
            address: address.to_checksum(None),
            signature: function.signature(),
            selector: function.selector_hex(),
            result: result.to_json(),
        }
    }
}
