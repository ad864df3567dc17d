use alloy::dyn_abi::DynSolValue;
use alloy::primitives::Address;
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Duration;

use super::decoder::{decode, CallResult};
use super::encoder::CallRequest;
use super::error::{AbiResult, TransportError};
use super::provider::Transport;
use super::registry::InterfaceRegistry;

/// A read-only binding of one contract address to its interface.
///
/// The registry is shared and immutable, so a client can be wrapped in an
/// `Arc` and used from several tasks at once as long as the transport is
/// `Sync`.
#[derive(Debug)]
pub struct ContractClient<T> {
    address: Address,
    registry: Arc<InterfaceRegistry>,
    transport: T,
    timeout: Option<Duration>,
}

impl<T: Transport> ContractClient<T> {
    pub fn new(address: Address, registry: Arc<InterfaceRegistry>, transport: T) -> Self {
        Self {
            address,
            registry,
            transport,
            timeout: None,
        }
    }

    /// Fail calls whose transport round trip exceeds `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn registry(&self) -> &InterfaceRegistry {
        &self.registry
    }

    /// Call `function` (bare name or full signature) with typed arguments.
    pub async fn call(&self, function: &str, args: Vec<DynSolValue>) -> AbiResult<CallResult> {
        let descriptor = self.registry.lookup(function)?;
        let request = CallRequest::new(self.address, descriptor, args)?;
        self.dispatch(request).await
    }

    /// Call `function` with JSON parameters, positional or named.
    pub async fn call_json(&self, function: &str, params: &Json) -> AbiResult<CallResult> {
        let descriptor = self.registry.lookup(function)?;
        let request = CallRequest::from_json(self.address, descriptor, params)?;
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: CallRequest<'_>) -> AbiResult<CallResult> {
        let function = request.function;
        if !function.is_read_only() {
            tracing::warn!(
                "{} is not a view function; eth_call only simulates it",
                function.signature()
            );
        }

        let calldata = request.calldata()?;
        tracing::debug!(
            "eth_call {} ({}) on {:?}, {} bytes of calldata",
            function.signature(),
            function.selector_hex(),
            request.target,
            calldata.len()
        );

        let pending = self.transport.call(request.target, calldata);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| TransportError::Timeout(limit))??,
            None => pending.await?,
        };

        tracing::debug!("Received {} bytes from {}", response.len(), function.name());
        decode(function, &response)
    }
}
