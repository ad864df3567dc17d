use crate::config::{Config, NetworkConfig};
use crate::ethereum::{decoder::decode_revert_reason, error::TransportError};
use alloy::{
    primitives::{Address, Bytes},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    transports::{
        http::{Client, Http},
        RpcError, TransportErrorKind,
    },
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Sends encoded calls to a node and returns the raw return data.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, TransportError>;
}

/// `eth_call` over HTTP JSON-RPC against the latest block.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    provider: RootProvider<Http<Client>>,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(rpc_url: &str) -> Result<Self, TransportError> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| TransportError::InvalidEndpoint {
                url: rpc_url.to_string(),
                reason: format!("{}", e),
            })?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            endpoint: rpc_url.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn chain_id(&self) -> Result<u64, TransportError> {
        self.provider.get_chain_id().await.map_err(classify_rpc_error)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, TransportError> {
        let request = TransactionRequest::default().to(to).input(calldata.into());
        self.provider
            .call(&request)
            .await
            .map_err(classify_rpc_error)
    }
}

fn classify_rpc_error(err: RpcError<TransportErrorKind>) -> TransportError {
    match err.as_error_resp() {
        Some(payload) => {
            let data = payload
                .data
                .as_ref()
                .map(|raw| raw.get().trim_matches('"').to_string());
            classify_error_payload(payload.code, &payload.message, data)
        }
        None => {
            tracing::debug!("RPC transport failure: {}", err);
            TransportError::Network(err.to_string())
        }
    }
}

/// Map a JSON-RPC error object to a transport error, recognising reverts.
/// Revert data that is neither `Error(string)` nor `Panic(uint256)` is a
/// custom error and is kept verbatim in the reason.
pub(crate) fn classify_error_payload(
    code: i64,
    message: &str,
    data: Option<String>,
) -> TransportError {
    if let Some(reason) = data.as_deref().and_then(revert_reason_from_hex) {
        return TransportError::Reverted { reason, data };
    }
    if message.contains("execution reverted") {
        let reason = match data.as_deref() {
            Some(raw) if raw.len() > 2 => format!("{} (custom error data {})", message, raw),
            _ => message.to_string(),
        };
        return TransportError::Reverted { reason, data };
    }
    TransportError::Node {
        code,
        message: message.to_string(),
        data,
    }
}

fn revert_reason_from_hex(data: &str) -> Option<String> {
    let data = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(data).ok()?;
    decode_revert_reason(&bytes)
}

/// One HTTP transport per configured network.
#[derive(Debug)]
pub struct ProviderManager {
    transports: HashMap<String, HttpTransport>,
    config: Config,
}

impl ProviderManager {
    pub fn new(config: Config) -> Result<Self> {
        let mut transports = HashMap::new();

        for (network_name, network_config) in &config.networks {
            let transport = Self::create_transport(network_config)
                .map_err(|e| anyhow!("Network '{}': {}", network_name, e))?;
            transports.insert(network_name.clone(), transport);
        }

        Ok(Self { transports, config })
    }

    fn create_transport(network_config: &NetworkConfig) -> Result<HttpTransport> {
        Ok(HttpTransport::new(&network_config.rpc_url)?)
    }

    pub fn get_transport(&self, network: Option<&str>) -> Result<&HttpTransport> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.transports.get(network_name).ok_or_else(|| {
            anyhow!(
                "Unknown network: '{}'. Available networks: {}",
                network_name,
                self.get_available_networks().join(", ")
            )
        })
    }

    pub fn get_network_config(&self, network: Option<&str>) -> Result<&NetworkConfig> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.config
            .networks
            .get(network_name)
            .ok_or_else(|| anyhow!("Network '{}' not configured", network_name))
    }

    pub fn get_available_networks(&self) -> Vec<String> {
        let mut networks: Vec<String> = self.config.networks.keys().cloned().collect();
        networks.sort();
        networks
    }

    /// Warn when the node serves a different chain than configured. Returns
    /// the chain id reported by the node.
    pub async fn verify_chain_id(&self, network: Option<&str>) -> Result<u64> {
        let transport = self.get_transport(network)?;
        let expected = self.get_network_config(network)?.chain_id;
        let actual = transport.chain_id().await.map_err(|e| {
            anyhow!(
                "Cannot connect to {}: {}. Please check your RPC endpoint configuration and network connectivity.",
                transport.endpoint(),
                e
            )
        })?;

        if actual != expected {
            tracing::warn!(
                "Node at {} reports chain id {}, configuration expects {}",
                transport.endpoint(),
                actual,
                expected
            );
        }
        Ok(actual)
    }
}
