use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};

/// Where fetched interface descriptions are cached on disk
#[derive(Debug, Clone)]
pub struct AbiSource {
    pub cache_dir: PathBuf,
}

impl Default for AbiSource {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flare-query")
            .join("abi-cache");

        Self { cache_dir }
    }
}

/// Fetches contract interface descriptions from a block explorer and caches
/// the raw JSON text
#[derive(Debug)]
pub struct AbiResolver {
    client: Client,
    config: AbiSource,
    memory_cache: HashMap<String, String>,
}

impl AbiResolver {
    pub fn new(config: AbiSource) -> Self {
        Self {
            client: Client::new(),
            config,
            memory_cache: HashMap::new(),
        }
    }

    fn cache_key(address: &str, network: &str) -> String {
        format!("{}_{}", network, address.trim().to_lowercase())
    }

    /// Get the interface description for a contract, trying the caches
    /// first, then the explorer API
    pub async fn get_abi(
        &mut self,
        address: &str,
        network: &str,
        explorer_api_url: &str,
    ) -> Result<String> {
        let cache_key = Self::cache_key(address, network);

        // Check memory cache first
        if let Some(abi) = self.memory_cache.get(&cache_key) {
            debug!("ABI cache hit for {}", address);
            return Ok(abi.clone());
        }

        // Check disk cache
        if let Ok(abi) = self.load_cached_abi(&cache_key).await {
            debug!("ABI disk cache hit for {}", address);
            self.memory_cache.insert(cache_key.clone(), abi.clone());
            return Ok(abi);
        }

        // Fetch from the explorer
        info!("Fetching ABI from {} for {}", explorer_api_url, address);
        let abi = self.fetch_from_explorer(explorer_api_url, address).await?;

        // Cache the result
        if let Err(e) = self.cache_abi(&cache_key, &abi).await {
            warn!("Failed to cache ABI for {}: {}", address, e);
        }

        self.memory_cache.insert(cache_key, abi.clone());
        Ok(abi)
    }

    /// Query `?module=contract&action=getabi&address=..` on a Blockscout or
    /// Etherscan compatible API
    async fn fetch_from_explorer(&self, explorer_api_url: &str, address: &str) -> Result<String> {
        let response: Value = self
            .client
            .get(explorer_api_url)
            .query(&[
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address),
            ])
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch ABI from {}: {}", explorer_api_url, e))?
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse explorer response: {}", e))?;

        parse_explorer_response(&response, address)
    }

    async fn load_cached_abi(&self, cache_key: &str) -> Result<String> {
        let cache_path = self.config.cache_dir.join(format!("{}.json", cache_key));

        if !cache_path.exists() {
            return Err(anyhow!("Cache file does not exist"));
        }

        let content = fs::read_to_string(&cache_path)
            .await
            .map_err(|e| anyhow!("Failed to read cache file: {}", e))?;

        ensure_abi_array(&content).map_err(|e| anyhow!("Corrupt cached ABI: {}", e))?;
        Ok(content)
    }

    async fn cache_abi(&self, cache_key: &str, abi: &str) -> Result<()> {
        // Create cache directory if it doesn't exist
        if !self.config.cache_dir.exists() {
            fs::create_dir_all(&self.config.cache_dir)
                .await
                .map_err(|e| anyhow!("Failed to create cache directory: {}", e))?;
        }

        let cache_path = self.config.cache_dir.join(format!("{}.json", cache_key));
        fs::write(&cache_path, abi)
            .await
            .map_err(|e| anyhow!("Failed to write cache file: {}", e))?;

        debug!("Cached ABI to {:?}", cache_path);
        Ok(())
    }
}

/// Extract the ABI text from an explorer `getabi` response
fn parse_explorer_response(response: &Value, address: &str) -> Result<String> {
    if response["status"] != "1" {
        let message = response["result"]
            .as_str()
            .or_else(|| response["message"].as_str())
            .unwrap_or("Unknown error");
        if message.contains("not verified") {
            return Err(anyhow!(
                "Contract {} is not verified on the explorer. Pass its ABI with --abi instead.",
                address
            ));
        }
        return Err(anyhow!("Explorer API error: {}", message));
    }

    let abi = response["result"]
        .as_str()
        .ok_or_else(|| anyhow!("No ABI found in response"))?;

    ensure_abi_array(abi)?;
    Ok(abi.to_string())
}

fn ensure_abi_array(text: &str) -> Result<()> {
    serde_json::from_str::<Vec<Value>>(text)
        .map(|_| ())
        .map_err(|e| anyhow!("Failed to parse ABI JSON: {}", e))
}
