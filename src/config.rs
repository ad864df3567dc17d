use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Upper bound on a single eth_call round trip
    pub request_timeout_secs: Option<u64>,
    /// Overrides the platform cache directory for fetched ABIs
    pub abi_cache_dir: Option<PathBuf>,
}

impl QueryConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        networks.insert(
            "flare".to_string(),
            NetworkConfig {
                rpc_url: "https://flare-api.flare.network/ext/C/rpc".to_string(),
                chain_id: 14,
                explorer_api_url: Some("https://flare-explorer.flare.network/api".to_string()),
            },
        );

        networks.insert(
            "coston2".to_string(),
            NetworkConfig {
                rpc_url: "https://coston2-api.flare.network/ext/C/rpc".to_string(),
                chain_id: 114,
                explorer_api_url: Some("https://coston2-explorer.flare.network/api".to_string()),
            },
        );

        networks.insert(
            "songbird".to_string(),
            NetworkConfig {
                rpc_url: "https://songbird-api.flare.network/ext/C/rpc".to_string(),
                chain_id: 19,
                explorer_api_url: Some("https://songbird-explorer.flare.network/api".to_string()),
            },
        );

        networks.insert(
            "coston".to_string(),
            NetworkConfig {
                rpc_url: "https://coston-api.flare.network/ext/C/rpc".to_string(),
                chain_id: 16,
                explorer_api_url: Some("https://coston-explorer.flare.network/api".to_string()),
            },
        );

        Self {
            networks,
            default_network: "coston2".to_string(),
            query: QueryConfig {
                request_timeout_secs: Some(30),
                abi_cache_dir: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    /// `<NETWORK>_RPC_URL` replaces the configured endpoint of that network,
    /// e.g. `COSTON2_RPC_URL`
    fn apply_env_vars(&mut self) {
        for (network_name, network_config) in &mut self.networks {
            let var = format!("{}_RPC_URL", network_name.to_uppercase().replace('-', "_"));
            if let Ok(rpc_url) = std::env::var(&var) {
                tracing::debug!("Using {} for {} RPC URL", var, network_name);
                network_config.rpc_url = rpc_url;
            }
        }
    }

    pub fn get_network(&self, name: Option<&str>) -> Result<&NetworkConfig> {
        let name = name.unwrap_or(&self.default_network);
        self.networks
            .get(name)
            .ok_or_else(|| anyhow!("Network '{}' not configured", name))
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("flare-query").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# flare-query configuration file
# Networks, endpoints and query behaviour

# Default network to use when none is specified
default_network = "coston2"

# Network configurations
[networks.flare]
rpc_url = "https://flare-api.flare.network/ext/C/rpc"
chain_id = 14
explorer_api_url = "https://flare-explorer.flare.network/api"

[networks.coston2]
rpc_url = "https://coston2-api.flare.network/ext/C/rpc"
chain_id = 114
explorer_api_url = "https://coston2-explorer.flare.network/api"

[networks.songbird]
rpc_url = "https://songbird-api.flare.network/ext/C/rpc"
chain_id = 19
explorer_api_url = "https://songbird-explorer.flare.network/api"

[networks.coston]
rpc_url = "https://coston-api.flare.network/ext/C/rpc"
chain_id = 16
explorer_api_url = "https://coston-explorer.flare.network/api"

[query]
request_timeout_secs = 30
# abi_cache_dir = "/tmp/flare-query-abis"

# Environment variables that can be used:
# FLARE_RPC_URL, COSTON2_RPC_URL, SONGBIRD_RPC_URL, COSTON_RPC_URL
#   override the rpc_url of the matching network
"#;
        sample_config.to_string()
    }
}
