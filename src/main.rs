use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, Command};
use flare_query::config::Config;
use flare_query::ethereum::abi::{AbiResolver, AbiSource};
use flare_query::ethereum::{
    format_value, ContractClient, InterfaceRegistry, ProviderManager, QueryReport,
    RANDOM_NUMBER_V2_ABI, RANDOM_NUMBER_V2_ADDRESS,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout only carries query results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = Command::new("flare-query")
        .version("0.1.0")
        .about("Read-only contract calls against Flare networks")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .help("Network to query (flare, coston2, songbird, coston)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .help("RPC endpoint URL for the selected network"),
        )
        .arg(
            Arg::new("address")
                .short('a')
                .long("address")
                .value_name("ADDRESS")
                .default_value(RANDOM_NUMBER_V2_ADDRESS)
                .help("Contract address"),
        )
        .arg(
            Arg::new("abi")
                .long("abi")
                .value_name("FILE")
                .conflicts_with("fetch-abi")
                .help("Interface description JSON (defaults to RandomNumberV2)"),
        )
        .arg(
            Arg::new("fetch-abi")
                .long("fetch-abi")
                .help("Fetch the interface description from the network's block explorer")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("function")
                .short('f')
                .long("function")
                .value_name("NAME")
                .default_value("getRandomNumber")
                .help("Function name or full signature"),
        )
        .arg(
            Arg::new("args")
                .long("args")
                .value_name("JSON")
                .default_value("[]")
                .help("Call arguments as a JSON array or object"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the result as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-functions")
                .long("list-functions")
                .help("List the functions of the interface and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64))
                .help("Fail the call after this many seconds"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    // An explicit --config wins; otherwise use the default path when present
    let config_path = match matches.get_one::<String>("config") {
        Some(path) => Some(PathBuf::from(path)),
        None => Config::default_config_path().ok().filter(|p| p.exists()),
    };
    let mut config = Config::load_or_default(config_path).await;

    if let Some(network) = matches.get_one::<String>("network") {
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        match config.networks.get_mut(&config.default_network) {
            Some(network_config) => network_config.rpc_url = rpc_url.clone(),
            None => {
                return Err(anyhow!(
                    "Network '{}' not configured",
                    config.default_network
                ))
            }
        }
    }

    let timeout = matches
        .get_one::<u64>("timeout")
        .map(|secs| Duration::from_secs(*secs))
        .or_else(|| config.query.request_timeout());

    let network = config.default_network.clone();
    let address_text = matches
        .get_one::<String>("address")
        .map(String::as_str)
        .unwrap_or(RANDOM_NUMBER_V2_ADDRESS);

    let abi_text = load_interface(&matches, &config, &network, address_text).await?;
    let registry = InterfaceRegistry::load(&abi_text)?;

    if matches.get_flag("list-functions") {
        for function in registry.functions() {
            println!(
                "{}  {}  {}",
                function.selector_hex(),
                function.signature(),
                function.state_mutability().as_json_str()
            );
        }
        return Ok(());
    }

    let address = Address::from_str(address_text.trim())
        .with_context(|| format!("Invalid contract address '{}'", address_text))?;
    let function = matches
        .get_one::<String>("function")
        .map(String::as_str)
        .unwrap_or("getRandomNumber");
    let args: serde_json::Value = matches
        .get_one::<String>("args")
        .map(|raw| serde_json::from_str(raw))
        .transpose()
        .map_err(|e| anyhow!("Invalid --args JSON: {}", e))?
        .unwrap_or(serde_json::Value::Null);

    let manager = ProviderManager::new(config)?;
    if let Err(e) = manager.verify_chain_id(Some(&network)).await {
        warn!("Skipping chain id check: {}", e);
    }

    info!("Calling {} on {} ({})", function, address, network);

    let mut client = ContractClient::new(
        address,
        Arc::new(registry),
        manager.get_transport(Some(&network))?.clone(),
    );
    if let Some(limit) = timeout {
        client = client.with_timeout(limit);
    }

    let result = client.call_json(function, &args).await?;

    if matches.get_flag("json") {
        let descriptor = client.registry().lookup(function)?;
        let report = QueryReport::new(&network, &address, descriptor, &result);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (i, (name, value)) in result.iter().enumerate() {
            let label = match name.trim_start_matches('_') {
                "" => i.to_string(),
                label => label.to_string(),
            };
            println!("{}: {}", label, format_value(value));
        }
    }

    Ok(())
}

/// Interface text from `--abi`, the explorer, or the embedded RandomNumberV2
/// description. The embedded one is only right for the RandomNumberV2
/// address, so any other address without `--abi`/`--fetch-abi` is warned
/// about.
async fn load_interface(
    matches: &clap::ArgMatches,
    config: &Config,
    network: &str,
    address: &str,
) -> Result<String> {
    if let Some(path) = matches.get_one::<String>("abi") {
        return tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read ABI file {}: {}", path, e));
    }

    if matches.get_flag("fetch-abi") {
        let explorer_api_url = config
            .get_network(Some(network))?
            .explorer_api_url
            .clone()
            .ok_or_else(|| anyhow!("Network '{}' has no explorer_api_url", network))?;

        let source = match &config.query.abi_cache_dir {
            Some(cache_dir) => AbiSource {
                cache_dir: cache_dir.clone(),
            },
            None => AbiSource::default(),
        };
        let mut resolver = AbiResolver::new(source);
        return resolver
            .get_abi(address, network, &explorer_api_url)
            .await
            .with_context(|| format!("Could not resolve the ABI of {} on {}", address, network));
    }

    if !is_random_number_v2(address) {
        warn!(
            "No --abi or --fetch-abi given; assuming {} implements the RandomNumberV2 interface",
            address
        );
    }
    Ok(RANDOM_NUMBER_V2_ABI.to_string())
}

fn is_random_number_v2(address: &str) -> bool {
    address.trim().eq_ignore_ascii_case(RANDOM_NUMBER_V2_ADDRESS)
}
