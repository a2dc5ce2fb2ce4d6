use std::{
    collections::HashMap, env, fs, ops::Deref, path::Path, str::FromStr,
    sync::Arc,
};

use ethers::types::Address;
use url::Url;

use crate::{
    cache::QueryCache, error::Error, helpers::parse_tuple_string,
    provider::ChainClient,
};

#[derive(Debug)]
pub struct AppState<T>(Arc<T>);

impl<T> AppState<T> {
    pub fn new(state: T) -> AppState<T> {
        AppState(Arc::new(state))
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> AppState<T> {
        AppState(Arc::clone(&self.0))
    }
}

impl<T> Deref for AppState<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

/// Contract addresses of one network. A zero address means the contract is
/// not deployed there yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub vault: Address,
    pub leaderboard: Address,
    pub token: Address,
}

impl Deployment {
    pub fn vault_deployed(&self) -> bool {
        !self.vault.is_zero()
    }

    pub fn leaderboard_deployed(&self) -> bool {
        !self.leaderboard.is_zero()
    }

    pub fn token_deployed(&self) -> bool {
        !self.token.is_zero()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: HashMap<u64, Deployment>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain_id: u64, deployment: Deployment) {
        self.networks.insert(chain_id, deployment);
    }

    pub fn get(&self, chain_id: u64) -> Result<&Deployment, Error> {
        match self.networks.get(&chain_id) {
            Some(d) => Ok(d),
            None => Err(Error::ConfigurationError(format!(
                "No deployment registered for chain {}",
                chain_id
            ))),
        }
    }
}

#[derive(Debug)]
pub struct State<C> {
    pub config: Config,
    pub clients: HashMap<u64, C>,
    pub cache: QueryCache,
}

impl<C: ChainClient> State<C> {
    pub fn new(config: Config, clients: HashMap<u64, C>) -> State<C> {
        let cache = QueryCache::new(
            config.positions_stale_time,
            config.leaderboard_stale_time,
            config.allowance_stale_time(),
        );

        Self {
            config,
            clients,
            cache,
        }
    }

    pub fn deployment(&self, chain_id: u64) -> Result<&Deployment, Error> {
        self.config.networks.get(chain_id)
    }

    pub fn client(&self, chain_id: u64) -> Result<&C, Error> {
        match self.clients.get(&chain_id) {
            Some(c) => Ok(c),
            None => Err(Error::ConfigurationError(format!(
                "No RPC connection configured for chain {}",
                chain_id
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chain_id: u64,
    pub networks: NetworkRegistry,
    pub rpc_urls: HashMap<u64, Url>,
    pub account: Option<Address>,
    pub token_decimals: u32,
    pub from_block: u64,
    pub positions_stale_time: u64,
    pub leaderboard_stale_time: u64,
    pub allowance_poll_interval: u64,
    pub receipt_poll_interval: u64,
    pub receipt_timeout: Option<u64>,
}

impl Config {
    /// Allowance is polled, so a cached value never outlives one interval.
    pub fn allowance_stale_time(&self) -> u64 {
        (self.allowance_poll_interval / 1000).max(1)
    }

    pub fn require_account(&self) -> Result<Address, Error> {
        self.account.ok_or_else(|| {
            Error::ConfigurationError(String::from("ACCOUNT is not set"))
        })
    }
}

pub fn get_configuration() -> Result<Config, Error> {
    let chain_id: u64 = env::var("CHAIN_ID")?.parse()?;
    let networks = parse_networks(env::var("NETWORKS")?)?;
    let rpc_urls = parse_rpc_urls(env::var("RPC_URLS")?)?;
    let account = match env::var("ACCOUNT") {
        Ok(value) if !value.trim().is_empty() => {
            Some(parse_address(value.trim())?)
        },
        _ => None,
    };
    let token_decimals: u32 = env::var("TOKEN_DECIMALS")?.parse()?;
    let from_block: u64 = env::var("FROM_BLOCK")?.parse()?;
    let positions_stale_time = env::var("POSITIONS_STALE_TIME_SECS")?.parse()?;
    let leaderboard_stale_time =
        env::var("LEADERBOARD_STALE_TIME_SECS")?.parse()?;
    let allowance_poll_interval =
        env::var("ALLOWANCE_POLL_INTERVAL_MS")?.parse()?;
    let receipt_poll_interval = env::var("RECEIPT_POLL_INTERVAL_MS")?.parse()?;
    let receipt_timeout: u64 = env::var("RECEIPT_TIMEOUT_SECS")?.parse()?;

    if token_decimals > 18 {
        return Err(Error::ConfigurationError(format!(
            "TOKEN_DECIMALS must be at most 18, got {}",
            token_decimals
        )));
    }

    let config = Config {
        chain_id,
        networks,
        rpc_urls,
        account,
        token_decimals,
        from_block,
        positions_stale_time,
        leaderboard_stale_time,
        allowance_poll_interval,
        receipt_poll_interval,
        receipt_timeout: if receipt_timeout > 0 {
            Some(receipt_timeout)
        } else {
            None
        },
    };

    Ok(config)
}

pub fn set_configuration() -> Result<(), Error> {
    let config_file: &str = ".env";
    let vault_config_file: &str = "vault.conf";

    let directory = env!("CARGO_MANIFEST_DIR");
    let path = format!("{}/{}", directory, config_file);
    let vault_config_path = format!("{}/{}", directory, vault_config_file);

    let vault_config_string = fs::read_to_string(vault_config_path)?;
    parse_config_string(vault_config_string);

    if Path::new(&path).exists() {
        let config_string = fs::read_to_string(path)?;
        parse_config_string(config_string);
    }

    Ok(())
}

fn parse_config_string(config: String) {
    for (key, value) in parse_config_lines(&config) {
        env::set_var(key, value);
    }
}

fn parse_config_lines(config: &str) -> Vec<(&str, &str)> {
    config
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            line.find('=')
                .map(|index| line.split_at(index))
                .map(|(k, v)| (k.trim(), v[1..].trim()))
        })
        .collect()
}

pub fn parse_address(value: &str) -> Result<Address, Error> {
    Address::from_str(value).map_err(|e| {
        Error::ConfigurationError(format!("Invalid address {}: {}", value, e))
    })
}

/// Parses `(chainId,vault,leaderboard,token),(...)`.
pub fn parse_networks(value: String) -> Result<NetworkRegistry, Error> {
    let mut registry = NetworkRegistry::new();

    for item in parse_tuple_string(value) {
        let items: Vec<&str> = item.split(',').map(str::trim).collect();
        if items.len() != 4 {
            return Err(Error::ConfigurationError(format!(
                "Network entry ({}) must have 4 fields",
                item
            )));
        }
        let chain_id: u64 = items[0].parse()?;
        let deployment = Deployment {
            vault: parse_address(items[1])?,
            leaderboard: parse_address(items[2])?,
            token: parse_address(items[3])?,
        };
        registry.insert(chain_id, deployment);
    }

    Ok(registry)
}

/// Parses `(chainId,url),(...)`.
pub fn parse_rpc_urls(value: String) -> Result<HashMap<u64, Url>, Error> {
    let mut urls = HashMap::new();

    for item in parse_tuple_string(value) {
        let Some((chain_id, url)) = item.split_once(',') else {
            return Err(Error::ConfigurationError(format!(
                "RPC entry ({}) must have 2 fields",
                item
            )));
        };
        let chain_id: u64 = chain_id.trim().parse()?;
        urls.insert(chain_id, Url::parse(url.trim())?);
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAULT: &str = "0x00000000000000000000000000000000000000a1";
    const BOARD: &str = "0x00000000000000000000000000000000000000b2";
    const TOKEN: &str = "0x00000000000000000000000000000000000000c3";
    const ZERO: &str = "0x0000000000000000000000000000000000000000";

    #[test]
    fn test_parse_networks() {
        let value = format!(
            "({},{},{},{}),(1,{},{},{})",
            11155111, VAULT, BOARD, TOKEN, ZERO, ZERO, ZERO
        );
        let registry = parse_networks(value).unwrap();

        let sepolia = registry.get(11155111).unwrap();
        assert_eq!(sepolia.vault, parse_address(VAULT).unwrap());
        assert!(sepolia.vault_deployed());
        assert!(sepolia.leaderboard_deployed());

        let mainnet = registry.get(1).unwrap();
        assert!(!mainnet.vault_deployed());
        assert!(!mainnet.token_deployed());
    }

    #[test]
    fn test_unknown_network_is_configuration_error() {
        let registry = NetworkRegistry::new();
        let result = registry.get(42);
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_parse_networks_rejects_short_entry() {
        let value = format!("(1,{},{})", VAULT, BOARD);
        let result = parse_networks(value);
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_parse_rpc_urls() {
        let value = String::from(
            "(1,https://eth.example.org),(11155111,https://sepolia.example.org/v1)",
        );
        let urls = parse_rpc_urls(value).unwrap();

        assert_eq!(urls.len(), 2);
        assert_eq!(urls[&1].host_str(), Some("eth.example.org"));
        assert_eq!(urls[&11155111].path(), "/v1");
    }

    #[test]
    fn test_parse_config_lines() {
        let config = "# comment\nCHAIN_ID=1\n\nNETWORKS=(1,a,b,c)\nBROKEN\n";
        let lines = parse_config_lines(config);

        assert_eq!(
            lines,
            vec![("CHAIN_ID", "1"), ("NETWORKS", "(1,a,b,c)")]
        );
    }
}
