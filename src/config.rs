/// Configuration module
use crate::types::{
    AddressError, Network, NetworkProfile, SETTLEMENT_TOKEN_DECIMALS, parse_address,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://api.x402.dev";
pub const DEFAULT_NETWORK: &str = "testnet";
pub const DEFAULT_CONFIRMATIONS: usize = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Signing key is required")]
    MissingPrivateKey,
    #[error("Invalid signing key: {0}")]
    InvalidPrivateKey(String),
    #[error("Unknown network '{0}' and no RPC URL override given")]
    UnknownNetwork(String),
    #[error("Invalid {field} URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid {field}: {source}")]
    InvalidAddress {
        field: &'static str,
        #[source]
        source: AddressError,
    },
    #[error("No settlement token address known for network '{0}'")]
    MissingTokenAddress(String),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("RPC node is on chain {actual}, configured for {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// Named network profiles the client can resolve a selector against.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    profiles: HashMap<String, NetworkProfile>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        let profiles = Network::all()
            .into_iter()
            .map(|network| (network.as_str().to_string(), NetworkProfile::from_network(network)))
            .collect();
        Self { profiles }
    }

    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
        }
    }

    pub fn register(&mut self, profile: NetworkProfile) {
        self.profiles.insert(profile.name.to_ascii_lowercase(), profile);
    }

    /// resolve a selector by exact name first, then by well-known alias
    pub fn resolve(&self, selector: &str) -> Option<&NetworkProfile> {
        let key = selector.trim().to_ascii_lowercase();
        self.profiles.get(&key).or_else(|| {
            key.parse::<Network>()
                .ok()
                .and_then(|network| self.profiles.get(network.as_str()))
        })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable settings for one orchestrator, validated once at construction.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub wallet: LocalWallet,
    pub network_name: String,
    pub display_name: String,
    pub rpc_url: Url,
    /// `None` only for custom RPC endpoints; the ledger asks the node.
    pub chain_id: Option<u64>,
    pub api_base_url: Url,
    pub token_address: Address,
    pub escrow_contract: Option<Address>,
    pub token_decimals: u32,
    pub confirmations: usize,
}

impl ServiceConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        ConfigBuilder::from_env().build()
    }

    pub fn payer_address(&self) -> Address {
        self.wallet.address()
    }
}

/// On-disk form of the configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfigFile {
    pub private_key: Option<String>,
    pub network: Option<String>,
    pub rpc_url: Option<String>,
    pub chain_id: Option<u64>,
    pub api_base_url: Option<String>,
    pub token_address: Option<String>,
    pub escrow_address: Option<String>,
    pub confirmations: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    private_key: Option<String>,
    network: String,
    rpc_url: Option<String>,
    chain_id: Option<u64>,
    api_base_url: Option<String>,
    token_address: Option<String>,
    escrow_contract: Option<String>,
    confirmations: usize,
    registry: NetworkRegistry,
    invalid_chain_id: Option<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            private_key: None,
            network: DEFAULT_NETWORK.to_string(),
            rpc_url: None,
            chain_id: None,
            api_base_url: None,
            token_address: None,
            escrow_contract: None,
            confirmations: DEFAULT_CONFIRMATIONS,
            registry: NetworkRegistry::new(),
            invalid_chain_id: None,
        }
    }

    pub fn from_env() -> Self {
        Self::from_vars(&load_environment_variables())
    }

    /// Builder seeded from `X402_*` variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let mut builder = Self::new();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        if let Some(key) = get("X402_PRIVATE_KEY") {
            builder = builder.with_private_key(key);
        }
        if let Some(network) = get("X402_NETWORK") {
            builder = builder.with_network(network);
        }
        if let Some(rpc_url) = get("X402_RPC_URL") {
            builder = builder.with_rpc_url(rpc_url);
        }
        if let Some(chain_id) = get("X402_CHAIN_ID") {
            match chain_id.parse() {
                Ok(chain_id) => builder = builder.with_chain_id(chain_id),
                Err(_) => builder.invalid_chain_id = Some(chain_id.to_string()),
            }
        }
        if let Some(base) = get("X402_API_BASE_URL") {
            builder = builder.with_api_base_url(base);
        }
        if let Some(token) = get("X402_TOKEN_ADDRESS") {
            builder = builder.with_token_address(token);
        }
        if let Some(escrow) = get("X402_ESCROW_ADDRESS") {
            builder = builder.with_escrow_contract(escrow);
        }
        builder
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        let file: ConfigFile = serde_json::from_str(&content)?;
        Ok(Self::new().merge_file(file))
    }

    /// Apply every field the file sets on top of the current builder.
    pub fn merge_file(mut self, file: ConfigFile) -> Self {
        if let Some(key) = file.private_key {
            self.private_key = Some(key);
        }
        if let Some(network) = file.network {
            self.network = network;
        }
        if let Some(rpc_url) = file.rpc_url {
            self.rpc_url = Some(rpc_url);
        }
        if let Some(chain_id) = file.chain_id {
            self.chain_id = Some(chain_id);
        }
        if let Some(base) = file.api_base_url {
            self.api_base_url = Some(base);
        }
        if let Some(token) = file.token_address {
            self.token_address = Some(token);
        }
        if let Some(escrow) = file.escrow_address {
            self.escrow_contract = Some(escrow);
        }
        if let Some(confirmations) = file.confirmations {
            self.confirmations = confirmations;
        }
        self
    }

    pub fn with_private_key(mut self, key: &str) -> Self {
        self.private_key = Some(key.to_string());
        self
    }

    pub fn with_network(mut self, network: &str) -> Self {
        self.network = network.to_string();
        self
    }

    pub fn with_rpc_url(mut self, rpc_url: &str) -> Self {
        self.rpc_url = Some(rpc_url.to_string());
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_api_base_url(mut self, base: &str) -> Self {
        self.api_base_url = Some(base.to_string());
        self
    }

    pub fn with_token_address(mut self, token: &str) -> Self {
        self.token_address = Some(token.to_string());
        self
    }

    pub fn with_escrow_contract(mut self, escrow: &str) -> Self {
        self.escrow_contract = Some(escrow.to_string());
        self
    }

    pub fn with_confirmations(mut self, confirmations: usize) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_registry(mut self, registry: NetworkRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Result<ServiceConfig, ConfigError> {
        if let Some(value) = self.invalid_chain_id {
            return Err(ConfigError::InvalidValue {
                field: "X402_CHAIN_ID",
                value,
            });
        }
        let key = self.private_key.ok_or(ConfigError::MissingPrivateKey)?;
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?;

        let (network_name, display_name, rpc_url, chain_id, profile_token) =
            match (self.registry.resolve(&self.network), self.rpc_url) {
                (Some(profile), rpc_override) => (
                    profile.name.clone(),
                    profile.display_name.clone(),
                    rpc_override.unwrap_or_else(|| profile.rpc_url.clone()),
                    self.chain_id.or(Some(profile.chain_id)),
                    profile.token_address.clone(),
                ),
                (None, Some(rpc_url)) => (
                    self.network.clone(),
                    format!("Custom ({})", self.network),
                    rpc_url,
                    self.chain_id,
                    None,
                ),
                (None, None) => return Err(ConfigError::UnknownNetwork(self.network)),
            };
        let rpc_url = parse_url("RPC", &rpc_url)?;
        let api_base_url = parse_url(
            "API base",
            self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL),
        )?;

        let token_address = self
            .token_address
            .or(profile_token)
            .ok_or_else(|| ConfigError::MissingTokenAddress(network_name.clone()))?;
        let token_address = parse_address(&token_address).map_err(|source| {
            ConfigError::InvalidAddress {
                field: "settlement token address",
                source,
            }
        })?;
        let escrow_contract = self
            .escrow_contract
            .map(|escrow| {
                parse_address(&escrow).map_err(|source| ConfigError::InvalidAddress {
                    field: "escrow contract address",
                    source,
                })
            })
            .transpose()?;

        let wallet = match chain_id {
            Some(chain_id) => wallet.with_chain_id(chain_id),
            None => wallet,
        };

        Ok(ServiceConfig {
            wallet,
            network_name,
            display_name,
            rpc_url,
            chain_id,
            api_base_url,
            token_address,
            escrow_contract,
            token_decimals: SETTLEMENT_TOKEN_DECIMALS,
            confirmations: self.confirmations,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}

fn load_environment_variables() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("X402_"))
        .collect()
}
