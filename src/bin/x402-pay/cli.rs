//! CLI definition for x402-pay.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use x402_pay::config::{ConfigBuilder, ConfigError};

/// Fetch x402-protected content, paying on chain when challenged.
#[derive(Parser, Debug)]
#[command(name = "x402-pay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file. Flags and X402_* variables take precedence.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hex private key of the paying account.
    #[arg(long, env = "X402_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Network name: mainnet, testnet or local.
    #[arg(long, env = "X402_NETWORK")]
    pub network: Option<String>,

    /// RPC endpoint, overriding the network's default.
    #[arg(long, env = "X402_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Chain id, for custom RPC endpoints.
    #[arg(long, env = "X402_CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// Base URL of the paid API.
    #[arg(long, env = "X402_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Settlement token contract.
    #[arg(long, env = "X402_TOKEN_ADDRESS")]
    pub token_address: Option<String>,

    /// Escrow contract used when a challenge does not name one.
    #[arg(long, env = "X402_ESCROW_ADDRESS")]
    pub escrow_address: Option<String>,

    /// Give up on the whole operation after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Log level.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Client commands.
#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// GET a resource, paying by direct transfer.
    Resource {
        /// Resource path under the API base URL.
        slug: String,
    },
    /// GET a resource, paying through the escrow contract.
    ResourceEscrow {
        /// Resource path under the API base URL.
        slug: String,
    },
    /// Send a chat message to an agent, paying by direct transfer.
    Agent {
        /// Agent identifier.
        agent: String,
        /// Message to send.
        message: String,
    },
    /// Send a chat message to an agent, paying through the escrow contract.
    AgentEscrow {
        /// Agent identifier.
        agent: String,
        /// Message to send.
        message: String,
    },
    /// Pay native currency to an address, then GET a URL with the proof header.
    Pay {
        /// Amount in whole native units, e.g. 0.001.
        amount: String,
        /// Recipient address.
        recipient: String,
        /// URL to fetch once paid.
        url: String,
    },
}

impl Cli {
    /// Builder from the config file (if any) with flag values layered on top.
    pub fn config_builder(&self) -> Result<ConfigBuilder, ConfigError> {
        let mut builder = match &self.config {
            Some(path) => ConfigBuilder::from_file(&path.to_string_lossy())?,
            None => ConfigBuilder::new(),
        };
        if let Some(key) = &self.private_key {
            builder = builder.with_private_key(key);
        }
        if let Some(network) = &self.network {
            builder = builder.with_network(network);
        }
        if let Some(rpc_url) = &self.rpc_url {
            builder = builder.with_rpc_url(rpc_url);
        }
        if let Some(chain_id) = self.chain_id {
            builder = builder.with_chain_id(chain_id);
        }
        if let Some(base) = &self.api_base_url {
            builder = builder.with_api_base_url(base);
        }
        if let Some(token) = &self.token_address {
            builder = builder.with_token_address(token);
        }
        if let Some(escrow) = &self.escrow_address {
            builder = builder.with_escrow_contract(escrow);
        }
        Ok(builder)
    }
}
