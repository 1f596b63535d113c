/// Type definitions for global use.
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Header carrying the payment proof on a retried request.
pub const PAYMENT_PROOF_HEADER: &str = "x-payment-tx";

/// Header name handed to callers of the generic pay-and-retry primitive.
pub const GENERIC_PAYMENT_PROOF_HEADER: &str = "X-Payment-Tx";

/// Decimal precision of the settlement token.
pub const SETTLEMENT_TOKEN_DECIMALS: u32 = 6;

/// Decimal precision of the network's native currency.
pub const NATIVE_DECIMALS: u32 = 18;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Local,
}

impl Network {
    pub fn all() -> [Network; 3] {
        [Network::Mainnet, Network::Testnet, Network::Local]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Local => "local",
        }
    }

    pub fn get_standard_chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 8453,
            Network::Testnet => 84532,
            Network::Local => 31337,
        }
    }

    pub fn get_display_name(&self) -> &'static str {
        match self {
            Network::Mainnet => "Base Mainnet",
            Network::Testnet => "Base Sepolia",
            Network::Local => "Local Devnet",
        }
    }

    pub fn get_default_rpc_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://mainnet.base.org",
            Network::Testnet => "https://sepolia.base.org",
            Network::Local => "http://127.0.0.1:8545",
        }
    }

    /// USDC deployment on the network, if there is a canonical one.
    pub fn get_settlement_token(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet => Some("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            Network::Testnet => Some("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            Network::Local => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown network '{0}' (expected mainnet, testnet or local)")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "primary" | "main" | "base" => Ok(Network::Mainnet),
            "testnet" | "test" | "base-sepolia" | "sepolia" => Ok(Network::Testnet),
            "local" | "localhost" | "devnet" | "anvil" => Ok(Network::Local),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// Static description of a network the client can pay on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkProfile {
    pub name: String,
    pub display_name: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub token_address: Option<String>,
}

impl NetworkProfile {
    pub fn new(name: &str, display_name: &str, rpc_url: &str, chain_id: u64) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            rpc_url: rpc_url.to_string(),
            chain_id,
            token_address: None,
        }
    }

    pub fn with_token_address(mut self, token_address: &str) -> Self {
        self.token_address = Some(token_address.to_string());
        self
    }

    pub fn from_network(network: Network) -> Self {
        let profile = Self::new(
            network.as_str(),
            network.get_display_name(),
            network.get_default_rpc_url(),
            network.get_standard_chain_id(),
        );
        match network.get_settlement_token() {
            Some(token) => profile.with_token_address(token),
            None => profile,
        }
    }
}

/// How a challenge gets settled on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentPath {
    /// Plain token transfer to the receiver.
    Direct,
    /// Token approval followed by an escrow `createTx` call.
    Escrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amount as found in a challenge body; servers send both strings and numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChallengeAmount {
    Text(String),
    Number(serde_json::Number),
}

impl ChallengeAmount {
    pub fn as_decimal_string(&self) -> String {
        match self {
            ChallengeAmount::Text(text) => text.trim().to_string(),
            ChallengeAmount::Number(number) => number.to_string(),
        }
    }
}

/// Payment instructions carried by a 402 response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "amount")]
    pub amount_payment: Option<ChallengeAmount>,
    #[serde(default)]
    pub receiver_address: Option<String>,
    #[serde(default)]
    pub escrow_address: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
}

impl PaymentChallenge {
    pub fn amount(&self) -> Option<String> {
        self.amount_payment
            .as_ref()
            .map(ChallengeAmount::as_decimal_string)
            .filter(|amount| !amount.is_empty())
    }

    /// Address the payment ultimately goes to.
    pub fn payee(&self) -> Option<&str> {
        non_empty(&self.receiver_address).or_else(|| non_empty(&self.escrow_address))
    }

    /// Escrow contract advertised by the server, if any.
    pub fn escrow_contract(&self) -> Option<&str> {
        non_empty(&self.contract_address).or_else(|| non_empty(&self.escrow_address))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Proof of a confirmed payment, sent back on the retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub tx_hash: String,
    pub path: PaymentPath,
    pub amount: String,
    pub payee: String,
}

impl PaymentProof {
    pub fn header(&self) -> (String, String) {
        (PAYMENT_PROOF_HEADER.to_string(), self.tx_hash.clone())
    }
}

/// Outcome of a confirmed (or failed) on-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub status: Option<u64>,
    pub block_number: Option<u64>,
}

impl TxReceipt {
    pub fn is_success(&self) -> bool {
        self.status == Some(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must start with 0x: {0}")]
    MissingPrefix(String),
    #[error("address must be 42 characters, got {0}")]
    InvalidLength(usize),
    #[error("address contains non-hex characters: {0}")]
    InvalidHex(String),
}

/// Parse a 0x-prefixed, 20-byte hex chain address.
pub fn parse_address(address: &str) -> Result<Address, AddressError> {
    let address = address.trim();
    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(AddressError::MissingPrefix(address.to_string()));
    }
    if address.len() != 42 {
        return Err(AddressError::InvalidLength(address.len()));
    }
    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AddressError::InvalidHex(address.to_string()));
    }
    Address::from_str(hex_part).map_err(|_| AddressError::InvalidHex(address.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative: {0}")]
    Negative(String),
    #[error("amount is not a decimal number: {0}")]
    NotDecimal(String),
    #[error("amount {amount} has more than {decimals} fractional digits")]
    TooPrecise { amount: String, decimals: u32 },
    #[error("amount does not fit in 256 bits: {0}")]
    Overflow(String),
}

/// Scale a human-readable decimal amount into integer base units.
///
/// "1.5" with 6 decimals becomes 1_500_000. Parsing is exact: no floating point
/// is involved and excess precision is rejected rather than rounded.
pub fn scale_amount(amount: &str, decimals: u32) -> Result<U256, AmountError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(AmountError::Empty);
    }
    if amount.starts_with('-') {
        return Err(AmountError::Negative(amount.to_string()));
    }
    let unsigned = amount.strip_prefix('+').unwrap_or(amount);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (unsigned, ""),
    };
    let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(AmountError::NotDecimal(amount.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            amount: amount.to_string(),
            decimals,
        });
    }
    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.push_str(fraction);
    for _ in fraction.len()..decimals as usize {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits).map_err(|_| AmountError::Overflow(amount.to_string()))
}
