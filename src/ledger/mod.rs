use crate::types::TxReceipt;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use thiserror::Error;

pub mod evm;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("RPC error: {0}")]
    RpcError(String),
    #[error("Contract call failed: {0}")]
    ContractError(String),
    #[error("Signing failed: {0}")]
    SignerError(String),
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

/// Key-holding account able to pay on chain.
///
/// Every method submits exactly one transaction and waits for it to be
/// confirmed. `Ok(None)` means the transaction was dropped without a receipt;
/// a receipt with a non-success status means it reverted. Implementations
/// never rebroadcast.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the paying account.
    fn address(&self) -> Address;

    /// ERC-20 `transfer(to, amount)` on `token`.
    async fn transfer_token(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>, LedgerError>;

    /// ERC-20 `approve(spender, amount)` on `token`.
    async fn approve_token(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>, LedgerError>;

    /// Escrow `createTx(transactionId, creator, amount)`.
    async fn create_escrow_tx(
        &self,
        escrow: Address,
        transaction_id: &str,
        creator: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>, LedgerError>;

    /// Plain transfer of the network's native currency.
    async fn send_native(
        &self,
        to: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>, LedgerError>;
}
