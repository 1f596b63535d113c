/// Ledger client for EVM networks.
use crate::config::ServiceConfig;
use crate::ledger::{LedgerClient, LedgerError};
use crate::types::TxReceipt;
use async_trait::async_trait;
use ethers::{
    contract::abigen,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, TransactionReceipt, TransactionRequest, U256},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

abigen!(
    SettlementToken,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function transfer(address to, uint256 amount) external returns (bool)
    ]"#
);

abigen!(
    EscrowContract,
    r#"[
        function createTx(string transactionId, address creator, uint256 amount) external payable
    ]"#
);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Pays from a local private key through a JSON-RPC node.
///
/// # Examples
///
/// ```rust,no_run
/// use x402_pay::config::ServiceConfig;
/// use x402_pay::ledger::evm::EvmLedger;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServiceConfig::from_env()?;
/// let ledger = EvmLedger::connect(&config).await?;
/// # Ok(())
/// # }
/// ```
pub struct EvmLedger {
    client: Arc<SignerClient>,
    confirmations: usize,
}

impl EvmLedger {
    pub async fn connect(config: &ServiceConfig) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| LedgerError::NetworkError(format!("Failed to create provider: {}", e)))?
            .interval(POLL_INTERVAL);
        // real chain id
        let real_chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| LedgerError::NetworkError(format!("Failed to get chain ID: {}", e)))?
            .as_u64();
        check_chain_id(config.chain_id, real_chain_id)?;
        let wallet = config.wallet.clone().with_chain_id(real_chain_id);
        debug!(
            network = %config.network_name,
            chain_id = real_chain_id,
            payer = ?wallet.address(),
            "connected to ledger"
        );
        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            confirmations: config.confirmations.max(1),
        })
    }

    fn token(&self, token: Address) -> SettlementToken<SignerClient> {
        SettlementToken::new(token, self.client.clone())
    }

    fn escrow(&self, escrow: Address) -> EscrowContract<SignerClient> {
        EscrowContract::new(escrow, self.client.clone())
    }

    /// convert a node receipt into the client's receipt
    fn to_receipt(receipt: Option<TransactionReceipt>) -> Option<TxReceipt> {
        receipt.map(|r| TxReceipt {
            tx_hash: format!("{:?}", r.transaction_hash),
            status: r.status.map(|s| s.as_u64()),
            block_number: r.block_number.map(|b| b.as_u64()),
        })
    }
}

/// `expected` is `None` for custom RPC endpoints, which accept any chain.
fn check_chain_id(expected: Option<u64>, actual: u64) -> Result<(), LedgerError> {
    match expected {
        Some(expected) if expected != actual => Err(LedgerError::ChainMismatch { expected, actual }),
        _ => Ok(()),
    }
}

#[async_trait]
impl LedgerClient for EvmLedger {
    fn address(&self) -> Address {
        self.client.address()
    }

    async fn transfer_token(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>, LedgerError> {
        let contract = self.token(token);
        let call = contract.transfer(to, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| LedgerError::ContractError(format!("transfer: {}", e)))?;
        info!(tx_hash = ?pending.tx_hash(), ?to, %amount, "token transfer submitted");
        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|e| LedgerError::RpcError(format!("Failed to await transfer: {}", e)))?;
        Ok(Self::to_receipt(receipt))
    }

    async fn approve_token(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>, LedgerError> {
        let contract = self.token(token);
        let call = contract.approve(spender, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| LedgerError::ContractError(format!("approve: {}", e)))?;
        info!(tx_hash = ?pending.tx_hash(), ?spender, %amount, "token approval submitted");
        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|e| LedgerError::RpcError(format!("Failed to await approval: {}", e)))?;
        Ok(Self::to_receipt(receipt))
    }

    async fn create_escrow_tx(
        &self,
        escrow: Address,
        transaction_id: &str,
        creator: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>, LedgerError> {
        let contract = self.escrow(escrow);
        let call = contract.create_tx(transaction_id.to_string(), creator, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| LedgerError::ContractError(format!("createTx: {}", e)))?;
        info!(tx_hash = ?pending.tx_hash(), ?escrow, transaction_id, "escrow createTx submitted");
        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|e| LedgerError::RpcError(format!("Failed to await createTx: {}", e)))?;
        Ok(Self::to_receipt(receipt))
    }

    async fn send_native(
        &self,
        to: Address,
        amount: U256,
    ) -> Result<Option<TxReceipt>, LedgerError> {
        let tx = TransactionRequest::new()
            .from(self.client.address())
            .to(to)
            .value(amount);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| LedgerError::SignerError(format!("native transfer: {}", e)))?;
        info!(tx_hash = ?pending.tx_hash(), ?to, %amount, "native transfer submitted");
        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|e| LedgerError::RpcError(format!("Failed to await transfer: {}", e)))?;
        Ok(Self::to_receipt(receipt))
    }
}
