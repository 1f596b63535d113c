/// x402 Core module.
use crate::config::{ConfigBuilder, ConfigError, ServiceConfig};
use crate::ledger::evm::EvmLedger;
use crate::ledger::{LedgerClient, LedgerError};
use crate::transport::http::ReqwestTransport;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::types::{
    GENERIC_PAYMENT_PROOF_HEADER, HttpMethod, NATIVE_DECIMALS, PaymentChallenge, PaymentPath,
    PaymentProof, TxReceipt, parse_address, scale_amount,
};
use ethers::types::{Address, U256};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Which of the two HTTP round trips a transport failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Initial,
    Retry,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

/// On-chain step of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStep {
    Transfer,
    Approve,
    CreateEscrow,
    NativeTransfer,
}

impl fmt::Display for PaymentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer => write!(f, "token transfer"),
            Self::Approve => write!(f, "token approval"),
            Self::CreateEscrow => write!(f, "escrow creation"),
            Self::NativeTransfer => write!(f, "native transfer"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PaymentFailure {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("transaction produced no receipt")]
    MissingReceipt,
    #[error("transaction {tx_hash} failed with status {status:?}")]
    Reverted {
        tx_hash: String,
        status: Option<u64>,
    },
}

/// Error categories, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    LedgerUnavailable,
    Transport,
    UnexpectedStatus,
    MalformedChallenge,
    PaymentFailed,
    RetryRejected,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(#[source] LedgerError),
    #[error("Transport error on {stage} request: {source}")]
    Transport {
        stage: RequestStage,
        /// Hash of the payment already made when the retry failed.
        tx_hash: Option<String>,
        #[source]
        source: TransportError,
    },
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("Malformed payment challenge: {0}")]
    MalformedChallenge(String),
    #[error("Payment failed during {step}: {reason}")]
    PaymentFailed {
        step: PaymentStep,
        #[source]
        reason: PaymentFailure,
    },
    #[error("Retry after payment {tx_hash} rejected with status {status}: {body}")]
    RetryRejected {
        status: u16,
        body: String,
        tx_hash: String,
    },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::LedgerUnavailable(_) => ErrorKind::LedgerUnavailable,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::UnexpectedStatus { .. } => ErrorKind::UnexpectedStatus,
            Self::MalformedChallenge(_) => ErrorKind::MalformedChallenge,
            Self::PaymentFailed { .. } => ErrorKind::PaymentFailed,
            Self::RetryRejected { .. } => ErrorKind::RetryRejected,
        }
    }

    /// True when the call may have cost money without returning content.
    ///
    /// A failed payment counts: an escrow approval can confirm before the
    /// escrow call fails, and a dropped receipt says nothing about inclusion.
    pub fn funds_may_be_spent(&self) -> bool {
        match self {
            Self::Configuration(_)
            | Self::LedgerUnavailable(_)
            | Self::UnexpectedStatus { .. }
            | Self::MalformedChallenge(_) => false,
            Self::Transport { stage, .. } => *stage == RequestStage::Retry,
            Self::PaymentFailed { .. } | Self::RetryRejected { .. } => true,
        }
    }

    /// Hash of the confirmed payment, when one was made.
    pub fn payment_tx_hash(&self) -> Option<&str> {
        match self {
            Self::Transport { tx_hash, .. } => tx_hash.as_deref(),
            Self::RetryRejected { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }
}

/// One request shape: where to send it, how, and how to pay for it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentFlow {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
    pub payment_path: PaymentPath,
    /// Send `Content-Type: application/json` on the retry.
    pub json_retry: bool,
}

impl PaymentFlow {
    pub fn resource(slug: &str) -> Self {
        Self {
            method: HttpMethod::Get,
            path: slug.trim_matches('/').to_string(),
            body: None,
            payment_path: PaymentPath::Direct,
            json_retry: false,
        }
    }

    pub fn resource_escrow(slug: &str) -> Self {
        Self {
            path: format!("escrow/{}", slug.trim_matches('/')),
            payment_path: PaymentPath::Escrow,
            ..Self::resource(slug)
        }
    }

    pub fn agent_chat(agent_slug: &str, message: &str) -> Self {
        Self {
            method: HttpMethod::Post,
            path: format!("agent/{}/chat", agent_slug.trim_matches('/')),
            body: Some(json!({ "message": message })),
            payment_path: PaymentPath::Direct,
            json_retry: true,
        }
    }

    pub fn agent_chat_escrow(agent_slug: &str, message: &str) -> Self {
        Self {
            path: format!("agent/escrow/{}/chat", agent_slug.trim_matches('/')),
            payment_path: PaymentPath::Escrow,
            ..Self::agent_chat(agent_slug, message)
        }
    }

    fn request(&self, url: &str, proof: Option<&PaymentProof>) -> HttpRequest {
        let mut request = HttpRequest::new(self.method, url);
        if let Some(body) = &self.body {
            request = request.with_body(body.clone());
        }
        if let Some(proof) = proof {
            let (name, value) = proof.header();
            request = request.with_header(&name, &value);
            if self.json_retry {
                request = request.with_header("Content-Type", "application/json");
            }
        }
        request
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowOutcome {
    pub body: Value,
    /// `None` when the server served the content without a challenge.
    pub proof: Option<PaymentProof>,
}

impl FlowOutcome {
    pub fn paid(&self) -> bool {
        self.proof.is_some()
    }
}

/// Drives the 402 challenge, on-chain payment and retry for a request.
///
/// # Examples
///
/// ```rust,no_run
/// use x402_pay::config::ServiceConfig;
/// use x402_pay::core::PaymentOrchestrator;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServiceConfig::from_env()?;
/// let orchestrator = PaymentOrchestrator::connect(config).await?;
/// let widget = orchestrator.fetch_protected_resource("widgets/demo").await?;
/// println!("{widget}");
/// # Ok(())
/// # }
/// ```
pub struct PaymentOrchestrator {
    config: ServiceConfig,
    ledger: Arc<dyn LedgerClient>,
    transport: Arc<dyn HttpTransport>,
}

impl PaymentOrchestrator {
    pub fn new(
        config: ServiceConfig,
        ledger: Arc<dyn LedgerClient>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            ledger,
            transport,
        }
    }

    /// Connect to the configured RPC node and use reqwest for HTTP.
    pub async fn connect(config: ServiceConfig) -> Result<Self, OrchestratorError> {
        let ledger = EvmLedger::connect(&config)
            .await
            .map_err(connect_error)?;
        Ok(Self::new(
            config,
            Arc::new(ledger),
            Arc::new(ReqwestTransport::new()),
        ))
    }

    /// Validate `builder` and connect with the result.
    pub async fn connect_from(builder: ConfigBuilder) -> Result<Self, OrchestratorError> {
        Self::connect(builder.build()?).await
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn payer_address(&self) -> Address {
        self.ledger.address()
    }

    pub async fn fetch_protected_resource(&self, slug: &str) -> Result<Value, OrchestratorError> {
        Ok(self.execute(&PaymentFlow::resource(slug)).await?.body)
    }

    pub async fn fetch_protected_resource_escrow(
        &self,
        slug: &str,
    ) -> Result<Value, OrchestratorError> {
        Ok(self.execute(&PaymentFlow::resource_escrow(slug)).await?.body)
    }

    pub async fn fetch_agent_reply(
        &self,
        agent_slug: &str,
        message: &str,
    ) -> Result<Value, OrchestratorError> {
        Ok(self
            .execute(&PaymentFlow::agent_chat(agent_slug, message))
            .await?
            .body)
    }

    pub async fn fetch_agent_reply_escrow(
        &self,
        agent_slug: &str,
        message: &str,
    ) -> Result<Value, OrchestratorError> {
        Ok(self
            .execute(&PaymentFlow::agent_chat_escrow(agent_slug, message))
            .await?
            .body)
    }

    /// Run one request through the challenge/pay/retry sequence.
    ///
    /// # Payment Flow
    ///
    /// 2xx on the first request: body returned, nothing paid.
    /// 402: challenge validated, paid and confirmed on chain, request retried
    /// with the `x-payment-tx` header.
    /// Anything else, or any failed step: error, and nothing is retried.
    pub async fn execute(&self, flow: &PaymentFlow) -> Result<FlowOutcome, OrchestratorError> {
        let span = info_span!(
            "x402_request",
            operation_id = %Uuid::new_v4(),
            method = %flow.method,
            path = %flow.path,
        );
        self.execute_inner(flow).instrument(span).await
    }

    async fn execute_inner(&self, flow: &PaymentFlow) -> Result<FlowOutcome, OrchestratorError> {
        let url = self.endpoint(&flow.path);
        debug!(%url, "issuing initial request");
        let response = self
            .transport
            .send(flow.request(&url, None))
            .await
            .map_err(|source| OrchestratorError::Transport {
                stage: RequestStage::Initial,
                tx_hash: None,
                source,
            })?;
        if response.is_success() {
            info!(status = response.status, "content served without payment");
            return Ok(FlowOutcome {
                body: response.json_body(),
                proof: None,
            });
        }
        if !response.is_payment_required() {
            warn!(status = response.status, "unexpected status on initial request");
            return Err(OrchestratorError::UnexpectedStatus {
                status: response.status,
                body: response.body,
            });
        }

        let challenge = parse_challenge(&response)?;
        let proof = self.settle(&challenge, flow.payment_path).await?;

        debug!(tx_hash = %proof.tx_hash, "retrying with payment proof");
        let response = self
            .transport
            .send(flow.request(&url, Some(&proof)))
            .await
            .map_err(|source| OrchestratorError::Transport {
                stage: RequestStage::Retry,
                tx_hash: Some(proof.tx_hash.clone()),
                source,
            })?;
        if !response.is_success() {
            warn!(
                status = response.status,
                tx_hash = %proof.tx_hash,
                "retry rejected after payment"
            );
            return Err(OrchestratorError::RetryRejected {
                status: response.status,
                body: response.body,
                tx_hash: proof.tx_hash,
            });
        }
        info!(status = response.status, tx_hash = %proof.tx_hash, "paid content received");
        Ok(FlowOutcome {
            body: response.json_body(),
            proof: Some(proof),
        })
    }

    /// Validate the challenge fully, then pay it.
    async fn settle(
        &self,
        challenge: &PaymentChallenge,
        path: PaymentPath,
    ) -> Result<PaymentProof, OrchestratorError> {
        let amount_text = challenge
            .amount()
            .ok_or_else(|| malformed("no payment amount"))?;
        let amount = payable_amount(&amount_text, self.config.token_decimals)?;
        let token = self.config.token_address;

        match path {
            PaymentPath::Direct => {
                let payee = challenge
                    .payee()
                    .ok_or_else(|| malformed("no receiverAddress or escrowAddress"))?;
                let to = parse_address(payee)
                    .map_err(|e| malformed(format!("invalid receiver address: {}", e)))?;
                if challenge.contract_address.is_some() {
                    warn!("challenge names an escrow contract; paying by direct transfer");
                }
                info!(%amount_text, %amount, payee, "paying by direct transfer");
                let receipt = confirm(
                    PaymentStep::Transfer,
                    self.ledger.transfer_token(token, to, amount).await,
                )?;
                Ok(proof(receipt, path, amount_text, payee))
            }
            PaymentPath::Escrow => {
                let receiver = challenge
                    .receiver_address
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| malformed("escrow challenge has no receiverAddress"))?;
                let creator = parse_address(receiver)
                    .map_err(|e| malformed(format!("invalid receiver address: {}", e)))?;
                let escrow = self.escrow_contract(challenge)?;
                let transaction_id = challenge
                    .transaction_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| malformed("escrow challenge has no transactionId"))?;
                info!(%amount_text, %amount, receiver, ?escrow, %transaction_id, "paying through escrow");
                self.pay_escrow(token, escrow, transaction_id, creator, amount)
                    .await
                    .map(|receipt| proof(receipt, path, amount_text, receiver))
            }
        }
    }

    /// approve first, then create; each confirmed before the next
    async fn pay_escrow(
        &self,
        token: Address,
        escrow: Address,
        transaction_id: &str,
        creator: Address,
        amount: U256,
    ) -> Result<TxReceipt, OrchestratorError> {
        let approval = confirm(
            PaymentStep::Approve,
            self.ledger.approve_token(token, escrow, amount).await,
        )?;
        debug!(tx_hash = %approval.tx_hash, "approval confirmed");
        confirm(
            PaymentStep::CreateEscrow,
            self.ledger
                .create_escrow_tx(escrow, transaction_id, creator, amount)
                .await,
        )
    }

    fn escrow_contract(&self, challenge: &PaymentChallenge) -> Result<Address, OrchestratorError> {
        match challenge.escrow_contract() {
            Some(address) => parse_address(address)
                .map_err(|e| malformed(format!("invalid escrow contract address: {}", e))),
            None => self
                .config
                .escrow_contract
                .ok_or_else(|| malformed("no escrow contract in challenge or configuration")),
        }
    }

    /// Pay `amount` of native currency to `recipient`, then hand the proof
    /// header to `retry` and return whatever it returns.
    pub async fn pay_and_retry<F, Fut, R>(
        &self,
        amount: &str,
        recipient: &str,
        retry: F,
    ) -> Result<R, OrchestratorError>
    where
        F: FnOnce(HashMap<String, String>) -> Fut,
        Fut: Future<Output = R>,
    {
        let span = info_span!("x402_pay_and_retry", operation_id = %Uuid::new_v4(), recipient);
        async move {
            let to = parse_address(recipient)
                .map_err(|e| malformed(format!("invalid recipient address: {}", e)))?;
            let value = payable_amount(amount, NATIVE_DECIMALS)?;
            info!(amount, %value, "paying native currency");
            let receipt = confirm(
                PaymentStep::NativeTransfer,
                self.ledger.send_native(to, value).await,
            )?;
            let headers = HashMap::from([(
                GENERIC_PAYMENT_PROOF_HEADER.to_string(),
                receipt.tx_hash.clone(),
            )]);
            debug!(tx_hash = %receipt.tx_hash, "invoking retry callback");
            Ok::<R, OrchestratorError>(retry(headers).await)
        }
        .instrument(span)
        .await
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn malformed(reason: impl Into<String>) -> OrchestratorError {
    OrchestratorError::MalformedChallenge(reason.into())
}

/// Scale `amount` to base units; zero is not a payment.
fn payable_amount(amount: &str, decimals: u32) -> Result<U256, OrchestratorError> {
    let value =
        scale_amount(amount, decimals).map_err(|e| malformed(format!("invalid amount: {}", e)))?;
    if value.is_zero() {
        return Err(malformed(format!("amount must be greater than zero: {}", amount)));
    }
    Ok(value)
}

/// A wrong chain is a configuration problem; anything else means the node
/// could not be used.
fn connect_error(err: LedgerError) -> OrchestratorError {
    match err {
        LedgerError::ChainMismatch { expected, actual } => {
            OrchestratorError::Configuration(ConfigError::ChainMismatch { expected, actual })
        }
        other => OrchestratorError::LedgerUnavailable(other),
    }
}

fn parse_challenge(response: &HttpResponse) -> Result<PaymentChallenge, OrchestratorError> {
    let challenge: PaymentChallenge = serde_json::from_str(&response.body)
        .map_err(|e| malformed(format!("402 body is not a payment challenge: {}", e)))?;
    debug!(?challenge, "payment challenge received");
    Ok(challenge)
}

/// Turn a ledger result into a confirmed receipt or a payment failure.
fn confirm(
    step: PaymentStep,
    result: Result<Option<TxReceipt>, LedgerError>,
) -> Result<TxReceipt, OrchestratorError> {
    let failed = |reason| OrchestratorError::PaymentFailed { step, reason };
    match result {
        Err(e) => Err(failed(PaymentFailure::Ledger(e))),
        Ok(None) => Err(failed(PaymentFailure::MissingReceipt)),
        Ok(Some(receipt)) if !receipt.is_success() => Err(failed(PaymentFailure::Reverted {
            tx_hash: receipt.tx_hash,
            status: receipt.status,
        })),
        Ok(Some(receipt)) => {
            debug!(%step, tx_hash = %receipt.tx_hash, block = ?receipt.block_number, "transaction confirmed");
            Ok(receipt)
        }
    }
}

fn proof(receipt: TxReceipt, path: PaymentPath, amount: String, payee: &str) -> PaymentProof {
    PaymentProof {
        tx_hash: receipt.tx_hash,
        path,
        amount,
        payee: payee.to_string(),
    }
}
