#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use x402_pay::config::{ConfigBuilder, ServiceConfig};
use x402_pay::core::PaymentOrchestrator;
use x402_pay::ledger::{LedgerClient, LedgerError};
use x402_pay::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use x402_pay::types::{TxReceipt, parse_address};

// anvil's first dev account
pub const PAYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TOKEN: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const RECEIVER: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595916Da2";
pub const ESCROW: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";
pub const DEFAULT_ESCROW: &str = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0";
pub const API_BASE: &str = "http://api.test";

pub fn addr(address: &str) -> Address {
    parse_address(address).expect("valid test address")
}

pub fn config() -> ServiceConfig {
    config_builder().build().expect("valid test config")
}

pub fn config_builder() -> ConfigBuilder {
    ConfigBuilder::new()
        .with_private_key(PAYER_KEY)
        .with_network("local")
        .with_token_address(TOKEN)
        .with_api_base_url(API_BASE)
}

/// Everything the orchestrator did, in order, across ledger and HTTP.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Http(HttpRequest),
    Transfer {
        token: Address,
        to: Address,
        amount: U256,
    },
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    CreateEscrow {
        escrow: Address,
        transaction_id: String,
        creator: Address,
        amount: U256,
    },
    Native {
        to: Address,
        amount: U256,
    },
}

impl Event {
    pub fn is_ledger(&self) -> bool {
        !matches!(self, Event::Http(_))
    }
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub type LedgerOutcome = Result<Option<TxReceipt>, LedgerError>;

pub fn confirmed(hash: &str) -> LedgerOutcome {
    Ok(Some(TxReceipt {
        tx_hash: hash.to_string(),
        status: Some(1),
        block_number: Some(1),
    }))
}

pub fn reverted(hash: &str) -> LedgerOutcome {
    Ok(Some(TxReceipt {
        tx_hash: hash.to_string(),
        status: Some(0),
        block_number: Some(1),
    }))
}

/// Ledger double answering from a script; unscripted calls confirm.
pub struct FakeLedger {
    log: EventLog,
    outcomes: Mutex<VecDeque<LedgerOutcome>>,
    counter: Mutex<u64>,
}

impl FakeLedger {
    pub fn new(log: EventLog, outcomes: Vec<LedgerOutcome>) -> Self {
        Self {
            log,
            outcomes: Mutex::new(outcomes.into()),
            counter: Mutex::new(0),
        }
    }

    fn record(&self, event: Event) -> LedgerOutcome {
        self.log.lock().unwrap().push(event);
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        let fallback = format!("0x{:064x}", *counter);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| confirmed(&fallback))
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    fn address(&self) -> Address {
        addr("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
    }

    async fn transfer_token(&self, token: Address, to: Address, amount: U256) -> LedgerOutcome {
        self.record(Event::Transfer { token, to, amount })
    }

    async fn approve_token(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> LedgerOutcome {
        self.record(Event::Approve {
            token,
            spender,
            amount,
        })
    }

    async fn create_escrow_tx(
        &self,
        escrow: Address,
        transaction_id: &str,
        creator: Address,
        amount: U256,
    ) -> LedgerOutcome {
        self.record(Event::CreateEscrow {
            escrow,
            transaction_id: transaction_id.to_string(),
            creator,
            amount,
        })
    }

    async fn send_native(&self, to: Address, amount: U256) -> LedgerOutcome {
        self.record(Event::Native { to, amount })
    }
}

/// Transport double replaying scripted responses in order.
pub struct FakeTransport {
    log: EventLog,
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
}

impl FakeTransport {
    pub fn new(log: EventLog, responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
        Self {
            log,
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.log.lock().unwrap().push(Event::Http(request.clone()));
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(TransportError::InvalidRequest(format!(
                "no scripted response for {}",
                request.url
            )))
        })
    }
}

pub fn respond(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(status, body))
}

pub fn unreachable(url: &str) -> Result<HttpResponse, TransportError> {
    Err(TransportError::RequestFailed {
        url: url.to_string(),
        message: "connection refused".to_string(),
    })
}

pub struct Harness {
    pub log: EventLog,
    pub orchestrator: PaymentOrchestrator,
}

impl Harness {
    pub fn new(
        responses: Vec<Result<HttpResponse, TransportError>>,
        outcomes: Vec<LedgerOutcome>,
    ) -> Self {
        Self::with_config(config(), responses, outcomes)
    }

    pub fn with_config(
        config: ServiceConfig,
        responses: Vec<Result<HttpResponse, TransportError>>,
        outcomes: Vec<LedgerOutcome>,
    ) -> Self {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let ledger = Arc::new(FakeLedger::new(log.clone(), outcomes));
        let transport = Arc::new(FakeTransport::new(log.clone(), responses));
        Self {
            log: log.clone(),
            orchestrator: PaymentOrchestrator::new(config, ledger, transport),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    pub fn ledger_events(&self) -> Vec<Event> {
        self.events().into_iter().filter(Event::is_ledger).collect()
    }

    pub fn http_requests(&self) -> Vec<HttpRequest> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Http(request) => Some(request),
                _ => None,
            })
            .collect()
    }
}
