//! Client side of the x402 pay-per-request protocol.
//!
//! A request that comes back `402 Payment Required` is paid on chain, by direct
//! token transfer or through an escrow contract, and retried with the
//! transaction hash in the `x-payment-tx` header.

pub mod config;
pub mod core;
pub mod ledger;
pub mod transport;
pub mod types;

pub use crate::config::{ConfigBuilder, ConfigError, NetworkRegistry, ServiceConfig};
pub use crate::core::{
    ErrorKind, FlowOutcome, OrchestratorError, PaymentFlow, PaymentOrchestrator,
};
pub use crate::ledger::{LedgerClient, LedgerError};
pub use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
pub use crate::types::{Network, NetworkProfile, PaymentChallenge, PaymentPath, PaymentProof};
