//! x402-pay CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use serde_json::Value;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use x402_pay::core::{ErrorKind, OrchestratorError, PaymentOrchestrator, RequestStage};
use x402_pay::transport::http::ReqwestTransport;
use x402_pay::transport::{HttpRequest, HttpTransport};
use x402_pay::types::{GENERIC_PAYMENT_PROOF_HEADER, HttpMethod};

#[derive(Debug, Error)]
enum Failure {
    #[error(transparent)]
    Operation(#[from] OrchestratorError),
    #[error("operation timed out after {0}s")]
    Timeout(u64),
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Failure::Timeout(_) => 9,
            Failure::Operation(err) => match err.kind() {
                ErrorKind::Configuration => 2,
                ErrorKind::LedgerUnavailable => 8,
                ErrorKind::Transport => 3,
                ErrorKind::UnexpectedStatus => 4,
                ErrorKind::MalformedChallenge => 5,
                ErrorKind::PaymentFailed => 6,
                ErrorKind::RetryRejected => 7,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("x402-pay v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(body) => {
            println!("{:#}", body);
            ExitCode::SUCCESS
        }
        Err(failure) => {
            if let Failure::Operation(err) = &failure {
                if err.funds_may_be_spent() {
                    warn!(tx_hash = ?err.payment_tx_hash(), "payment may have been made without content");
                }
            }
            error!("{}", failure);
            eprintln!("error: {}", failure);
            ExitCode::from(failure.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<Value, Failure> {
    let builder = cli.config_builder().map_err(OrchestratorError::from)?;
    let orchestrator = PaymentOrchestrator::connect_from(builder).await?;
    info!(
        network = %orchestrator.config().display_name,
        payer = ?orchestrator.payer_address(),
        api = %orchestrator.config().api_base_url,
        "connected"
    );
    let operation = execute(&orchestrator, cli.command);
    let body = match cli.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), operation)
            .await
            .map_err(|_| Failure::Timeout(secs))??,
        None => operation.await?,
    };
    Ok(body)
}

async fn execute(
    orchestrator: &PaymentOrchestrator,
    command: Command,
) -> Result<Value, OrchestratorError> {
    match command {
        Command::Resource { slug } => orchestrator.fetch_protected_resource(&slug).await,
        Command::ResourceEscrow { slug } => {
            orchestrator.fetch_protected_resource_escrow(&slug).await
        }
        Command::Agent { agent, message } => {
            orchestrator.fetch_agent_reply(&agent, &message).await
        }
        Command::AgentEscrow { agent, message } => {
            orchestrator.fetch_agent_reply_escrow(&agent, &message).await
        }
        Command::Pay {
            amount,
            recipient,
            url,
        } => {
            let transport = ReqwestTransport::new();
            let transport = &transport;
            let (tx_hash, result) = orchestrator
                .pay_and_retry(&amount, &recipient, |headers| async move {
                    let tx_hash = headers
                        .get(GENERIC_PAYMENT_PROOF_HEADER)
                        .cloned()
                        .unwrap_or_default();
                    let request = headers
                        .iter()
                        .fold(HttpRequest::new(HttpMethod::Get, &url), |req, (k, v)| {
                            req.with_header(k, v)
                        });
                    (tx_hash, transport.send(request).await)
                })
                .await?;
            let response = result.map_err(|source| OrchestratorError::Transport {
                stage: RequestStage::Retry,
                tx_hash: Some(tx_hash.clone()),
                source,
            })?;
            if !response.is_success() {
                return Err(OrchestratorError::RetryRejected {
                    status: response.status,
                    body: response.body,
                    tx_hash,
                });
            }
            Ok(response.json_body())
        }
    }
}
