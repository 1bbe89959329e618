//! Escrow orchestrator CLI.
//!
//! ```text
//!   keys (env) ──▶ orchestrator ──▶ submitter ──▶ RPC (primary, failover…)
//!                      │                              ▲
//!                      ▼                              │
//!                 state_dir/operation.json     scanner (read only)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, TxHash};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use escrow_orchestrator::blockchain::{ChainClient, EnvKeySource, KeySource, RpcChainClient, Role, Wallet};
use escrow_orchestrator::config::loader::load_or_default;
use escrow_orchestrator::disputes::{Decision, DisputeDesk, HttpDisputeLedger};
use escrow_orchestrator::observability::{logging, metrics};
use escrow_orchestrator::operations::Orchestrator;
use escrow_orchestrator::scanner::{RecordScanner, ScanEvent, ScanMode};
use escrow_orchestrator::storage::{CompletedIds, FileStore, COMPLETED_FILE, OPERATION_FILE};
use escrow_orchestrator::{EscrowConfig, EscrowError};

#[derive(Parser)]
#[command(name = "escrow-orchestrator")]
#[command(about = "Drive and inspect on-chain escrow deposits", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "escrow.toml")]
    config: PathBuf,

    /// Local identity that owns the persisted operation
    #[arg(short, long, default_value = "default")]
    identity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new escrow as buyer
    Create { seller: Address },
    /// Wait for a creation transaction and store the new escrow id
    ResolveId { tx_hash: TxHash },
    /// Deposit ETH into an escrow
    Fund { record_id: u64, amount_eth: String },
    /// Approve release as buyer
    Approve { record_id: u64 },
    /// Check whether the buyer approval landed
    Verify { record_id: u64 },
    /// Seller view of an escrow
    Status { record_id: u64 },
    /// Buyer view of an escrow
    BuyerStatus { record_id: u64 },
    /// Claim payment as seller
    Claim { record_id: u64 },
    /// Continue a pending escrow found by a dashboard scan
    Adopt { record_id: u64 },
    /// Show the persisted operation
    Resume,
    /// Discard the persisted operation
    Cancel,
    /// Discover escrows involving an address
    Scan {
        /// Defaults to the signing key's address
        #[arg(long)]
        address: Option<Address>,
        #[arg(long, value_enum, default_value_t = CliScanMode::Dashboard)]
        mode: CliScanMode,
    },
    /// Dispute desk
    Dispute {
        #[command(subcommand)]
        action: DisputeCommands,
    },
}

#[derive(Subcommand)]
enum DisputeCommands {
    Open {
        record_id: u64,
        #[arg(value_enum)]
        role: CliRole,
        reason: String,
    },
    List,
    Review { record_id: u64 },
    /// Platform ruling, signed with ESCROW_PLATFORM_KEY
    Resolve {
        record_id: u64,
        #[arg(value_enum)]
        decision: CliRole,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliScanMode {
    Dashboard,
    Movements,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliRole {
    Buyer,
    Seller,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Buyer => Role::Buyer,
            CliRole::Seller => Role::Seller,
        }
    }
}

impl From<CliRole> for Decision {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Buyer => Decision::Buyer,
            CliRole::Seller => Decision::Seller,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(&cli.config)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(identity = %cli.identity, "escrow-orchestrator v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(config.chain.clone()).await?);

    let state_dir = PathBuf::from(&config.storage.state_dir);
    let store = Arc::new(FileStore::open(state_dir.join(OPERATION_FILE))?);
    let completed = CompletedIds::new(Arc::new(FileStore::open(state_dir.join(COMPLETED_FILE))?));
    let orchestrator =
        Orchestrator::from_config(&cli.identity, chain.clone(), &config, store, completed.clone())?;

    let keys = EnvKeySource;
    run(cli.command, &cli.identity, &config, chain, orchestrator, completed, &keys).await
}

async fn run(
    command: Commands,
    identity: &str,
    config: &EscrowConfig,
    chain: Arc<dyn ChainClient>,
    orchestrator: Orchestrator,
    completed: CompletedIds,
    keys: &dyn KeySource,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Create { seller } => {
            let report = orchestrator.create_escrow(&keys.signing_key()?, seller).await?;
            print_json(&report)?;
        }
        Commands::ResolveId { tx_hash } => {
            let record_id = orchestrator.resolve_created_id(tx_hash).await?;
            println!("{}", record_id);
        }
        Commands::Fund {
            record_id,
            amount_eth,
        } => {
            let amount_wei = parse_ether(&amount_eth)
                .map_err(|e| EscrowError::InvalidInput(format!("Invalid amount '{}': {}", amount_eth, e)))?;
            let report = orchestrator
                .fund_escrow(&keys.signing_key()?, record_id, amount_wei)
                .await?;
            print_json(&report)?;
        }
        Commands::Approve { record_id } => {
            let report = orchestrator.approve_release(&keys.signing_key()?, record_id).await?;
            print_json(&report)?;
        }
        Commands::Verify { record_id } => {
            print_json(&orchestrator.verify_completion(record_id).await?)?;
        }
        Commands::Status { record_id } => {
            print_json(&orchestrator.check_status(record_id).await?)?;
        }
        Commands::BuyerStatus { record_id } => {
            print_json(&orchestrator.check_buyer_status(record_id).await?)?;
        }
        Commands::Claim { record_id } => {
            let tx_hash = orchestrator.claim(&keys.signing_key()?, record_id).await?;
            println!("{}", tx_hash);
        }
        Commands::Adopt { record_id } => {
            let report = orchestrator.adopt_record(&keys.signing_key()?, record_id).await?;
            print_json(&report)?;
        }
        Commands::Resume => match orchestrator.resume().await? {
            Some(state) => print_json(&state)?,
            None => println!("No operation in progress"),
        },
        Commands::Cancel => {
            orchestrator.cancel().await?;
            println!("Operation cancelled");
        }
        Commands::Scan { address, mode } => {
            let address = match address {
                Some(address) => address,
                None => Wallet::from_private_key(&keys.signing_key()?)?.address(),
            };
            let mode = match mode {
                CliScanMode::Dashboard => ScanMode::Dashboard,
                CliScanMode::Movements => ScanMode::Movements,
            };

            let scanner = RecordScanner::new(chain, &config.scanner).with_completed(completed);
            let mut handle = scanner.scan(identity, address, mode);
            while let Some(event) = handle.events.recv().await {
                match event {
                    ScanEvent::Progress { id } => eprintln!("… probed up to id {}", id),
                    ScanEvent::Found(result) => {
                        println!("{}", serde_json::to_string(&result)?);
                        if let Some(action) = result.pending_action() {
                            eprintln!("escrow {}: {:?}", result.id, action);
                        }
                    }
                    ScanEvent::Done => break,
                }
            }
            let summary = handle.task.await?;
            eprintln!(
                "Scan finished: {} probed, {} matched, stopped at id {}",
                summary.probed, summary.matched, summary.last_id
            );
        }
        Commands::Dispute { action } => {
            let ledger = HttpDisputeLedger::from_config(&config.disputes)?.ok_or_else(|| {
                EscrowError::InvalidInput("disputes.base_url is not configured".to_string())
            })?;
            let desk = DisputeDesk::new(chain, Arc::new(ledger), orchestrator);

            match action {
                DisputeCommands::Open {
                    record_id,
                    role,
                    reason,
                } => {
                    let caller = Wallet::from_private_key(&keys.signing_key()?)?.address();
                    let entry = desk
                        .open(identity, caller, record_id, role.into(), &reason)
                        .await?;
                    print_json(&entry)?;
                }
                DisputeCommands::List => print_json(&desk.list(identity).await?)?,
                DisputeCommands::Review { record_id } => {
                    desk.request_review(record_id).await?;
                    println!("Review requested for escrow {}", record_id);
                }
                DisputeCommands::Resolve {
                    record_id,
                    decision,
                } => {
                    let tx_hash = desk
                        .resolve(&keys.platform_key()?, record_id, decision.into())
                        .await?;
                    println!("{}", tx_hash);
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
