//! Oraichain ⇄ XRPL Bridge Relayer
//!
//! `orai-xrpl-relayer` without a subcommand runs the relay loop and the API
//! server. The other subcommands are one-shot operator tools; owner actions
//! are rejected by the contract unless the configured key owns the bridge.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cosmwasm_std::Uint128;
use eyre::{eyre, Result, WrapErr};
use tendermint_rpc::{Client, HttpClient, Url};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use xrpl_relayer::api::{self, RelayerStats};
use xrpl_relayer::config::Config;
use xrpl_relayer::contract_client::{BridgeContract, ContractClient};
use xrpl_relayer::contracts::Relayer;
use xrpl_relayer::evidence::EvidenceReporter;
use xrpl_relayer::operations::OperationRelayer;
use xrpl_relayer::relay_loop::{BridgeMonitorAction, ClaimFeesAction, RelayAction, RelayLoop};
use xrpl_relayer::retry::RetryConfig;
use xrpl_relayer::xrpl::fee::MAX_ALLOWED_XRPL_SIGNERS;
use xrpl_relayer::xrpl::memo::encode_bridge_memo;
use xrpl_relayer::xrpl::{
    LedgerScanner, Wallet, XrplApi, XrplRpcClient, MAX_TICKETS_TO_ALLOCATE, XRPL_ISSUED_DECIMALS,
};

#[derive(Parser, Debug)]
#[command(name = "orai-xrpl-relayer")]
#[command(about = "Relayer for the Oraichain <-> XRPL bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Environment file read before the process environment
    #[arg(long, global = true, default_value = ".env")]
    env_file: String,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run the relay loop and the API server (default)
    Start,

    /// Print this relayer's contract-chain and XRPL addresses
    Address,

    /// Print bridge state, tickets, pending operations and collected fees
    Status,

    /// Print the memo data to attach to a payment towards the bridge
    Memo {
        /// Contract-chain address credited with the payment
        recipient: String,

        /// Free text forwarded with the transfer
        #[arg(long, default_value = "")]
        text: String,
    },

    /// Claim collected relayer fees
    ClaimFees {
        /// Per-denom amount below which fees are left to accrue
        #[arg(long, default_value_t = 0)]
        min_amount: u128,
    },

    /// Halt the bridge (owner only)
    Halt,

    /// Resume a halted bridge (owner only)
    Resume,

    /// Allocate tickets again from an account sequence (owner only)
    RecoverTickets {
        #[arg(long)]
        account_sequence: u32,

        /// Number of tickets, the contract's default when omitted
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_TICKETS_TO_ALLOCATE as i64))]
        count: Option<u32>,
    },

    /// Set the XRPL base fee used for new operations (owner only)
    UpdateBaseFee {
        /// Base fee in drops
        #[arg(long)]
        drops: u64,
    },

    /// Register an XRPL-issued token (owner only)
    RegisterToken {
        #[arg(long)]
        issuer: String,

        #[arg(long)]
        currency: String,

        /// Decimal places kept when bridging, may be negative
        #[arg(
            long,
            allow_negative_numbers = true,
            value_parser = clap::value_parser!(i32)
                .range(-(XRPL_ISSUED_DECIMALS as i64)..=XRPL_ISSUED_DECIMALS as i64)
        )]
        sending_precision: i32,

        #[arg(long)]
        max_holding_amount: u128,

        #[arg(long, default_value_t = 0)]
        bridging_fee: u128,
    },

    /// Replace the relayer set (owner only)
    RotateKeys {
        /// Signatures required by the new signer list
        #[arg(long)]
        threshold: u32,

        /// JSON array of relayers (`cosmos_address`, `xrpl_address`, `xrpl_pub_key`)
        #[arg(long)]
        relayers: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging();

    let command = cli.command.unwrap_or(Command::Start);
    if let Command::Memo { recipient, text } = &command {
        println!("{}", encode_bridge_memo(recipient, text).memo.memo_data);
        return Ok(());
    }

    let config = Config::load_from_file(&cli.env_file)?;
    info!(
        chain_id = %config.contract.chain_id,
        contract = %config.contract.contract_address,
        bridge = %config.xrpl.bridge_address,
        "Configuration loaded"
    );

    let client = Arc::new(ContractClient::new(&config.contract)?);
    let contract: Arc<dyn BridgeContract> = client.clone();

    match command {
        Command::Start => run_relayer(config, contract).await,
        Command::Memo { .. } => Ok(()),
        Command::Address => {
            let wallet = Wallet::from_seed(&config.xrpl.seed)?;
            println!("contract relayer address: {}", contract.relayer_address());
            println!("xrpl relayer address:     {}", wallet.address);
            println!("xrpl relayer public key:  {}", wallet.public_key());
            Ok(())
        }
        Command::Status => print_status(contract.as_ref()).await,
        Command::ClaimFees { min_amount } => ClaimFeesAction::new(contract, min_amount).run().await,
        Command::Halt => {
            let txhash = contract.halt_bridge().await?;
            info!(txhash = %txhash, "Bridge halted");
            Ok(())
        }
        Command::Resume => {
            let txhash = contract.resume_bridge().await?;
            info!(txhash = %txhash, "Bridge resumed");
            Ok(())
        }
        Command::RecoverTickets {
            account_sequence,
            count,
        } => {
            let txhash = contract.recover_tickets(account_sequence, count).await?;
            info!(
                account_sequence,
                number_of_tickets = ?count,
                txhash = %txhash,
                "Ticket recovery requested"
            );
            Ok(())
        }
        Command::UpdateBaseFee { drops } => {
            let txhash = contract.update_xrpl_base_fee(drops).await?;
            info!(xrpl_base_fee = drops, txhash = %txhash, "XRPL base fee updated");
            Ok(())
        }
        Command::RegisterToken {
            issuer,
            currency,
            sending_precision,
            max_holding_amount,
            bridging_fee,
        } => {
            let txhash = client
                .register_xrpl_token(
                    &issuer,
                    &currency,
                    sending_precision,
                    Uint128::new(max_holding_amount),
                    Uint128::new(bridging_fee),
                )
                .await?;
            info!(issuer = %issuer, currency = %currency, txhash = %txhash, "XRPL token registered");
            Ok(())
        }
        Command::RotateKeys {
            threshold,
            relayers,
        } => {
            let raw = std::fs::read_to_string(&relayers)
                .wrap_err_with(|| format!("Failed to read relayers file {}", relayers.display()))?;
            let relayers: Vec<Relayer> =
                serde_json::from_str(&raw).wrap_err("Invalid relayers file")?;
            validate_rotation(threshold, &relayers)?;

            let txhash = client.rotate_keys(relayers, threshold).await?;
            info!(threshold, txhash = %txhash, "Key rotation requested");
            Ok(())
        }
    }
}

/// The new signer list must fit on XRPL and its quorum must be reachable
fn validate_rotation(threshold: u32, relayers: &[Relayer]) -> Result<()> {
    if relayers.len() as u64 > MAX_ALLOWED_XRPL_SIGNERS {
        return Err(eyre!(
            "At most {} relayers fit in a signer list",
            MAX_ALLOWED_XRPL_SIGNERS
        ));
    }
    if threshold == 0 || threshold as usize > relayers.len() {
        return Err(eyre!(
            "Threshold {} is invalid for {} relayers",
            threshold,
            relayers.len()
        ));
    }
    Ok(())
}

async fn print_status(contract: &dyn BridgeContract) -> Result<()> {
    let (state, tickets, operations, fees) = futures::try_join!(
        contract.bridge_state(),
        contract.available_tickets(),
        contract.all_pending_operations(),
        contract.fees_collected(contract.relayer_address()),
    )?;

    println!("bridge state:       {:?}", state);
    println!("available tickets:  {}", tickets.len());
    println!("pending operations: {}", operations.len());
    for operation in &operations {
        println!(
            "  {} v{} {} ({} signatures)",
            operation.id,
            operation.version,
            operation.operation_type.name(),
            operation.signatures.len()
        );
    }
    let fees = fees
        .iter()
        .map(|coin| coin.to_string())
        .collect::<Vec<_>>()
        .join(",");
    println!("collected fees:     {}", if fees.is_empty() { "none" } else { fees.as_str() });
    Ok(())
}

async fn run_relayer(config: Config, contract: Arc<dyn BridgeContract>) -> Result<()> {
    info!("Starting Oraichain XRPL bridge relayer");

    verify_chain_id(&config.contract.rpc_url, &config.contract.chain_id).await?;

    let wallet = Arc::new(Wallet::from_seed(&config.xrpl.seed)?);
    let xrpl: Arc<dyn XrplApi> = Arc::new(XrplRpcClient::new(&config.xrpl.rpc_url)?);
    let bridge = config.xrpl.bridge_address.as_str();

    let contract_config = contract.config().await.wrap_err("Failed to query contract config")?;
    if !contract_config
        .relayers
        .iter()
        .any(|r| r.cosmos_address == contract.relayer_address())
    {
        warn!(
            relayer = %contract.relayer_address(),
            "This address is not a registered relayer, its signatures and evidence will be rejected"
        );
    }
    if contract_config.bridge_xrpl_address != bridge {
        return Err(eyre!(
            "Configured bridge address {} does not match the contract's {}",
            bridge,
            contract_config.bridge_xrpl_address
        ));
    }

    info!(
        relayer = %contract.relayer_address(),
        xrpl_address = %wallet.address,
        evidence_threshold = contract_config.evidence_threshold,
        relayers = contract_config.relayers.len(),
        "Relayer initialized"
    );

    let stats = Arc::new(RwLock::new(RelayerStats::new(
        contract.relayer_address(),
        &wallet.address,
        bridge,
    )));

    let scanner = LedgerScanner::new(xrpl.clone(), bridge, config.xrpl.start_ledger);
    let retry = RetryConfig::new(
        config.relayer.evidence_retry_attempts,
        config.relayer.retry_delay(),
    );
    let evidence = EvidenceReporter::new(contract.clone(), scanner, bridge, retry);
    let operations = OperationRelayer::new(contract.clone(), xrpl.clone(), wallet.clone(), bridge);

    let mut relay_loop = RelayLoop::new(
        evidence,
        operations,
        xrpl,
        stats.clone(),
        config.relayer.poll_interval(),
    );
    relay_loop = relay_loop.with_action(Box::new(BridgeMonitorAction::new(
        contract.clone(),
        stats.clone(),
        config.relayer.tickets_warning_threshold,
    )));
    if config.fees.enabled {
        relay_loop = relay_loop.with_action(Box::new(ClaimFeesAction::new(
            contract.clone(),
            config.fees.min_amount,
        )));
    }

    let api_config = config.api.clone();
    let api_stats = stats.clone();
    tokio::spawn(async move {
        if let Err(e) =
            api::start_server(&api_config.bind_address, api_config.port, api_stats).await
        {
            error!(error = %e, "API server error");
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    relay_loop.run(shutdown_rx).await?;

    info!("Oraichain XRPL bridge relayer stopped");
    Ok(())
}

/// Refuse to sign for a node that serves another chain
async fn verify_chain_id(rpc_url: &str, chain_id: &str) -> Result<()> {
    let url: Url = rpc_url.parse().wrap_err("Failed to parse RPC URL")?;
    let client = HttpClient::new(url).wrap_err("Failed to create RPC client")?;
    let status = client
        .status()
        .await
        .wrap_err("Failed to query node status")?;

    let network = status.node_info.network.to_string();
    if network != chain_id {
        return Err(eyre!(
            "RPC node serves chain {}, expected {}",
            network,
            chain_id
        ));
    }
    info!(chain_id = %network, height = %status.sync_info.latest_block_height, "Connected to contract chain");
    Ok(())
}

/// Initialize tracing; `LOG_FORMAT=json` switches to JSON lines
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,xrpl_relayer=debug"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("orai-xrpl-relayer").chain(args.iter().copied()))
    }

    fn relayer(n: u8) -> Relayer {
        Relayer {
            cosmos_address: format!("orai1relayer{}", n),
            xrpl_address: format!("rRelayer{}", n),
            xrpl_pub_key: format!("02{:02X}", n),
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_is_the_default() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.env_file, ".env");

        let cli = parse(&["start", "--env-file", "relayer.env"]).unwrap();
        assert_eq!(cli.command, Some(Command::Start));
        assert_eq!(cli.env_file, "relayer.env");
    }

    #[test]
    fn test_register_token_arguments() {
        let cli = parse(&[
            "register-token",
            "--issuer",
            "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh",
            "--currency",
            "OCH",
            "--sending-precision",
            "-6",
            "--max-holding-amount",
            "1000000000000",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::RegisterToken {
                issuer: "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh".to_string(),
                currency: "OCH".to_string(),
                sending_precision: -6,
                max_holding_amount: 1_000_000_000_000,
                bridging_fee: 0,
            })
        );

        assert!(parse(&[
            "register-token",
            "--issuer",
            "rIssuer",
            "--currency",
            "OCH",
            "--sending-precision",
            "16",
            "--max-holding-amount",
            "1",
        ])
        .is_err());
        assert!(parse(&["register-token", "--issuer", "rIssuer"]).is_err());
    }

    #[test]
    fn test_recover_tickets_count_bounds() {
        let cli = parse(&["recover-tickets", "--account-sequence", "7"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::RecoverTickets {
                account_sequence: 7,
                count: None
            })
        );

        assert!(parse(&["recover-tickets", "--account-sequence", "7", "--count", "250"]).is_ok());
        assert!(parse(&["recover-tickets", "--account-sequence", "7", "--count", "0"]).is_err());
        assert!(parse(&["recover-tickets", "--account-sequence", "7", "--count", "251"]).is_err());
    }

    #[test]
    fn test_memo_command() {
        let cli = parse(&["memo", "orai1recipient", "--text", "invoice 42"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Memo {
                recipient: "orai1recipient".to_string(),
                text: "invoice 42".to_string(),
            })
        );
    }

    #[test]
    fn test_rotation_validation() {
        let relayers: Vec<Relayer> = (1..=3).map(relayer).collect();
        assert!(validate_rotation(2, &relayers).is_ok());
        assert!(validate_rotation(3, &relayers).is_ok());
        assert!(validate_rotation(0, &relayers).is_err());
        assert!(validate_rotation(4, &relayers).is_err());

        let too_many: Vec<Relayer> = (1..=33).map(relayer).collect();
        assert!(validate_rotation(2, &too_many).is_err());
    }
}
