//! Gateway CLI Application
//!
//! A command-line interface for creating gateways, approving and executing
//! requests, and serving the REST API.

use clap::{Parser, Subcommand};
use multisig_gateway::api::{create_router, ApiState};
use multisig_gateway::cli::{self, AppState, DescriptorArgs};
use multisig_gateway::storage::{Storage, StorageConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gateway")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A threshold-authorization gateway: M-of-N owners approve, anyone executes", long_about = None)]
struct Cli {
    /// Data directory for gateway storage
    #[arg(short, long, default_value = ".gateway_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair
    Keygen,

    /// Sign a request hash for the HTTP approve endpoint
    Sign {
        /// Owner private key (hex)
        #[arg(short, long)]
        key: String,

        /// Request hash (from `hash`)
        #[arg(long)]
        hash: String,
    },

    /// Create a new gateway
    Init {
        /// Gateway name
        #[arg(short, long)]
        name: String,

        /// Owner addresses (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        owners: Vec<String>,

        /// Approvals required to execute
        #[arg(short, long)]
        threshold: usize,

        /// Network discriminator
        #[arg(long)]
        chain_id: Option<u64>,

        /// Label for address derivation (defaults to the name)
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Show gateway owners, threshold, nonce and pending approvals
    Status {
        #[arg(short, long)]
        name: String,
    },

    /// Compute the hash owners must approve
    Hash {
        #[arg(short, long)]
        name: String,

        /// Nonce to hash at (defaults to current)
        #[arg(long)]
        nonce: Option<u64>,

        #[command(flatten)]
        call: DescriptorArgs,
    },

    /// Approve a request as an owner
    Approve {
        #[arg(short, long)]
        name: String,

        /// Owner private key (hex)
        #[arg(short, long)]
        key: String,

        /// Nonce to approve at (defaults to current)
        #[arg(long)]
        nonce: Option<u64>,

        /// Hash the owner expects; approval fails if it does not match
        #[arg(long)]
        hash: Option<String>,

        #[command(flatten)]
        call: DescriptorArgs,
    },

    /// Execute an approved request
    Execute {
        #[arg(short, long)]
        name: String,

        /// Address triggering the execution
        #[arg(long)]
        caller: String,

        #[command(flatten)]
        call: DescriptorArgs,
    },

    /// Token operations
    Token {
        #[command(subcommand)]
        action: TokenCommands,
    },

    /// REST API server
    Api {
        #[command(subcommand)]
        action: ApiCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Deploy a managed token
    Deploy {
        /// Token name
        #[arg(long)]
        name: String,

        /// Token symbol
        #[arg(long)]
        symbol: String,

        #[arg(long, default_value = "18")]
        decimals: u8,

        /// Deployer address
        #[arg(long)]
        creator: String,

        /// Admin role holder (gateway name or address)
        #[arg(long)]
        admin: String,

        /// Compliance role holder (gateway name or address)
        #[arg(long)]
        compliance: String,
    },

    /// Show token info
    Info {
        #[arg(short, long)]
        address: String,
    },

    /// Show a holder's balance
    Balance {
        #[arg(short, long)]
        address: String,

        /// Holder (gateway name or address)
        #[arg(long)]
        holder: String,
    },
}

#[derive(Subcommand)]
enum ApiCommands {
    /// Start the REST API server
    Start {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Commands that don't need loaded state
    match &cli.command {
        Commands::Keygen => return cli::cmd_keygen(),
        Commands::Sign { key, hash } => return cli::cmd_sign(key, hash).map(|_| ()),
        Commands::Init {
            name,
            owners,
            threshold,
            chain_id,
            label,
        } => {
            return cli::cmd_init(
                &cli.data_dir,
                name,
                owners,
                *threshold,
                *chain_id,
                label.as_deref(),
            )
        }
        Commands::Api { action } => return run_api_command(action, &cli.data_dir),
        _ => {}
    }

    let mut state = AppState::new(cli.data_dir.clone())?;

    match cli.command {
        Commands::Keygen | Commands::Sign { .. } | Commands::Init { .. } | Commands::Api { .. } => {
            unreachable!()
        }
        Commands::Status { name } => cli::cmd_status(&state, &name)?,
        Commands::Hash { name, nonce, call } => cli::cmd_hash(&state, &name, &call, nonce)?,
        Commands::Approve {
            name,
            key,
            nonce,
            hash,
            call,
        } => cli::cmd_approve(&state, &name, &key, &call, nonce, hash.as_deref())?,
        Commands::Execute { name, caller, call } => {
            cli::cmd_execute(&mut state, &name, &caller, &call)?
        }
        Commands::Token { action } => match action {
            TokenCommands::Deploy {
                name,
                symbol,
                decimals,
                creator,
                admin,
                compliance,
            } => cli::cmd_token_deploy(
                &mut state,
                &name,
                &symbol,
                decimals,
                &creator,
                &admin,
                &compliance,
            )?,
            TokenCommands::Info { address } => cli::cmd_token_info(&state, &address)?,
            TokenCommands::Balance { address, holder } => {
                cli::cmd_token_balance(&state, &address, &holder)?
            }
        },
    }

    Ok(())
}

fn run_api_command(action: &ApiCommands, data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match action {
            ApiCommands::Start { port } => {
                let storage = Storage::new(StorageConfig {
                    data_dir: data_dir.to_path_buf(),
                    ..Default::default()
                })?;
                // Held until the server exits; CLI writers wait for it
                let _lock = storage.try_lock()?;

                println!("📂 Loading gateways from {:?}...", data_dir);
                let gateways: HashMap<_, _> = storage.load_all_gateways()?.into_iter().collect();
                let tokens = storage.load_tokens()?;
                println!(
                    "   {} gateway(s), {} token(s)",
                    gateways.len(),
                    tokens.count()
                );

                let state = ApiState::new(gateways, tokens, storage);
                let app = create_router(state);

                let addr = format!("0.0.0.0:{}", port);
                println!("🌐 API server listening on http://{}", addr);
                println!("   WebSocket: ws://{}/ws", addr);

                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
