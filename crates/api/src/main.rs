//! vigild - video evidence recording and verification service
//!
//! Records SHA-256 hashes of video files to an on-chain EvidenceRegistry,
//! mirrors them into a local SQLite database, and serves verification and
//! listing queries over HTTP.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use vigil_core::VideoHash;
use vigil_ledger::{EvidenceRegistryClient, LedgerClient, PrivateKeySigner};
use vigil_service::{Config, Storage, VerificationEngine, VerificationOutcome};

#[derive(Parser)]
#[command(name = "vigild")]
#[command(version, about = "Video evidence recording and verification service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vigil.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Run {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },

    /// Initialize the mirror database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://vigil.db")]
        database_url: String,
    },

    /// Verify a video file (or a pre-computed hash) against the ledger
    Verify {
        /// Path to the video file
        #[arg(conflicts_with = "hash")]
        file: Option<PathBuf>,

        /// Pre-computed 0x-prefixed SHA-256 hash
        #[arg(long)]
        hash: Option<String>,
    },

    /// Show mirror statistics and ledger connectivity
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug)?;

    match cli.command.unwrap_or(Commands::Run { port: 8080 }) {
        Commands::Run { port } => run_service(&cli.config, port).await?,
        Commands::InitDb { database_url } => init_database(&database_url).await?,
        Commands::Verify { file, hash } => verify_evidence(&cli.config, file, hash).await?,
        Commands::Status => show_status(&cli.config).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("vigil_api=debug,vigil_service=debug,vigil_ledger=debug,tower_http=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("vigil_api=info,vigil_service=info,vigil_ledger=info,tower_http=info")
        })
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .init();

    Ok(())
}

async fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Build the registry client; with a signing identity when one is
/// configured, read-only otherwise.
fn build_ledger(config: &Config) -> Result<Arc<dyn LedgerClient>> {
    let client = match config.submitter_private_key_with_prefix() {
        Some(key) => {
            let signer = key
                .trim_start_matches("0x")
                .parse::<PrivateKeySigner>()
                .context("Failed to parse submitter private key")?;
            EvidenceRegistryClient::with_signer(
                &config.network.rpc_url,
                config.contracts.evidence_registry,
                signer,
                Duration::from_secs(config.submitter.submit_timeout_secs),
            )?
        }
        None => {
            info!("No submitter key configured, ledger writes disabled");
            EvidenceRegistryClient::read_only(
                &config.network.rpc_url,
                config.contracts.evidence_registry,
            )?
        }
    };

    Ok(Arc::new(client))
}

async fn run_service(config_path: &str, port: u16) -> Result<()> {
    info!("vigild starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Chain ID: {}", config.network.chain_id);
    info!("  RPC URL: {}", config.network.rpc_url);
    info!("  Registry: {}", config.contracts.evidence_registry);
    info!("  Database: {}", config.database.url);

    let storage = open_storage(&config).await?;
    let ledger = build_ledger(&config)?;

    if ledger.can_submit() {
        info!("Submitter configured, recording enabled");
    }

    vigil_api::serve(ledger, storage, port).await
}

async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Pending: {}", stats.pending);
    info!("  Confirmed: {}", stats.confirmed);
    info!("  Failed: {}", stats.failed);

    storage.close().await;

    Ok(())
}

async fn verify_evidence(
    config_path: &str,
    file: Option<PathBuf>,
    hash: Option<String>,
) -> Result<()> {
    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    let hash = match (file, hash) {
        (Some(path), None) => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            vigil_core::content_hash(&bytes)
        }
        (None, Some(raw)) => {
            VideoHash::from_str(&raw).map_err(|e| anyhow::anyhow!("Invalid hash: {}", e))?
        }
        _ => anyhow::bail!("Provide either a file path or --hash"),
    };

    let storage = open_storage(&config).await?;
    let ledger = build_ledger(&config)?;
    let engine = VerificationEngine::new(ledger, storage.clone());

    let outcome = engine.verify_hash(hash).await?;

    println!("\n=== Evidence Verification ===\n");
    println!("Hash: {}", hash);
    match outcome {
        VerificationOutcome::Verified {
            evidence,
            source,
            degraded,
        } => {
            println!("Verified: yes (source: {})", source);
            if degraded {
                println!("WARNING: ledger unreachable, answer served from the local mirror");
            }
            println!("  Camera: {}", evidence.camera_id);
            println!("  Captured at: {}", evidence.captured_at);
            println!("  Sequence: {}", evidence.sequence_number);
            println!("  Committed at: {}", evidence.commit_time);
            println!("  Submitter: {}", evidence.submitter);
        }
        VerificationOutcome::NotVerified { reason } => {
            println!("Verified: no ({})", reason.as_str());
        }
    }
    println!();

    storage.close().await;

    Ok(())
}

async fn show_status(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path).context("Failed to load configuration")?;

    let storage = open_storage(&config).await?;
    let ledger = build_ledger(&config)?;

    let stats = storage.stats().await?;

    println!("\n=== Vigil Status ===\n");
    println!("Mirror ({}):", config.database.url);
    println!("  Pending: {}", stats.pending);
    println!("  Confirmed: {}", stats.confirmed);
    println!("  Failed: {}", stats.failed);

    match ledger.count().await {
        Ok(total) => println!("\nLedger: reachable, {} records", total),
        Err(e) => println!("\nLedger: unreachable ({})", e),
    }

    println!(
        "\nRecording: {}",
        if ledger.can_submit() {
            "enabled"
        } else {
            "disabled (no submitter key)"
        }
    );
    println!();

    storage.close().await;

    Ok(())
}
