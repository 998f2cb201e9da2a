use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use delta_core::{ApiKey, DealRequest, MinerAddress};
use delta_engine::{DealSubmission, Upload};
use delta_node::config::DeltaConfig;
use delta_node::{Node, build_engine, state_factory, telemetry};
use delta_provider::{DigestPieceDeriver, FsContentStore};
use tracing::info;

/// Delta deal-lifecycle node.
#[derive(Parser, Debug)]
#[command(name = "delta", about = "Deal-lifecycle orchestration node")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "delta.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run database migrations for the configured deal store, then exit.
    Migrate,
    /// Print the piece commitment of a local file.
    Commp {
        /// File to digest.
        file: PathBuf,
    },
    /// Store a file locally and submit it for an end-to-end deal.
    Submit {
        file: PathBuf,
        /// Storage provider to propose to.
        #[arg(long)]
        miner: String,
        /// API key recorded as the requester.
        #[arg(long, default_value = "local")]
        api_key: String,
        /// Deal term in days.
        #[arg(long)]
        duration_in_days: Option<i64>,
        /// Days until the deal must start.
        #[arg(long)]
        start_epoch_in_days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = DeltaConfig::load(&cli.config)?;
    telemetry::init(&config.logging);

    if !cli.config.exists() {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Some(Commands::Migrate) => run_migrate(&config).await,
        Some(Commands::Commp { file }) => run_commp(&file).await,
        Some(Commands::Submit {
            file,
            miner,
            api_key,
            duration_in_days,
            start_epoch_in_days,
        }) => {
            let request = DealRequest {
                miner: Some(MinerAddress::new(miner)),
                duration_in_days,
                start_epoch_in_days,
                ..DealRequest::default()
            };
            run_submit(&config, &file, request, ApiKey::new(api_key)).await
        }
        None => run_node(&config).await,
    }
}

/// Run the `migrate` subcommand: initialize the deal store schema and exit.
async fn run_migrate(config: &DeltaConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(backend = %config.state.backend, "running deal store migrations...");
    let _store = state_factory::create_store(&config.state).await?;
    info!(backend = %config.state.backend, "deal store migrations complete");
    Ok(())
}

/// Run the `commp` subcommand: digest a file and print its commitment.
async fn run_commp(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let reader = tokio::fs::File::open(file).await?;
    let derived = DigestPieceDeriver::new().digest_reader(reader).await?;
    let output = serde_json::json!({
        "file": file.display().to_string(),
        "piece": derived.piece,
        "payload_size": derived.payload_size,
        "padded_piece_size": derived.padded_piece_size,
        "unpadded_piece_size": derived.unpadded_piece_size,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Run the `submit` subcommand: store the file, submit it and drain the
/// resulting jobs once.
async fn run_submit(
    config: &DeltaConfig,
    file: &Path,
    request: DealRequest,
    api_key: ApiKey,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = Bytes::from(tokio::fs::read(file).await?);
    let size = data.len() as u64;
    let address = FsContentStore::new(config.content_store.path.clone())
        .put(data)
        .await?;
    let name = file
        .file_name()
        .map_or_else(|| address.to_string(), |n| n.to_string_lossy().into_owned());

    let engine = build_engine(config).await?;
    let submitted = engine
        .submit(DealSubmission {
            request,
            api_key,
            upload: Some(Upload {
                name,
                address,
                size,
            }),
        })
        .await?;
    engine.run_pending().await;

    let report = engine.content_status(submitted.content.id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Run the node until SIGINT or SIGTERM.
async fn run_node(config: &DeltaConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(build_engine(config).await?);
    let scheduler = config
        .scheduler
        .enabled
        .then(|| config.scheduler.scheduler_config(config.dispatcher.max_cleanup_workers));

    let handle = Node::start(engine, scheduler)?;
    info!(
        backend = %config.state.backend,
        content_store = %config.content_store.path.display(),
        "delta node running"
    );

    shutdown_signal().await;
    handle.shutdown().await;
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
