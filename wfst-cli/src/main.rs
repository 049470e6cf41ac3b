mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use wfst::{CancelToken, ClientConfig, WfsClient};

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    /// TOML client configuration; without it `WFST_*` environment variables apply
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the backend API base URL
    #[clap(long, global = true)]
    api_base: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the layers the backend exposes
    Layers {
        #[clap(short, long, value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Show the picker metadata of one layer
    Meta { id: String },
    /// Read features from a layer as a canonical collection
    Read {
        id: String,
        #[clap(long)]
        srs: Option<String>,
        #[clap(long)]
        wfs_version: Option<String>,
        #[clap(short, long)]
        max_features: Option<u32>,
        #[clap(long)]
        bbox: Option<String>,
        #[clap(long)]
        filter: Option<String>,
        #[clap(long)]
        cql_filter: Option<String>,
        #[clap(long)]
        output_format: Option<String>,
    },
    /// Post inserts, updates and deletes from a JSON request file
    Commit {
        id: String,
        request: PathBuf,
        /// Print the Transaction document instead of posting it
        #[clap(long)]
        dry_run: bool,
    },
    /// Classify a saved TransactionResponse without contacting a server
    Classify { response: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    let mut config = load_config(args.config.as_ref())?;
    if let Some(api_base) = args.api_base {
        config.api_base = api_base;
    }

    let client = WfsClient::new(config).context("Failed to create WFS client")?;
    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    match args.command {
        Commands::Layers { fields } => commands::layers(&client, &fields, &cancel).await,
        Commands::Meta { id } => commands::meta(&client, &id, &cancel).await,
        Commands::Read {
            id,
            srs,
            wfs_version,
            max_features,
            bbox,
            filter,
            cql_filter,
            output_format,
        } => {
            let params = wfst::ReadParams {
                srs_name: srs,
                version: wfs_version,
                max_features,
                bbox,
                filter,
                cql_filter,
                output_format,
            };
            commands::read(&client, &id, &params, &cancel).await
        }
        Commands::Commit {
            id,
            request,
            dry_run,
        } => commands::commit(&client, &id, &request, dry_run, &cancel).await,
        Commands::Classify { response } => commands::classify(&response),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            Ok(ClientConfig::from_toml_str(&source)?)
        }
        None => Ok(ClientConfig::from_env()),
    }
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_deref()
        .unwrap_or("info")
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the JSON output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("hyper=off,reqwest=warn,{}", log_level)))
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}
