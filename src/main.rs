//! Chain Sentinel server entry point.

use anyhow::Result;
use chain_sentinel::api::SentinelServer;
use chain_sentinel::core::config::SentinelConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Blockchain fraud alert pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sentinel server
    Server {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to bind to
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a configuration file and exit
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SentinelConfig> {
    let config = match path {
        Some(path) => SentinelConfig::from_file(path)?,
        None => SentinelConfig::from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    match args.command {
        Some(Commands::CheckConfig { config }) => {
            SentinelConfig::from_file(&config)?;
            println!("configuration ok: {}", config.display());
            Ok(())
        }
        Some(Commands::Server { host, port, config }) => {
            let config = load_config(config.as_ref())?;
            info!(
                version = env!("CARGO_PKG_VERSION"),
                oracle = %config.scoring.base_url,
                "starting chain sentinel"
            );
            let server = SentinelServer::new(host, port, config)?;
            server.start().await
        }
        None => {
            let config = load_config(None)?;
            let server = SentinelServer::new("127.0.0.1".to_string(), 8080, config)?;
            server.start().await
        }
    }
}
