//! starpit game server binary
//!
//! Runs the crash round scheduler and the mines engine behind the HTTP API.

use clap::Parser;
use starpit::api::ApiServer;
use starpit::config::{generate_sample_config, ConfigLoader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "starpit")]
#[command(about = "Crash and mines game server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// API server host (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// API server port (overrides the configuration file)
    #[arg(long)]
    port: Option<u16>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Write a sample configuration to this path and exit
    #[arg(long)]
    generate_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = args.generate_config {
        generate_sample_config(&path)?;
        println!("Sample configuration written to {}", path);
        return Ok(());
    }

    starpit::api::server::init_tracing();

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(origins) = args.cors_origins {
        config.api.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
    }
    loader.validate(&config)?;

    info!("Configuration loaded (config file: {:?})", args.config);
    ApiServer::new(config).run().await?;
    Ok(())
}
