use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vps_core::{RelayConfig, VpsError};
use vps_relay::{NullComposer, PassthroughTransform, Storage, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "vps-relay", about = "Device screen mirroring relay")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "vps.toml")]
    config: PathBuf,

    /// Print the default configuration and exit.
    #[arg(long)]
    gen_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), VpsError> {
    let cli = Cli::parse();

    if cli.gen_config {
        let defaults = toml::to_string_pretty(&RelayConfig::default())
            .map_err(|e| VpsError::Config(e.to_string()))?;
        println!("{defaults}");
        return Ok(());
    }

    let config = RelayConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(config = %cli.config.display(), "vps-relay starting");

    let storage = Storage::new(&config);
    storage.prepare(config.device.max_devices).await?;

    let supervisor = Supervisor::new(
        config,
        storage,
        Arc::new(PassthroughTransform),
        Arc::new(NullComposer),
    );
    supervisor.run().await
}
