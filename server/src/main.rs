//! Sprechfunk Server – Einstiegspunkt

use anyhow::Result;
use clap::Parser;

use sprechfunk_observability::logging_initialisieren;
use sprechfunk_server::config::{CliArgs, ServerConfig};
use sprechfunk_server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::aus_args(CliArgs::parse())?;

    logging_initialisieren(&config.log_level, &config.log_format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Sprechfunk-Server wird initialisiert"
    );

    Server::neu(config).run().await
}
