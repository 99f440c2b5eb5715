//! Corefile Generator
//!
//! Watches a directory of custom CoreDNS server blocks and rewrites the
//! consolidated configuration file every time a fragment changes.

use std::sync::Arc;
use clap::Parser;
use log::info;
use tokio::signal;

use corefile_generator::{
    config::GeneratorConfig,
    errors::GeneratorError,
    watcher::{DirectoryWatcher, Regenerator},
};

#[tokio::main]
async fn main() -> Result<(), GeneratorError> {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    // Load configuration from flags and environment variables
    let config = GeneratorConfig::parse();
    config.validate()?;

    // Subscribe before the first pass so no change in between is missed
    let watcher = DirectoryWatcher::new(config.input_dir.clone())?;
    let regenerator = Arc::new(Regenerator::new(config));

    // A failed initial pass is logged, a later edit can still fix it
    info!("Writing initial configuration file");
    let _ = regenerator.run_pass("initial").await;

    // Set up shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    info!("Starting watch handler");
    tokio::select! {
        _ = shutdown_signal => {
            info!("Initiating graceful shutdown...");
            Ok(())
        },
        res = watcher.run(regenerator) => res,
    }
}
