pub mod cli;
pub mod core;
pub mod providers;
pub mod store;
pub mod worker;

use crate::core::config::AppConfig;
use crate::providers::CurrencyApiProvider;
use crate::worker::Manager;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Run,
    Once,
}

/// Builds the manager described by `config`, backed by the CurrencyAPI
/// provider.
pub fn build_manager(config: &AppConfig) -> Result<Manager> {
    let api_key = config.api_key()?;
    let provider = CurrencyApiProvider::new(&config.provider.base_url, &api_key)
        .context("Failed to create CurrencyAPI client")?;

    let manager = Manager::builder()
        .provider(Arc::new(provider))
        .config(config.worker_config())
        .build()?;
    Ok(manager)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Rate keeper starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let manager = build_manager(&config)?;

    match command {
        AppCommand::Run => cli::rates::run_until_interrupted(&manager).await,
        AppCommand::Once => cli::rates::warm_and_print(&manager).await,
    }
}
