//! Hub server
//!
//! Loads the configuration, restores config entries and serves the config
//! flow API.
//!
//! Usage: `homeassistant [CONFIG_DIR]`. Without an argument the config
//! directory is taken from `HA_CONFIG_DIR`, falling back to the working
//! directory.

use anyhow::{Context, Result};
use ha_api::AppState;
use ha_components::nest::{self, NestOAuthClient};
use ha_components::tivo::{self, TivoPlatform};
use ha_config::HubConfig;
use ha_config_entries::{ConfigEntries, Storage};
use ha_config_flow::{spawn_expiry_sweep, FlowManager, FlowManagerConfig, HandlerRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// The running hub
pub struct Hub {
    pub config: HubConfig,
    pub config_entries: Arc<ConfigEntries>,
    pub flow_manager: Arc<FlowManager>,
}

impl Hub {
    /// Load configuration and stored entries, register config flows
    pub async fn new(config_dir: &Path) -> Result<Self> {
        let config = HubConfig::load(config_dir).context("failed to load configuration")?;

        let storage = Arc::new(Storage::new(config_dir));
        let config_entries = Arc::new(ConfigEntries::new(storage));
        config_entries
            .load()
            .await
            .context("failed to load config entries")?;
        info!("Loaded {} config entries", config_entries.len());

        let registry = Arc::new(HandlerRegistry::new());
        nest::register_flows(
            &registry,
            Arc::new(NestOAuthClient::new()?),
            config.nest.clone(),
        )?;

        let flow_config = FlowManagerConfig {
            reserved_steps: config.config_manager.reserved_steps.iter().cloned().collect(),
            flow_ttl: config.config_manager.flow_ttl(),
        };
        let flow_manager = Arc::new(
            FlowManager::new(registry, flow_config).with_entry_sink(config_entries.clone()),
        );

        Ok(Self {
            config,
            config_entries,
            flow_manager,
        })
    }
}

fn config_dir() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("HA_CONFIG_DIR"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = config_dir();
    info!("Starting hub with config directory {:?}", config_dir);

    let hub = Hub::new(&config_dir).await?;

    let _sweep = spawn_expiry_sweep(
        hub.flow_manager.clone(),
        hub.config.config_manager.sweep_interval(),
    );

    let mut platform = TivoPlatform::new();
    let devices = tivo::setup_platform(&mut platform, hub.config.tivo_platforms()).await;
    if !devices.is_empty() {
        info!("Set up {} TiVo DVR(s)", devices.len());
        tivo::spawn_polling(devices, tivo::SCAN_INTERVAL);
    }

    let addr = hub.config.http.bind_address()?.to_string();
    let state = AppState::new(hub.flow_manager.clone());
    let server = tokio::spawn(async move {
        if let Err(e) = ha_api::start_server(state, &addr).await {
            error!("API server error: {}", e);
        }
    });

    info!("Hub is running");

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = server => error!("API server stopped"),
    }
    info!("Shutting down...");

    Ok(())
}
