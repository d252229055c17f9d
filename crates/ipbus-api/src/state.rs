//! Shared state for CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use ipbus_core::BusEngine;
use ipbus_infra::LocalEngine;
use ipbus_infra::config::{load_bus_config, resolve_data_dir};
use ipbus_types::config::BusConfig;

/// Configuration plus the engine every command joins through.
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: BusConfig,
    pub engine: Arc<LocalEngine>,
}

impl AppState {
    pub async fn init() -> Self {
        let data_dir = resolve_data_dir();
        let config = load_bus_config(&data_dir).await;
        let engine = Arc::new(LocalEngine::new(config.engine.clone()));

        tracing::debug!(data_dir = %data_dir.display(), "state initialized");

        Self {
            data_dir,
            config,
            engine,
        }
    }

    /// The engine behind the `BusEngine` boundary, as sessions see it.
    pub fn bus(&self) -> Arc<dyn BusEngine> {
        self.engine.clone()
    }
}
