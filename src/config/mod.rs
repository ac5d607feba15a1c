pub mod ble_config;

use std::path::Path;

use anyhow::Result;
use log::{LevelFilter, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::ble_config::BleConfig;
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "ble_demo_config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ble: BleConfig,
    /// One of error, warn, info, debug, trace
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            ble: BleConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Parsed log level; unknown names fall back to `Info`.
    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    /// Loads `CONFIG_FILE_NAME` from `config_dir`, or defaults if it does not exist.
    pub async fn load(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    pub async fn save(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;
        let file_path = config_dir.join(CONFIG_FILE_NAME);
        fs::write(&file_path, serde_json::to_string_pretty(self)?).await?;
        info!("Config saved to {:?}.", file_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let config = AppConfig {
            log_level: "chatty".into(),
            ..AppConfig::default()
        };
        assert_eq!(config.log_level_filter(), LevelFilter::Info);

        let config = AppConfig {
            log_level: "debug".into(),
            ..AppConfig::default()
        };
        assert_eq!(config.log_level_filter(), LevelFilter::Debug);
    }

    #[tokio::test]
    async fn app_config_round_trips_through_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.ble.scan_duration_secs = 9;

        config.save(dir.path()).await.unwrap();

        assert_eq!(AppConfig::load(dir.path()).await.unwrap(), config);
    }
}
