use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    DEFAULT_ALLOW_DUPLICATES, DEFAULT_MAX_PACKET_SIZE, DEFAULT_SCAN_DURATION_SECS,
    POST_CONNECT_SETTLE_MS, POST_SUBSCRIBE_SETTLE_MS, UUID_DEVICE_SERVICE, UUID_RECEIVE_CHAR,
    UUID_TRANSFER_CHAR,
};
use crate::core::bluetooth::types::{PeripheralId, ScanOptions, ScanRequest, ServiceBinding};
use crate::utils::ensure_directory_exists;

/// Static configuration of the BLE session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// How long a discovery session runs before the transport stops it.
    pub scan_duration_secs: u64,

    /// Only peripherals advertising one of these services are reported.
    /// Empty reports everything.
    pub scan_service_filter: Vec<Uuid>,

    /// Report repeated advertisements so RSSI keeps refreshing.
    pub allow_duplicates: bool,

    pub scan_options: ScanOptions,

    /// Wait after the connect ack before discovering services.
    /// Bonding and link setup need to finish before GATT queries are reliable.
    pub post_connect_settle_ms: u64,

    /// Wait after enabling notifications before writing.
    pub post_subscribe_settle_ms: u64,

    /// Largest chunk of a single write.
    pub max_packet_size: usize,

    pub service_uuid: Uuid,
    pub transfer_characteristic: Uuid,
    pub receive_characteristic: Uuid,
}

impl Default for BleConfig {
    fn default() -> Self {
        BleConfig {
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
            scan_service_filter: Vec::new(),
            allow_duplicates: DEFAULT_ALLOW_DUPLICATES,
            scan_options: ScanOptions::default(),
            post_connect_settle_ms: POST_CONNECT_SETTLE_MS,
            post_subscribe_settle_ms: POST_SUBSCRIBE_SETTLE_MS,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            service_uuid: UUID_DEVICE_SERVICE,
            transfer_characteristic: UUID_TRANSFER_CHAR,
            receive_characteristic: UUID_RECEIVE_CHAR,
        }
    }
}

impl BleConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn post_connect_settle(&self) -> Duration {
        Duration::from_millis(self.post_connect_settle_ms)
    }

    pub fn post_subscribe_settle(&self) -> Duration {
        Duration::from_millis(self.post_subscribe_settle_ms)
    }

    pub fn scan_request(&self) -> ScanRequest {
        ScanRequest {
            service_filter: self.scan_service_filter.clone(),
            duration: self.scan_duration(),
            allow_duplicates: self.allow_duplicates,
            options: self.scan_options,
        }
    }

    /// Addressing for the configured service on `peripheral_id`.
    pub fn binding_for(&self, peripheral_id: &PeripheralId) -> ServiceBinding {
        ServiceBinding {
            peripheral_id: peripheral_id.clone(),
            service: self.service_uuid,
            transfer: self.transfer_characteristic,
            receive: self.receive_characteristic,
        }
    }

    /// Loads the config from a JSON file, falling back to defaults if it is missing.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file not found at {:?}, using default.", path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", path);
        Ok(config)
    }

    /// Saves the config as pretty JSON, creating the parent directory if needed.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            ensure_directory_exists(dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize BLE config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(path, config_json).await?;

        info!("BLE config saved to {:?}.", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::types::ScanMode;

    #[test]
    fn defaults_match_demo_peripheral() {
        let config = BleConfig::default();
        assert_eq!(config.scan_duration(), Duration::from_secs(5));
        assert_eq!(config.post_connect_settle(), Duration::from_millis(900));
        assert_eq!(config.post_subscribe_settle(), Duration::from_millis(900));
        assert_eq!(config.max_packet_size, 255);
        assert_eq!(
            config.service_uuid.to_string(),
            "4fafc201-1fb5-459e-8fcc-c5c9c331914b"
        );
        assert_eq!(
            config.transfer_characteristic.to_string(),
            "beb5483f-36e1-4688-b7f5-ea07361b26a9"
        );
        assert_eq!(
            config.receive_characteristic.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a8"
        );
        assert!(config.scan_request().allow_duplicates);
        assert_eq!(config.scan_options.scan_mode, ScanMode::LowLatency);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: BleConfig =
            serde_json::from_str(r#"{ "scan_duration_secs": 12, "max_packet_size": 20 }"#).unwrap();
        assert_eq!(config.scan_duration_secs, 12);
        assert_eq!(config.max_packet_size, 20);
        assert_eq!(config.post_connect_settle_ms, POST_CONNECT_SETTLE_MS);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BleConfig::load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config, BleConfig::default());
    }

    #[tokio::test]
    async fn save_then_load_preserves_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ble.json");
        let config = BleConfig {
            post_connect_settle_ms: 1500,
            scan_service_filter: vec![UUID_DEVICE_SERVICE],
            ..BleConfig::default()
        };

        config.save(&path).await.unwrap();
        let loaded = BleConfig::load(&path).await.unwrap();

        assert_eq!(loaded, config);
    }
}
