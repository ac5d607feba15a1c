//! Command-line rendition of the Bluetooth demo screen.
//!
//! Usage: `ble-demo [config-dir] [peripheral-name]`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use ble_peripheral_demo_lib::commands;
use ble_peripheral_demo_lib::config::AppConfig;
use ble_peripheral_demo_lib::core::bluetooth::{BluestTransport, Peripheral};
use ble_peripheral_demo_lib::logging::setup_logging;
use ble_peripheral_demo_lib::state::AppState;
use log::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let wanted_name = args.next();

    let config = AppConfig::load(&config_dir).await?;
    // Records go to stderr; nothing renders the feed here.
    let _ = setup_logging(config.log_level_filter());

    let app_state = AppState::new(BluestTransport::new(), config, None).await?;

    if let Err(e) = commands::start_scan(&app_state).await {
        warn!("{}", e);
        commands::enable_bluetooth(&app_state).await.map_err(|e| anyhow!(e))?;
        return Err(anyhow!("Please enable Bluetooth in Settings to continue."));
    }

    info!("Scanning...");
    let scan_duration = app_state.config.ble.scan_duration();
    tokio::time::sleep(scan_duration + Duration::from_millis(500)).await;
    while commands::session_snapshot(&app_state).await.is_scanning {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let snapshot = commands::session_snapshot(&app_state).await;
    for peripheral in &snapshot.peripherals {
        println!(
            "{:<40} {:<24} {:>5} {}",
            peripheral.id(),
            peripheral.name(),
            peripheral.rssi().map_or("-".to_string(), |rssi| rssi.to_string()),
            peripheral.status()
        );
    }

    let service = app_state.config.ble.service_uuid;
    let target = snapshot.peripherals.iter().find(|p: &&Peripheral| match &wanted_name {
        Some(name) => p.name() == name.as_str(),
        None => p.advertises(service),
    });
    let Some(target) = target else {
        info!("No matching peripheral found.");
        return Ok(());
    };

    let id = target.id().to_string();
    let binding = commands::connect_to_device(&id, &app_state)
        .await
        .map_err(|e| anyhow!(e))?;
    info!("Connected: {:?}", binding);

    let mut notifications = app_state.bluetooth_manager.notifications();
    tokio::spawn(async move {
        while let Ok(update) = notifications.recv().await {
            println!("notification from {}: {:?}", update.peripheral_id, update.value);
        }
    });

    if let Err(e) = commands::write(&app_state).await {
        error!("Write failed: {}", e);
    }
    match commands::read(&app_state).await {
        Ok(value) => println!("read: {:?} ({})", value, String::from_utf8_lossy(&value)),
        Err(e) => error!("Read failed: {}", e),
    }

    if let Err(e) = commands::disconnect(&id, &app_state).await {
        error!("Disconnect failed: {}", e);
    }
    app_state.bluetooth_manager.shutdown().await;
    Ok(())
}
