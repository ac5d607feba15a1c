//! Screen commands
//! This module defines the operations the screen's buttons invoke. Errors are
//! flattened to strings at this boundary so the view can show them as-is.

use crate::core::bluetooth::{
    ConnectOutcome, PeripheralId, PeripheralTransport, ScanOutcome, ServiceBinding, SessionSnapshot,
};
use crate::state::AppState;

/// Payload the demo writes to the transfer characteristic
pub const DEMO_PAYLOAD: &[u8] = b"Hello World";

/// Starts a discovery session
///
/// # Returns
/// `Ok(true)` if a new session started, `Ok(false)` if one was already running.
/// When the adapter is off the error asks the user to enable Bluetooth; the
/// view should then offer `enable_bluetooth` or point to system settings.
pub async fn start_scan<T: PeripheralTransport>(app_state: &AppState<T>) -> Result<bool, String> {
    let outcome = app_state
        .bluetooth_manager
        .start_scan()
        .await
        .map_err(|e| e.to_string())?;
    Ok(outcome == ScanOutcome::Started)
}

pub async fn stop_scan<T: PeripheralTransport>(app_state: &AppState<T>) -> Result<(), String> {
    app_state.bluetooth_manager.stop_scan().await.map_err(|e| e.to_string())
}

pub async fn enable_bluetooth<T: PeripheralTransport>(app_state: &AppState<T>) -> Result<(), String> {
    app_state.bluetooth_manager.enable_adapter().await.map_err(|e| e.to_string())
}

/// Connects to a peripheral
///
/// # Arguments
/// * `device_id` - The unique identifier of the peripheral (platform-specific ID)
/// * `app_state` - The application state
///
/// # Returns
/// The published binding once the peripheral is ready.
pub async fn connect_to_device<T: PeripheralTransport>(
    device_id: &str,
    app_state: &AppState<T>,
) -> Result<ServiceBinding, String> {
    let outcome = app_state
        .bluetooth_manager
        .connect(&PeripheralId::from(device_id))
        .await
        .map_err(|e| e.to_string())?;
    match outcome {
        ConnectOutcome::Ready { binding, .. } => Ok(binding),
        ConnectOutcome::Failed(reason) => Err(format!("Connection to {} failed: {}", device_id, reason)),
        ConnectOutcome::Interrupted => Err(format!("Connection to {} was interrupted", device_id)),
    }
}

pub async fn disconnect<T: PeripheralTransport>(device_id: &str, app_state: &AppState<T>) -> Result<(), String> {
    app_state
        .bluetooth_manager
        .disconnect(&PeripheralId::from(device_id))
        .await
        .map_err(|e| e.to_string())
}

/// Writes the demo payload through the published binding
pub async fn write<T: PeripheralTransport>(app_state: &AppState<T>) -> Result<(), String> {
    let binding = current_binding(app_state).await?;
    app_state
        .bluetooth_manager
        .write(&binding, DEMO_PAYLOAD)
        .await
        .map_err(|e| e.to_string())
}

pub async fn read<T: PeripheralTransport>(app_state: &AppState<T>) -> Result<Vec<u8>, String> {
    let binding = current_binding(app_state).await?;
    app_state.bluetooth_manager.read(&binding).await.map_err(|e| e.to_string())
}

/// Everything the view renders: peripheral list, binding and scanning flag
pub async fn session_snapshot<T: PeripheralTransport>(app_state: &AppState<T>) -> SessionSnapshot {
    app_state.bluetooth_manager.snapshot().await
}

async fn current_binding<T: PeripheralTransport>(app_state: &AppState<T>) -> Result<ServiceBinding, String> {
    app_state
        .bluetooth_manager
        .binding()
        .await
        .ok_or_else(|| "No device connected".to_string())
}
