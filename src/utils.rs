use tokio::fs;
use std::path::Path;
use anyhow::Result;
use log::{error, info};

/// Asynchronously ensures that a directory exists, creating it if it does not.
/// This function is idempotent.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }
    if let Err(e) = fs::create_dir_all(path).await {
        error!("Failed to create directory at {:?}: {}", path, e);
        return Err(e.into());
    }
    info!("Created directory at: {:?}", path);
    Ok(())
}
