use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

const RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Exclusive advisory lock over the storage files.
///
/// Held by the batch runner for a whole cycle and by the listener while it
/// processes one mention. Released on drop, or by the OS if the process dies.
#[derive(Debug)]
pub struct StorageLock {
    file: File,
    path: PathBuf,
}

impl StorageLock {
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create lock directory: {}", parent.display())
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        let started = Instant::now();
        let mut announced = false;
        loop {
            match file.try_lock() {
                Ok(()) => {
                    debug!("Storage lock acquired: {}", path.display());
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(TryLockError::WouldBlock) => {
                    if started.elapsed() >= timeout {
                        anyhow::bail!(
                            "Timed out after {:?} waiting for storage lock {}",
                            timeout,
                            path.display()
                        );
                    }
                    if !announced {
                        info!("Waiting for storage lock {}", path.display());
                        announced = true;
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(TryLockError::Error(e)) => {
                    return Err(e)
                        .with_context(|| format!("Failed to lock {}", path.display()));
                }
            }
        }
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        self.file.unlock().ok();
        debug!("Storage lock released: {}", self.path.display());
    }
}
