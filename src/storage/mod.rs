//! YAML-backed durable state shared by the listener and the batch runner.

pub mod lock;
pub mod queue;
pub mod registry;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Reads a YAML file; a missing or empty file yields `T::default()`.
pub fn read_yaml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Writes a YAML file atomically: temp sibling, fsync, rename, fsync dir.
pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_yaml::to_string(value).context("Failed to serialize storage")?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Storage path has no file name")?;
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    {
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
    }

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    // Directory entries must be durable too
    if let Ok(dir_handle) = OpenOptions::new().read(true).open(dir) {
        dir_handle.sync_all().ok();
    }

    Ok(())
}
