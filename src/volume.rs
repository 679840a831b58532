// Volume mounts for build and runtime containers.
// Sample apps are mirrored into a temporary directory before mounting so the
// build never writes into tracked sources and one sample can back many tests.

use crate::errors::{HarnessError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A host directory mounted into a container
#[derive(Debug, Clone)]
pub struct Volume {
    host_dir: PathBuf,
    container_dir: String,
    // Keeps the mirror directory alive while any clone of the volume exists
    mirror: Option<Arc<TempDir>>,
}

impl Volume {
    /// Mount an existing host directory as-is
    pub fn new(host_dir: impl Into<PathBuf>, container_dir: impl Into<String>) -> Self {
        Self {
            host_dir: host_dir.into(),
            container_dir: container_dir.into(),
            mirror: None,
        }
    }

    /// Copy `source` into a fresh temporary directory and mount the copy
    pub fn mirror(source: &Path, container_dir: impl Into<String>) -> Result<Self> {
        if !source.is_dir() {
            return Err(HarnessError::Scenario(format!(
                "Volume source '{}' is not a directory",
                source.display()
            )));
        }

        let temp = tempfile::Builder::new()
            .prefix("runprobe-volume-")
            .tempdir()?;

        let dir_name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "app".into());
        let host_dir = temp.path().join(dir_name);

        let copied = copy_dir_recursive(source, &host_dir)?;
        tracing::debug!(
            source = %source.display(),
            target = %host_dir.display(),
            files = copied,
            "mirrored volume source"
        );

        Ok(Self {
            host_dir,
            container_dir: container_dir.into(),
            mirror: Some(Arc::new(temp)),
        })
    }

    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    pub fn container_dir(&self) -> &str {
        &self.container_dir
    }

    pub fn is_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// `-v` argument value: `<host>:<container>`
    pub fn mount_spec(&self) -> String {
        format!("{}:{}", self.host_dir.display(), self.container_dir)
    }
}

/// Copy a directory tree, returning the number of files copied.
/// Entries that are neither files nor directories are skipped.
fn copy_dir_recursive(source: &Path, target: &Path) -> Result<u64> {
    fs::create_dir_all(target)?;
    let mut copied = 0;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target_path = target.join(entry.file_name());

        if file_type.is_dir() {
            copied += copy_dir_recursive(&entry.path(), &target_path)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target_path)?;
            copied += 1;
        }
    }

    Ok(copied)
}
