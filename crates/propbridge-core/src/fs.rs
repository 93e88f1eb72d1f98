//! File writes shared by file-backed sources and the integrations file

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// Replace `path` with `contents` using write-then-rename
///
/// Parent directories are created when missing. The new contents go to a
/// sibling `.tmp` file first, so readers see either the old file or the new
/// one.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let temp_path = temp_path(path);
    {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.flush().await?;
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ),
        ))
    })?;

    tracing::trace!("Wrote {}", path.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
