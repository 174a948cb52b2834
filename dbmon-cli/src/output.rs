//! File output for rendered documents and remediation scripts.
//!
//! Everything is written to a temporary file next to the target, restricted
//! to the owner, and then renamed into place. Readers never see a partial
//! file and the credentials inside are never world-readable.

use std::path::{Path, PathBuf};

use dbmon_core::{CanonicalDocument, DbMonError, OutputFormat, Result};
use tokio::io::AsyncWriteExt;

/// Owner read/write
pub const PRIVATE_MODE: u32 = 0o600;

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "output".to_string(), |name| name.to_string_lossy().into_owned());
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

async fn write_temp(temp: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(PRIVATE_MODE);

    let mut file = options.open(temp).await?;
    // mode() only applies on creation; a stale temp file keeps its old bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(PRIVATE_MODE))
            .await?;
    }
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await
}

/// Atomically replaces `path` with `contents`, owner-only on unix.
///
/// # Errors
/// Returns an I/O error naming `path` if the temporary file cannot be
/// written or renamed. The temporary file is removed on failure.
pub async fn write_private(path: &Path, contents: &str) -> Result<()> {
    let temp = temp_path(path);

    let written = match write_temp(&temp, contents).await {
        Ok(()) => tokio::fs::rename(&temp, path).await,
        Err(e) => Err(e),
    };

    if let Err(source) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(DbMonError::io(
            format!("Failed to write to {}", path.display()),
            source,
        ));
    }

    tracing::debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// Renders the canonical document in the format implied by `path` and
/// writes it.
///
/// # Errors
/// Returns an error if rendering or writing fails.
pub async fn write_document(document: &CanonicalDocument, path: &Path) -> Result<()> {
    let rendered = document.render(OutputFormat::from_path(path))?;
    write_private(path, &rendered).await?;
    tracing::info!("✓ Configuration written to {}", path.display());
    Ok(())
}
