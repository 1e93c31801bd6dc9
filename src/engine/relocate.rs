//! Moving the finished temp file to its final location.

use std::io;
use std::path::Path;

/// Move `temp` to `target`, replacing any stale file at `target`
///
/// Rename is tried first; when it fails (different filesystems, for example)
/// the file is copied and the temp file removed once both copies exist.
pub(super) async fn relocate(temp: &Path, target: &Path) -> io::Result<()> {
    if tokio::fs::try_exists(target).await? {
        tracing::debug!(target = %target.display(), "Removing stale final file");
        tokio::fs::remove_file(target).await?;
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(temp, target).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!(
                temp = %temp.display(),
                target = %target.display(),
                error = %e,
                "Rename failed, falling back to copy"
            );
            tokio::fs::copy(temp, target).await?;
            if tokio::fs::try_exists(temp).await? && tokio::fs::try_exists(target).await? {
                tokio::fs::remove_file(temp).await?;
            }
            Ok(())
        }
    }
}
