use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, info};

use super::backend::FileShare;
use super::report::{Outcome, Removed};
use super::{SyncError, join_path};

/// Removes a destination entry that has no counterpart in the source.
///
/// The entry is tried as a file first; only when no file answers to the name
/// is it treated as a directory and removed with everything under it.
pub(crate) async fn delete_orphan<D: FileShare>(
    destination: &D,
    path: &str,
) -> Result<Outcome, SyncError> {
    if destination.delete_file_if_exists(path).await? {
        info!("Deleting file {path}");
        return Ok(Outcome::DeletedFile);
    }
    let removed = delete_subtree(destination, path).await?;
    Ok(Outcome::DeletedSubtree(removed))
}

/// Deletes `path` and all of its descendants, children first.
///
/// Anything that is already gone is skipped, so repeating the call is harmless.
pub(crate) fn delete_subtree<'a, D>(
    destination: &'a D,
    path: &'a str,
) -> BoxFuture<'a, Result<Removed, SyncError>>
where
    D: FileShare + 'a,
{
    async move {
        let Some(entries) = destination.list_entries(path).await? else {
            debug!(path, "subtree already absent");
            return Ok(Removed::default());
        };
        info!("Deleting folder {path}");

        let mut removed = Removed::default();
        for entry in entries {
            let child = join_path(path, &entry.name);
            if entry.is_directory {
                removed += delete_subtree(destination, &child).await?;
            } else if destination.delete_file_if_exists(&child).await? {
                removed.files += 1;
            }
        }
        if destination.delete_directory_if_exists(path).await? {
            removed.directories += 1;
        }
        Ok(removed)
    }
    .boxed()
}
