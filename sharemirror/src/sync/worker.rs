use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use super::backend::{FileShare, ReadTokenIssuer};
use super::delete::{delete_orphan, delete_subtree};
use super::detector::{CopyDecision, decide};
use super::engine::SyncContext;
use super::queue::{Operation, OperationReceiver};
use super::report::{Outcome, SyncReport};
use super::SyncError;

/// Drains the queue until it is closed and empty.
///
/// A failing operation ends this worker and its error is returned to the
/// driver. Work already handed to other workers is unaffected.
pub(crate) async fn run_worker<S, D>(
    id: usize,
    context: SyncContext<S, D>,
    queue: OperationReceiver,
) -> Result<SyncReport, SyncError>
where
    S: FileShare + ReadTokenIssuer,
    D: FileShare,
{
    let mut report = SyncReport::default();
    while let Some(op) = queue.dequeue().await {
        let _permit = context
            .gate()
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SyncError::GateClosed)?;
        match execute(&context, &op).await {
            Ok(outcome) => report.record(outcome),
            Err(err) => {
                error!(
                    worker = id,
                    path = op.path(),
                    class = ?err.classification(),
                    %err,
                    "operation failed"
                );
                return Err(err);
            }
        }
    }
    debug!(worker = id, ?report, "worker finished");
    Ok(report)
}

pub(crate) async fn execute<S, D>(
    context: &SyncContext<S, D>,
    op: &Operation,
) -> Result<Outcome, SyncError>
where
    S: FileShare + ReadTokenIssuer,
    D: FileShare,
{
    match op {
        Operation::CopyFile { path } => copy_if_changed(context, path).await,
        Operation::DeleteFile { path } => delete_orphan(context.destination(), path).await,
        Operation::DeleteDirectorySubtree { path } => {
            let removed = delete_subtree(context.destination(), path).await?;
            Ok(Outcome::DeletedSubtree(removed))
        }
    }
}

async fn copy_if_changed<S, D>(context: &SyncContext<S, D>, path: &str) -> Result<Outcome, SyncError>
where
    S: FileShare + ReadTokenIssuer,
    D: FileShare,
{
    let destination_size = context.destination().file_size(path).await?;
    let source_size = context.source().file_size(path).await?;

    match decide(source_size, destination_size) {
        CopyDecision::Skip => {
            info!("Skipping {path}");
            Ok(Outcome::Skipped)
        }
        CopyDecision::SourceVanished => {
            warn!(path, "source file disappeared before it could be copied");
            Ok(Outcome::Skipped)
        }
        CopyDecision::Copy(reason) => {
            info!("Copying {path}");
            debug!(path, ?reason, "copy required");
            start_copy(context, path).await?;
            Ok(Outcome::Copied)
        }
    }
}

/// Authorizes the destination to read the source file and starts a
/// server-side copy. Completion is not awaited.
async fn start_copy<S, D>(context: &SyncContext<S, D>, path: &str) -> Result<(), SyncError>
where
    S: FileShare + ReadTokenIssuer,
    D: FileShare,
{
    let ttl = context.token_ttl();
    let expires_at = time::Duration::try_from(ttl)
        .ok()
        .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
        .ok_or(SyncError::InvalidTokenLifetime(ttl))?;
    let token = context.source().issue_read_token(path, expires_at).await?;
    let source_url = token.append_to(&context.source().file_url(path)?);
    context.destination().start_copy(path, &source_url).await?;
    Ok(())
}
