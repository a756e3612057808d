use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::backend::{FileShare, ReadTokenIssuer};
use super::queue::{Operation, OperationSender, operation_queue};
use super::report::SyncReport;
use super::worker::run_worker;
use super::{ROOT, SyncError, join_path};

pub const DEFAULT_WORKERS: usize = 16;
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// Number of tasks draining the operation queue.
    pub workers: usize,
    /// Upper bound on operations executing at the same time, across all workers.
    pub max_in_flight: usize,
    pub queue_capacity: usize,
    /// Lifetime of the read tokens handed to the destination for each copy.
    pub token_ttl: Duration,
}

impl SyncOptions {
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            max_in_flight: workers,
            queue_capacity: workers,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::with_workers(DEFAULT_WORKERS)
    }
}

/// Everything an operation needs: both endpoints and the global gate.
pub struct SyncContext<S, D> {
    source: Arc<S>,
    destination: Arc<D>,
    gate: Arc<Semaphore>,
    token_ttl: Duration,
}

impl<S, D> Clone for SyncContext<S, D> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            destination: Arc::clone(&self.destination),
            gate: Arc::clone(&self.gate),
            token_ttl: self.token_ttl,
        }
    }
}

impl<S, D> SyncContext<S, D> {
    pub fn new(source: Arc<S>, destination: Arc<D>, options: &SyncOptions) -> Self {
        Self {
            source,
            destination,
            gate: Arc::new(Semaphore::new(options.max_in_flight.max(1))),
            token_ttl: options.token_ttl,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn gate(&self) -> &Arc<Semaphore> {
        &self.gate
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }
}

pub struct SyncEngine<S, D> {
    context: SyncContext<S, D>,
    options: SyncOptions,
}

impl<S, D> SyncEngine<S, D>
where
    S: FileShare + ReadTokenIssuer + 'static,
    D: FileShare + 'static,
{
    pub fn new(source: Arc<S>, destination: Arc<D>, options: SyncOptions) -> Self {
        Self {
            context: SyncContext::new(source, destination, &options),
            options,
        }
    }

    pub fn context(&self) -> &SyncContext<S, D> {
        &self.context
    }

    /// Makes the destination share mirror the source share.
    ///
    /// Traversal runs as the only producer while the worker pool executes the
    /// queued operations. The run succeeds only if traversal and every worker
    /// succeed; whatever completed before a failure stays on the destination.
    ///
    /// Copies are started, not awaited: a successful return means every
    /// required copy was accepted by the destination, which may still be
    /// transferring data.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let context = &self.context;
        if !context.source().directory_exists(ROOT).await? {
            return Err(SyncError::SourceRootMissing);
        }
        if !context.source().can_issue_read_tokens() {
            return Err(SyncError::TokensUnavailable);
        }
        if context
            .destination()
            .create_directory_if_not_exists(ROOT)
            .await?
        {
            info!("created destination root");
        }

        let (sender, receiver) = operation_queue(self.options.queue_capacity);
        let mut workers = JoinSet::new();
        for id in 0..self.options.workers.max(1) {
            workers.spawn(run_worker(id, context.clone(), receiver.clone()));
        }
        drop(receiver);

        let traversal = reconcile_directory(context, &sender, ROOT).await;
        // Closing the queue lets idle workers exit once it is drained.
        drop(sender);

        let mut report = SyncReport::default();
        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined.map_err(SyncError::from).and_then(|result| result) {
                Ok(partial) => report.merge(partial),
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }

        match (failure, traversal) {
            (Some(err), _) | (None, Err(err)) => {
                error!(%err, "sync failed");
                Err(err)
            }
            (None, Ok(directories_created)) => {
                report.directories_created = directories_created;
                info!(
                    copied = report.copied,
                    skipped = report.skipped,
                    deleted_files = report.deleted_files,
                    deleted_directories = report.deleted_directories,
                    directories_created = report.directories_created,
                    "sync complete"
                );
                Ok(report)
            }
        }
    }
}

/// Walks one source directory against its destination twin.
///
/// Subdirectories are created on the destination and descended into before
/// the next sibling is looked at, so a directory always exists before any copy
/// into it is queued. Files and orphans are queued, never executed here.
/// Returns the number of directories created.
fn reconcile_directory<'a, S, D>(
    context: &'a SyncContext<S, D>,
    queue: &'a OperationSender,
    path: &'a str,
) -> BoxFuture<'a, Result<usize, SyncError>>
where
    S: FileShare + ReadTokenIssuer + 'static,
    D: FileShare + 'static,
{
    async move {
        let mut orphans: BTreeMap<String, String> = context
            .destination()
            .list_entries(path)
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry.name.to_lowercase(), entry.name))
            .collect();

        let entries = context
            .source()
            .list_entries(path)
            .await?
            .ok_or_else(|| SyncError::SourceDirectoryMissing(path.to_string()))?;
        debug!(
            path,
            source_entries = entries.len(),
            destination_entries = orphans.len(),
            "reconciling directory"
        );

        let mut created = 0;
        for entry in entries {
            orphans.remove(&entry.name.to_lowercase());
            let child = join_path(path, &entry.name);
            if entry.is_directory {
                if context
                    .destination()
                    .create_directory_if_not_exists(&child)
                    .await?
                {
                    debug!(path = %child, "created directory");
                    created += 1;
                }
                created += reconcile_directory(context, queue, &child).await?;
            } else {
                queue.enqueue(Operation::CopyFile { path: child }).await?;
            }
        }

        for name in orphans.into_values() {
            let orphan = join_path(path, &name);
            debug!(path = %orphan, "queueing orphan removal");
            queue.enqueue(Operation::DeleteFile { path: orphan }).await?;
        }
        Ok(created)
    }
    .boxed()
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

