pub mod backend;
mod delete;
pub mod detector;
pub mod engine;
pub mod queue;
mod report;
mod worker;

#[cfg(test)]
pub(crate) mod memory;

use std::time::Duration;

use sharemirror_core::{ApiErrorClass, ShareError};
use thiserror::Error;

pub use backend::{FileShare, ReadTokenIssuer};
pub use engine::{SyncContext, SyncEngine, SyncOptions};
pub use queue::{Operation, QueueError};
pub use report::SyncReport;

/// Path of the share root.
pub const ROOT: &str = "";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("source root directory does not exist")]
    SourceRootMissing,
    #[error("source share cannot issue read tokens")]
    TokensUnavailable,
    #[error("source directory disappeared during traversal: {0}")]
    SourceDirectoryMissing(String),
    #[error("backend error: {0}")]
    Backend(#[from] ShareError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("concurrency gate closed")]
    GateClosed,
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("read token lifetime {0:?} is out of range")]
    InvalidTokenLifetime(Duration),
}

impl SyncError {
    /// Class of the backend failure behind this error, if there is one.
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            SyncError::Backend(err) => err.classification(),
            _ => None,
        }
    }
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
