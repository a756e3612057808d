use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

/// A deferred unit of work produced by traversal. Operations carry the
/// share-relative path only; both endpoints are resolved from the sync context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CopyFile { path: String },
    /// Orphan removal. Reclassified as a subtree delete when the target is not a file.
    DeleteFile { path: String },
    DeleteDirectorySubtree { path: String },
}

impl Operation {
    pub fn path(&self) -> &str {
        match self {
            Operation::CopyFile { path }
            | Operation::DeleteFile { path }
            | Operation::DeleteDirectorySubtree { path } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("operation queue is closed")]
    Closed,
}

/// Creates the queue between traversal and the worker pool.
///
/// The channel is bounded, so a producer that runs ahead of the workers waits
/// for room instead of buffering the whole tree. Dropping the sender marks the
/// queue complete; receivers keep draining until it is both complete and empty.
pub fn operation_queue(capacity: usize) -> (OperationSender, OperationReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        OperationSender { tx },
        OperationReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[derive(Debug)]
pub struct OperationSender {
    tx: mpsc::Sender<Operation>,
}

impl OperationSender {
    /// Fails only when every receiver is gone, i.e. all workers have exited.
    pub async fn enqueue(&self, op: Operation) -> Result<(), QueueError> {
        self.tx.send(op).await.map_err(|_| QueueError::Closed)
    }
}

#[derive(Debug, Clone)]
pub struct OperationReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Operation>>>,
}

impl OperationReceiver {
    /// Returns `None` once the sender is dropped and nothing is left.
    pub async fn dequeue(&self) -> Option<Operation> {
        self.rx.lock().await.recv().await
    }
}
