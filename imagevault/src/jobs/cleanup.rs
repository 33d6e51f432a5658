//! Asynchronous file removal with retries.
//!
//! Deleting an image answers the caller as soon as the metadata row is
//! gone; the on-disk artifacts are removed afterwards by this worker.
//! Each scheduled batch is retried a few times with a short pause, since
//! the common transient failures (a scanner holding a handle, NFS hiccup)
//! clear quickly. A path that is already absent counts as removed.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::ingest::writer;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

enum Job {
    Remove(Vec<PathBuf>),
    Shutdown,
}

/// Sender half for scheduling file removals. Cheap to clone.
#[derive(Clone)]
pub struct CleanupHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl CleanupHandle {
    /// Queue a batch of paths for removal.
    pub fn schedule(&self, paths: Vec<PathBuf>) {
        if paths.is_empty() {
            return;
        }
        if self.tx.send(Job::Remove(paths)).is_err() {
            warn!("cleanup worker is gone; dropping removal batch");
        }
    }
}

/// Background worker that removes storage files off the request path.
pub struct CleanupWorker {
    handle: CleanupHandle,
    task: JoinHandle<()>,
}

impl CleanupWorker {
    /// Spawn the worker on the current tokio runtime.
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx));
        Self {
            handle: CleanupHandle { tx },
            task,
        }
    }

    /// Handle for scheduling removals.
    pub fn handle(&self) -> CleanupHandle {
        self.handle.clone()
    }

    /// Drain queued batches and stop the worker.
    pub async fn shutdown(self) {
        // Jobs queued before the marker are processed first.
        let _ = self.handle.tx.send(Job::Shutdown);
        if let Err(e) = self.task.await {
            error!(error = %e, "cleanup worker task failed");
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Remove(paths) => remove_with_retry(paths).await,
            Job::Shutdown => break,
        }
    }
    debug!("cleanup worker stopped");
}

async fn remove_with_retry(paths: Vec<PathBuf>) {
    let mut remaining = paths;
    for attempt in 1..=MAX_ATTEMPTS {
        let batch = std::mem::take(&mut remaining);
        let failed = tokio::task::spawn_blocking(move || writer::cleanup(&batch)).await;
        match failed {
            Ok(failed) if failed.is_empty() => return,
            Ok(failed) => {
                debug!(
                    attempt,
                    remaining = failed.len(),
                    "cleanup batch incomplete, will retry"
                );
                remaining = failed;
            }
            Err(e) => {
                error!(error = %e, "cleanup task panicked");
                return;
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    for path in &remaining {
        error!(path = %path.display(), "giving up on file removal");
    }
}
