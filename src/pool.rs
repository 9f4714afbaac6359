//! Fixed-size worker pool for asynchronous and blocking calls.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::LLMError;

/// Worker count used when none is configured.
pub const DEFAULT_WORKER_THREADS: usize = 4;

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(0);

/// A dedicated multi-thread runtime whose tasks are tracked until completion.
///
/// Work submitted with [`WorkerPool::spawn`] queues on the runtime until a worker is
/// free. Shutting down, explicitly or on drop, waits for every tracked task before the
/// workers are released.
pub struct WorkerPool {
    id: usize,
    size: usize,
    handle: Handle,
    tracker: TaskTracker,
    runtime: Option<Runtime>,
}

impl WorkerPool {
    /// Starts `size` worker threads; `0` is treated as `1`.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Io`] when the runtime threads cannot be created.
    pub fn new(size: usize) -> Result<Self, LLMError> {
        let size = size.max(1);
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let runtime = Builder::new_multi_thread()
            .worker_threads(size)
            .thread_name(format!("llm-bridge-{id}"))
            .enable_all()
            .build()
            .map_err(|err| LLMError::Io {
                path: "worker pool".to_string(),
                message: err.to_string(),
            })?;
        debug!(pool = id, workers = size, "worker pool started");
        Ok(Self {
            id,
            size,
            handle: runtime.handle().clone(),
            tracker: TaskTracker::new(),
            runtime: Some(runtime),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks spawned and not yet finished, queued or running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn_on(future, &self.handle)
    }

    /// Waits for every spawned task, then releases the workers.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        self.tracker.close();
        let tracker = self.tracker.clone();
        let id = self.id;
        debug!(pool = id, pending = tracker.len(), "worker pool draining");

        // A runtime cannot be dropped from async context, so the drain runs on its own
        // thread. Inside a runtime (including our own workers) it is left detached.
        let inside_runtime = Handle::try_current().is_ok();
        let drain = std::thread::Builder::new()
            .name(format!("llm-bridge-{id}-shutdown"))
            .spawn(move || {
                runtime.block_on(tracker.wait());
                drop(runtime);
                debug!(pool = id, "worker pool stopped");
            });
        match drain {
            Ok(thread) if !inside_runtime => {
                if thread.join().is_err() {
                    warn!(pool = id, "worker pool shutdown thread panicked");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(pool = id, error = %err, "failed to start shutdown thread"),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("pending", &self.pending())
            .finish()
    }
}
