/*!
Worker pool that runs slot operations off the caller's thread.
*/

use crate::{KeepsakeError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

/// Dedicated runtime that shuts down in the background when dropped
///
/// Dropping a `Runtime` normally blocks until its workers stop, which panics inside
/// async code and deadlocks on one of its own threads.
#[derive(Debug)]
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Handle to the tokio runtime that executes slot operations
///
/// Either borrows the runtime the caller already runs on ([`WorkerPool::current`]) or
/// owns a dedicated multi-thread runtime ([`WorkerPool::dedicated`]). A dedicated pool
/// shuts down when the last clone is dropped, from any context; tasks still queued on
/// it at that point are abandoned.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    handle: Handle,
    owned: Option<Arc<OwnedRuntime>>,
}

impl WorkerPool {
    /// Use the runtime of the calling context
    ///
    /// # Errors
    /// * `KeepsakeError::Worker` - If called outside of a tokio runtime
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            KeepsakeError::worker(format!("no async runtime available: {e}"))
        })?;
        Ok(Self::from_handle(handle))
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Start a dedicated runtime with `threads` workers, one per CPU if `None`
    pub fn dedicated(threads: Option<usize>) -> Result<Self> {
        let threads = threads.unwrap_or_else(|| num_cpus::get().max(2));
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("keepsake-worker")
            .enable_all()
            .build()
            .map_err(|e| KeepsakeError::worker(format!("failed to start worker pool: {e}")))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    /// Use the current runtime if there is one, otherwise start a dedicated pool
    pub fn current_or_dedicated(threads: Option<usize>) -> Result<Self> {
        match (threads, Handle::try_current()) {
            (None, Ok(handle)) => Ok(Self::from_handle(handle)),
            _ => Self::dedicated(threads),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_dedicated(&self) -> bool {
        self.owned.is_some()
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run CPU-bound or blocking work on the pool's blocking threads
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(f)
    }

    /// Block the current (non-async) thread until `future` completes
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_fails_outside_runtime() {
        assert!(matches!(WorkerPool::current(), Err(KeepsakeError::Worker(_))));
    }

    #[test]
    fn test_dedicated_pool_runs_tasks() {
        let pool = WorkerPool::dedicated(Some(2)).unwrap();
        assert!(pool.is_dedicated());
        let value = pool.block_on(pool.spawn(async { 21 * 2 })).unwrap();
        assert_eq!(value, 42);
        let blocking = pool.block_on(pool.spawn_blocking(|| "done")).unwrap();
        assert_eq!(blocking, "done");
    }

    #[tokio::test]
    async fn test_current_inside_runtime() {
        let pool = WorkerPool::current().unwrap();
        assert!(!pool.is_dedicated());
        assert_eq!(pool.spawn(async { 1 }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dedicated_pool_dropped_inside_runtime() {
        let pool = WorkerPool::dedicated(Some(1)).unwrap();
        let value = pool.spawn(async { 5 }).await.unwrap();
        assert_eq!(value, 5);
        drop(pool);
    }

    #[test]
    fn test_last_clone_dropped_on_own_worker() {
        let pool = WorkerPool::dedicated(Some(2)).unwrap();
        let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let inside = pool.clone();
        pool.spawn(async move {
            let _ = go_rx.await;
            let dropped = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| drop(inside)));
            let _ = done_tx.send(dropped.is_ok());
        });

        drop(pool);
        go_tx.send(()).unwrap();
        let dropped_cleanly = done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert!(dropped_cleanly);
    }

    #[test]
    fn test_current_or_dedicated_falls_back() {
        let pool = WorkerPool::current_or_dedicated(None).unwrap();
        assert!(pool.is_dedicated());
    }
}
