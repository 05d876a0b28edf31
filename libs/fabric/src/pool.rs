use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Error, Result};

/// Small shared worker pool
///
/// Backs channel lifecycle work (open, close, receive loops). Cloning is
/// cheap; all clones drive the same runtime. Once [`shutdown_now`] has run,
/// every further `spawn`/`block_on` fails with [`Error::PoolShutdown`].
///
/// [`shutdown_now`]: WorkerPool::shutdown_now
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    shut_down: AtomicBool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("courier-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        Ok(Self {
            inner: Arc::new(Inner {
                runtime: Mutex::new(Some(runtime)),
                handle,
                shut_down: AtomicBool::new(false),
                threads,
            }),
        })
    }

    pub fn threads(&self) -> usize {
        self.inner.threads
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Run a task on the pool
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(Error::PoolShutdown);
        }
        Ok(self.inner.handle.spawn(future))
    }

    /// Block the calling thread until `future` completes on the pool
    ///
    /// Must be called from a plain thread; calling it from inside any tokio
    /// runtime is an error rather than a deadlock.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        self.ensure_blocking()?;
        Ok(self.inner.handle.block_on(future))
    }

    /// Fails unless the caller may block on pool work: the pool is running
    /// and the current thread is not inside a tokio runtime.
    pub fn ensure_blocking(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::PoolShutdown);
        }
        if Handle::try_current().is_ok() {
            return Err(Error::Custom(
                "blocking pool call made from inside an async runtime".to_string(),
            ));
        }
        Ok(())
    }

    /// Stop the pool without draining outstanding work
    pub fn shutdown_now(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(runtime) = self.inner.runtime.lock().take() {
            debug!(threads = self.inner.threads, "shutting down worker pool");
            runtime.shutdown_background();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.inner.threads)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
