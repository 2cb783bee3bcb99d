//! Serial execution context
//!
//! One named thread owns the `IndexManager`. Every index mutation and query
//! is queued to it as a job and runs in submission order, so nothing below
//! the engine needs locking.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc as std_mpsc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::config::EngineConfig;
use crate::index::{IndexManager, QueryError, QueryResult};

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "mango-index";

type Job = Box<dyn FnOnce(&mut IndexManager) + Send>;

/// Result of a queued operation, resolved exactly once.
///
/// Await it from async code, or call `wait()` from a plain thread. If the
/// worker is gone before the job ran, the operation's "closed" value is
/// produced instead.
#[must_use = "a pending result does nothing unless awaited or waited on"]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
    closed: fn() -> T,
}

impl<T> Pending<T> {
    /// Already-resolved result
    pub(crate) fn ready(value: T, closed: fn() -> T) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(value);
        Self { rx, closed }
    }

    /// Block the current thread until the result is available.
    ///
    /// Panics if called from within an async runtime; use `.await` there.
    pub fn wait(self) -> T {
        self.rx.blocking_recv().unwrap_or_else(|_| (self.closed)())
    }
}

impl<T> Future for Pending<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(_)) => Poll::Ready((this.closed)()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to the worker thread
pub(crate) struct Worker {
    sender: Option<mpsc::UnboundedSender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Start the thread and open index storage on it.
    ///
    /// Returns once the storage is open, with the open error if it failed.
    pub(crate) fn spawn(config: EngineConfig) -> QueryResult<Self> {
        let (sender, mut jobs) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<QueryResult<()>>(1);

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut manager = match IndexManager::open(&config) {
                    Ok(manager) => {
                        let _ = ready_tx.send(Ok(()));
                        manager
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                while let Some(job) = jobs.blocking_recv() {
                    job(&mut manager);
                }
                debug!("index worker drained, releasing storage");
            })
            .map_err(|e| QueryError::sql(format!("cannot start index worker: {}", e)))?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(QueryError::sql("index worker exited before opening storage"))
        });
        if let Err(err) = opened {
            if handle.join().is_err() {
                error!("index worker panicked while opening storage");
            }
            return Err(err);
        }

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a job; its return value resolves the `Pending`
    pub(crate) fn submit<T, F>(&self, job: F, closed: fn() -> T) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut IndexManager) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |manager| {
            let _ = tx.send(job(manager));
        });

        match &self.sender {
            // a rejected job drops its sender, which resolves `rx` as closed
            Some(sender) => {
                let _ = sender.send(job);
            }
            None => drop(job),
        }
        Pending { rx, closed }
    }

    /// Let queued jobs finish, then stop the thread
    pub(crate) fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                warn!("index worker cannot join itself; detaching");
                return;
            }
            if handle.join().is_err() {
                error!("index worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
