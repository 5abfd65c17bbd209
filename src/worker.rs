//! The single background thread an icon cache is confined to.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle, ThreadId},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use tokio::sync::oneshot;

type WorkerTask = Box<dyn FnOnce() + Send + 'static>;

enum WorkerCommand {
    Execute(WorkerTask),
    Shutdown,
}

struct WorkerInner {
    sender: mpsc::Sender<WorkerCommand>,
    thread_id: ThreadId,
    name: String,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(WorkerCommand::Shutdown) {
                error!("Failed to send shutdown to {}: {err}", self.name);
            }
            // The last handle can be released by a task running on the worker
            // itself; that thread exits once the task returns.
            if thread::current().id() == self.thread_id {
                return;
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join {}: {join_err:?}", self.name);
            }
        }
    }
}

/// Handle to a serial task queue running on one dedicated thread.
///
/// Cloning shares the same thread. The thread is shut down and joined when the
/// last handle is dropped.
#[derive(Clone)]
pub struct IconWorker {
    inner: Arc<WorkerInner>,
}

impl IconWorker {
    pub fn spawn(name: &str) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let thread_name = name.to_string();

        let worker = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Ok(command) = command_rx.recv() {
                    match command {
                        WorkerCommand::Execute(task) => {
                            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                                error!("Task on {thread_name} panicked");
                            }
                        }
                        WorkerCommand::Shutdown => break,
                    }
                }

                info!("{thread_name} shutting down");
            })
            .with_context(|| format!("failed to spawn worker thread {name}"))?;

        Ok(Self {
            inner: Arc::new(WorkerInner {
                sender: command_tx,
                thread_id: worker.thread().id(),
                name: name.to_string(),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Panics unless called from the worker thread.
    #[track_caller]
    pub fn assert_current(&self) {
        if !self.is_current() {
            panic!(
                "icon cache accessed from thread '{}'; it is confined to worker '{}'",
                thread::current().name().unwrap_or("<unnamed>"),
                self.inner.name
            );
        }
    }

    /// Queues `task` and returns immediately.
    pub fn post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .sender
            .send(WorkerCommand::Execute(Box::new(task)))
            .map_err(|err| anyhow!("failed to send task to {}: {err}", self.inner.name))
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let reply_rx = self.submit(task)?;
        reply_rx
            .await
            .map_err(|_| anyhow!("{} dropped the task before completing it", self.inner.name))
    }

    /// Runs `task` on the worker and blocks until it finishes. Runs inline when
    /// already on the worker. Must not be called from inside an async runtime.
    pub fn execute_blocking<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current() {
            return Ok(task());
        }

        let reply_rx = self.submit(task)?;
        reply_rx
            .blocking_recv()
            .map_err(|_| anyhow!("{} dropped the task before completing it", self.inner.name))
    }

    fn submit<F, T>(&self, task: F) -> Result<oneshot::Receiver<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(move || {
            if reply_tx.send(task()).is_err() {
                error!("Worker caller dropped before receiving result");
            }
        })?;
        Ok(reply_rx)
    }
}
