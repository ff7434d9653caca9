//! Debounced saving
//!
//! Every mutation asks for a save; the request pushes the save deadline to
//! `now + delay`. A single background task owns all writes, so writes never
//! overlap: requests that arrive while a write is in flight collapse into one
//! pending save that runs after it.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::library::Library;
use crate::storage::DocumentStorage;

/// Commands sent to the save task
#[derive(Debug)]
enum SaveCommand {
    /// The library changed; write it once things settle
    Schedule,
    /// Write now if anything is pending
    Flush(oneshot::Sender<Result<()>>),
    /// Write anything pending and stop
    Shutdown(oneshot::Sender<Result<()>>),
}

/// Persistence state as seen from outside
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Everything is on disk
    Saved,
    /// Changes are waiting for the debounce to expire
    Pending,
    /// A write is in flight
    Writing,
    /// The last write failed; changes are still pending
    Failed(String),
}

/// Handle to the save task
#[derive(Debug, Clone)]
pub struct SaveScheduler {
    command_tx: mpsc::UnboundedSender<SaveCommand>,
    status_rx: watch::Receiver<SaveStatus>,
}

impl SaveScheduler {
    /// Spawn the save task on the current tokio runtime
    pub fn spawn(
        library: Arc<RwLock<Library>>,
        storage: Arc<dyn DocumentStorage>,
        delay: Duration,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SaveStatus::Saved);

        tokio::spawn(save_loop(library, storage, delay, command_rx, status_tx));

        Self {
            command_tx,
            status_rx,
        }
    }

    /// Ask for a save after the debounce delay
    pub fn schedule(&self) {
        if self.command_tx.send(SaveCommand::Schedule).is_err() {
            debug!("Save requested after the save task stopped");
        }
    }

    /// Write pending changes now
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SaveCommand::Flush(reply_tx))
            .map_err(|_| anyhow!("Save task is not running"))?;
        reply_rx.await.context("Save task stopped during flush")?
    }

    /// Write pending changes and stop the task
    pub async fn shutdown(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(SaveCommand::Shutdown(reply_tx)).is_err() {
            return Ok(());
        }
        // A dropped reply means the task had already stopped
        reply_rx.await.unwrap_or(Ok(()))
    }

    pub fn status(&self) -> SaveStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.status_rx.clone()
    }
}

/// Main loop of the save task
async fn save_loop(
    library: Arc<RwLock<Library>>,
    storage: Arc<dyn DocumentStorage>,
    delay: Duration,
    mut command_rx: mpsc::UnboundedReceiver<SaveCommand>,
    status_tx: watch::Sender<SaveStatus>,
) {
    let mut deadline: Option<Instant> = None;
    let mut dirty = false;

    loop {
        let command = match deadline {
            Some(at) => {
                tokio::select! {
                    command = command_rx.recv() => command,
                    _ = sleep_until(at) => {
                        deadline = None;
                        // Failures are logged and kept pending for the next request
                        let _ = write(&library, storage.as_ref(), &status_tx, &mut dirty).await;
                        continue;
                    }
                }
            }
            None => command_rx.recv().await,
        };

        match command {
            Some(SaveCommand::Schedule) => {
                dirty = true;
                deadline = Some(Instant::now() + delay);
                let _ = status_tx.send(SaveStatus::Pending);
            }
            Some(SaveCommand::Flush(reply)) => {
                deadline = None;
                let result = if dirty {
                    write(&library, storage.as_ref(), &status_tx, &mut dirty).await
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Some(SaveCommand::Shutdown(reply)) => {
                let result = if dirty {
                    write(&library, storage.as_ref(), &status_tx, &mut dirty).await
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
                debug!("Save task stopped");
                break;
            }
            None => {
                if dirty {
                    let _ = write(&library, storage.as_ref(), &status_tx, &mut dirty).await;
                }
                debug!("Save task stopped: all handles dropped");
                break;
            }
        }
    }
}

/// Serialize the current library and hand it to storage
async fn write(
    library: &Arc<RwLock<Library>>,
    storage: &dyn DocumentStorage,
    status_tx: &watch::Sender<SaveStatus>,
    dirty: &mut bool,
) -> Result<()> {
    let _ = status_tx.send(SaveStatus::Writing);
    *dirty = false;

    let result = write_snapshot(library, storage).await;
    match &result {
        Ok(()) => {
            info!("Saved library to {}", storage.location());
            let _ = status_tx.send(SaveStatus::Saved);
        }
        Err(e) => {
            warn!("Failed to save library: {:#}", e);
            *dirty = true;
            let _ = status_tx.send(SaveStatus::Failed(format!("{:#}", e)));
        }
    }
    result
}

async fn write_snapshot(library: &Arc<RwLock<Library>>, storage: &dyn DocumentStorage) -> Result<()> {
    let text = {
        let library = library
            .read()
            .map_err(|_| anyhow!("Library lock poisoned"))?;
        library.to_json().context("Failed to serialize library")?
    };
    storage
        .write_document(text)
        .await
        .with_context(|| format!("Failed to write library to {}", storage.location()))
}
