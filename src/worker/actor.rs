//! Worker thread and mailbox
//!
//! Requests reach the worker through an unbounded mailbox drained by a single
//! command task. The task runs on a dedicated thread with its own
//! current-thread runtime, so engine calls may block freely and requests are
//! served strictly one at a time, in submission order.

use super::Worker;
use crate::error::{ConnectionError, Result};
use crate::protocol::{BuildParameters, HandlerGuard, ModelKind, OperationParameters, ProjectModel};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Requests understood by the worker
pub(crate) enum WorkerCommand {
    /// Build a model of the given kind
    BuildModel {
        kind: ModelKind,
        parameters: OperationParameters,
        handler: HandlerGuard<ProjectModel>,
    },
    /// Execute a build
    Build {
        build: BuildParameters,
        parameters: OperationParameters,
        handler: HandlerGuard<()>,
    },
}

impl WorkerCommand {
    /// Drop the command without notifying its handler
    fn disarm(self) {
        match self {
            WorkerCommand::BuildModel { handler, .. } => handler.disarm(),
            WorkerCommand::Build { handler, .. } => handler.disarm(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            WorkerCommand::BuildModel { .. } => "model fetch",
            WorkerCommand::Build { .. } => "build",
        }
    }
}

/// Owning handle to a running worker thread
pub(crate) struct WorkerHandle {
    cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    thread: JoinHandle<()>,
    thread_id: ThreadId,
}

impl WorkerHandle {
    /// Start the worker thread
    pub(crate) fn spawn(worker: Worker, thread_name: &str) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let thread = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || runtime.block_on(command_task(cmd_rx, worker)))?;

        info!("Worker thread '{}' started", thread_name);

        Ok(Self {
            cmd_tx,
            thread_id: thread.thread().id(),
            thread,
        })
    }

    /// Queue a command
    ///
    /// If the mailbox is already closed the command's handler is dropped
    /// silently; the caller learns about it through the returned error.
    pub(crate) fn submit(&self, command: WorkerCommand) -> Result<()> {
        debug!("Queueing {} request", command.describe());
        self.cmd_tx.send(command).map_err(|mpsc::error::SendError(command)| {
            command.disarm();
            ConnectionError::IllegalState("Worker is no longer accepting requests".to_string())
        })
    }

    /// Close the mailbox
    ///
    /// Requests already queued are still served. With `join` set, waits for
    /// the worker thread to finish them, unless called from that thread.
    pub(crate) fn shutdown(self, join: bool) {
        let Self {
            cmd_tx,
            thread,
            thread_id,
        } = self;
        drop(cmd_tx);

        if !join {
            debug!("Worker mailbox closed, not waiting for worker thread");
            return;
        }

        if thread::current().id() == thread_id {
            warn!("Stop requested from the worker thread itself, not joining");
            return;
        }

        if thread.join().is_err() {
            warn!("Worker thread terminated with a panic");
        } else {
            info!("Worker thread stopped");
        }
    }
}

/// Drain the mailbox until every sender is gone
async fn command_task(mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>, worker: Worker) {
    info!("Command task started (logging scope {})", worker.logging().id());

    while let Some(cmd) = cmd_rx.recv().await {
        worker.dispatch(cmd);
    }

    info!("Command task stopped");
}
