//! Unbounded FIFO handoff from upload handlers to the processing worker.

use std::path::PathBuf;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// One unit of deferred processing for a single uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Location of the stored file
    pub path: PathBuf,

    /// Category label, e.g. `cert`, `snap`, `event`, `profile`, `resume`
    pub kind: String,

    /// Stored filename (also the thumbnail filename)
    pub name: String,
}

impl Task {
    pub fn new(path: impl Into<PathBuf>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// What travels over the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    Process(Task),

    /// Poison pill: the worker stops after everything queued before it
    Shutdown,
}

/// Receiving end, owned by the worker.
pub type TaskReceiver = UnboundedReceiver<WorkerMessage>;

/// Producer handle. Cheap to clone; enqueueing never blocks.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: UnboundedSender<WorkerMessage>,
}

/// Create a connected queue and receiver.
pub fn task_queue() -> (TaskQueue, TaskReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (TaskQueue { sender }, receiver)
}

impl TaskQueue {
    /// Hand a task to the worker.
    ///
    /// Returns `false` if the worker has already stopped; the task is lost.
    pub fn enqueue(&self, task: Task) -> bool {
        let name = task.name.clone();
        match self.sender.send(WorkerMessage::Process(task)) {
            Ok(()) => {
                tracing::debug!("Queued {} for processing", name);
                true
            }
            Err(_) => {
                tracing::warn!("Processing worker stopped; dropping task for {}", name);
                false
            }
        }
    }

    /// Ask the worker to stop once it reaches this point in the queue.
    pub fn shutdown(&self) {
        if self.sender.send(WorkerMessage::Shutdown).is_err() {
            tracing::debug!("Processing worker already stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
