//! Single background consumer for the task queue.
//!
//! The worker runs on its own OS thread and handles one task at a time in
//! submission order:
//!
//! ```text
//! recv ──▶ AdvancedEnhancer ──▶ ThumbnailGenerator ──▶ publish("processed")
//!  ▲                                                          │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A panic inside one iteration is caught and logged; the loop moves on.
//! The loop ends on [`WorkerMessage::Shutdown`] or when every
//! [`TaskQueue`](super::TaskQueue) handle has been dropped.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use serde_json::{json, Value};

use super::task::{Task, TaskReceiver, WorkerMessage};
use crate::events::BroadcastHub;
use crate::imaging::{AdvancedEnhancer, ThumbnailGenerator};
use crate::uploads::UploadLayout;

/// Event name published after a task completes.
pub const PROCESSED_EVENT: &str = "processed";

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "image-worker";

/// Payload of a `processed` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub kind: String,
    pub name: String,
    pub url: String,
    pub thumb: String,
}

impl ProcessedEvent {
    pub fn for_task(task: &Task, layout: &UploadLayout) -> Self {
        Self {
            kind: task.kind.clone(),
            name: task.name.clone(),
            url: layout.url(&task.name),
            thumb: layout.thumb_url(&task.name),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.kind,
            "name": self.name,
            "url": self.url,
            "thumb": self.thumb,
        })
    }
}

/// Drains the task queue: enhance, re-thumbnail, notify.
pub struct ProcessingWorker {
    enhancer: AdvancedEnhancer,
    thumbnails: ThumbnailGenerator,
    layout: UploadLayout,
    hub: BroadcastHub,
}

impl ProcessingWorker {
    pub fn new(
        enhancer: AdvancedEnhancer,
        thumbnails: ThumbnailGenerator,
        layout: UploadLayout,
        hub: BroadcastHub,
    ) -> Self {
        Self {
            enhancer,
            thumbnails,
            layout,
            hub,
        }
    }

    /// Process one task and publish its completion.
    pub fn process(&self, task: &Task) -> ProcessedEvent {
        let report = self.enhancer.enhance(&task.path);
        tracing::debug!(
            "Advanced enhance of {}: {} stages, wrote file: {}",
            task.name,
            report.stages().len(),
            report.wrote_file()
        );

        let thumb_path = self.layout.thumb_path(&task.path);
        self.thumbnails.generate(&task.path, &thumb_path);

        let event = ProcessedEvent::for_task(task, &self.layout);
        let delivered = self.hub.publish(PROCESSED_EVENT, event.to_json());
        tracing::info!(
            "Processed {} ({}), notified {} subscribers",
            task.name,
            task.kind,
            delivered
        );
        event
    }

    /// Blocking loop. Returns the number of tasks processed without panicking.
    ///
    /// Must not be called from inside an async runtime.
    pub fn run(self, mut receiver: TaskReceiver) -> usize {
        tracing::info!("Processing worker started");
        let processed = drain(&mut receiver, |task| {
            self.process(task);
        });
        tracing::info!("Processing worker stopped after {} tasks", processed);
        processed
    }

    /// Run the loop on a dedicated named thread.
    pub fn spawn(self, receiver: TaskReceiver) -> io::Result<WorkerHandle> {
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run(receiver))?;
        Ok(WorkerHandle { thread })
    }
}

/// Feed queued tasks to `handle` until shutdown or until every sender is
/// gone. A panicking task is logged and does not count as processed.
fn drain(receiver: &mut TaskReceiver, mut handle: impl FnMut(&Task)) -> usize {
    let mut processed = 0;

    while let Some(message) = receiver.blocking_recv() {
        let task = match message {
            WorkerMessage::Process(task) => task,
            WorkerMessage::Shutdown => {
                tracing::info!("Processing worker received shutdown");
                break;
            }
        };

        match catch_unwind(AssertUnwindSafe(|| handle(&task))) {
            Ok(()) => processed += 1,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Processing {} panicked: {}", task.name, reason);
            }
        }
    }

    processed
}

/// Handle to the worker thread.
pub struct WorkerHandle {
    thread: JoinHandle<usize>,
}

impl WorkerHandle {
    /// Wait for the worker to exit. Returns the number of tasks processed.
    pub fn join(self) -> usize {
        match self.thread.join() {
            Ok(processed) => processed,
            Err(_) => {
                tracing::error!("Processing worker thread panicked");
                0
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}
