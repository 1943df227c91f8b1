//! Deferred image processing.
//!
//! Upload handlers push [`Task`]s through a [`TaskQueue`]; a single
//! [`ProcessingWorker`] on its own thread drains them strictly in order.
//! Tasks are held in memory only and are lost if the process exits with
//! work still queued.

pub mod task;
pub mod worker;

pub use task::{task_queue, Task, TaskQueue, TaskReceiver, WorkerMessage};
pub use worker::{
    ProcessedEvent, ProcessingWorker, WorkerHandle, PROCESSED_EVENT, WORKER_THREAD_NAME,
};
