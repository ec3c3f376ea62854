//! Level-triggered reconciliation of applications.
//!
//! - `reconciler` -- one pass over one application: revision, workflow or direct apply
//! - `queue` -- deduplicating work queue, at most one in-flight pass per key
//! - `worker` -- bounded pool of workers draining the queue, plus the periodic resync

pub mod queue;
pub mod reconciler;
pub mod worker;

pub use queue::WorkQueue;
pub use reconciler::{Reconcile, ReconcileAction, ReconcileError, Reconciler};
pub use worker::{WorkerPool, enqueue_all, resync};
