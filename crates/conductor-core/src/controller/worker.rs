//! Bounded worker pool draining the [`WorkQueue`].
//!
//! Each worker takes one key at a time, runs a reconciliation pass, and
//! schedules the key again when the pass asks for it. Passes for different
//! applications run concurrently up to the pool size; the queue guarantees
//! a key is never processed by two workers at once.

use std::sync::Arc;
use std::time::Duration;

use conductor_types::application::AppKey;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::queue::WorkQueue;
use super::reconciler::{Reconcile, ReconcileAction};
use crate::repository::ApplicationRepository;

/// A fixed number of workers sharing one queue and one reconciler.
pub struct WorkerPool<R: Reconcile + 'static> {
    reconciler: Arc<R>,
    queue: WorkQueue,
    workers: usize,
    conflict_backoff: Duration,
}

impl<R: Reconcile + 'static> WorkerPool<R> {
    pub fn new(
        reconciler: Arc<R>,
        queue: WorkQueue,
        workers: usize,
        conflict_backoff: Duration,
    ) -> Self {
        Self {
            reconciler,
            queue,
            workers: workers.max(1),
            conflict_backoff,
        }
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Run until `cancel` fires or the queue shuts down. In-flight passes
    /// finish before this returns.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut set = JoinSet::new();
        for id in 0..self.workers {
            let reconciler = self.reconciler.clone();
            let queue = self.queue.clone();
            let cancel = cancel.clone();
            let backoff = self.conflict_backoff;
            set.spawn(async move {
                worker_loop(id, reconciler, queue, cancel, backoff).await;
            });
        }
        tracing::info!(workers = self.workers, "controller workers started");

        cancel.cancelled().await;
        self.queue.shutdown();
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "controller worker panicked");
            }
        }
        tracing::info!("controller workers stopped");
    }
}

async fn worker_loop<R: Reconcile>(
    id: usize,
    reconciler: Arc<R>,
    queue: WorkQueue,
    cancel: CancellationToken,
    conflict_backoff: Duration,
) {
    loop {
        let key = tokio::select! {
            _ = cancel.cancelled() => break,
            key = queue.get() => match key {
                Some(key) => key,
                None => break,
            },
        };
        process(&*reconciler, &queue, &key, conflict_backoff).await;
        queue.done(&key);
    }
    tracing::debug!(worker = id, "worker exiting");
}

/// Run one pass for `key` and schedule its next one.
pub async fn process<R: Reconcile>(
    reconciler: &R,
    queue: &WorkQueue,
    key: &AppKey,
    conflict_backoff: Duration,
) {
    match reconciler.reconcile(key).await {
        Ok(ReconcileAction::Done) => {
            tracing::debug!(app = %key, "reconciled");
        }
        Ok(ReconcileAction::RequeueAfter(delay)) => {
            tracing::debug!(app = %key, delay_ms = delay.as_millis() as u64, "requeueing");
            queue.add_after(key.clone(), delay);
        }
        Err(e) if e.is_retryable() => {
            tracing::warn!(app = %key, error = %e, "transient reconcile failure, retrying");
            queue.add_after(key.clone(), conflict_backoff);
        }
        Err(e) => {
            tracing::error!(app = %key, error = %e, "reconcile failed");
        }
    }
}

/// Enqueue every stored application; the periodic re-check of a
/// level-triggered controller.
pub async fn enqueue_all<A: ApplicationRepository>(apps: &A, queue: &WorkQueue) -> usize {
    match apps.list_keys().await {
        Ok(keys) => {
            let count = keys.len();
            for key in keys {
                queue.add(key);
            }
            count
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot list applications for resync");
            0
        }
    }
}

/// Enqueue every application once per `period` until `cancel` fires. The
/// first re-check happens one period after the call; `period` must be
/// non-zero.
pub async fn resync<A: ApplicationRepository>(
    apps: A,
    queue: WorkQueue,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let count = enqueue_all(&apps, &queue).await;
                tracing::debug!(count, "resync enqueued applications");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::ReconcileError;
    use crate::testing::MockApplicationRepository;
    use conductor_types::application::{Application, ApplicationSpec};
    use conductor_types::error::StoreError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records passes and tracks how many run at once per key.
    #[derive(Default)]
    struct CountingReconciler {
        passes: Mutex<BTreeMap<AppKey, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_with: Option<StoreError>,
    }

    impl Reconcile for CountingReconciler {
        async fn reconcile(&self, key: &AppKey) -> Result<ReconcileAction, ReconcileError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            *self.passes.lock().unwrap().entry(key.clone()).or_default() += 1;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(e) => Err(e.clone().into()),
                None => Ok(ReconcileAction::Done),
            }
        }
    }

    #[tokio::test]
    async fn pool_processes_every_key_once() {
        let reconciler = Arc::new(CountingReconciler::default());
        let queue = WorkQueue::new();
        for name in ["a", "b", "c", "a"] {
            queue.add(AppKey::new("default", name));
        }
        let pool = WorkerPool::new(reconciler.clone(), queue.clone(), 2, Duration::from_millis(5));
        let cancel = CancellationToken::new();

        let run = {
            let cancel = cancel.clone();
            async move { pool.run(cancel).await }
        };
        let stop = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        };
        tokio::join!(run, stop);

        let passes = reconciler.passes.lock().unwrap();
        assert_eq!(passes.len(), 3);
        assert!(passes.values().all(|n| *n == 1));
        assert!(reconciler.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn retryable_error_requeues_after_backoff() {
        let reconciler = CountingReconciler {
            fail_with: Some(StoreError::Backend("flaky".to_string())),
            ..CountingReconciler::default()
        };
        let queue = WorkQueue::new();
        let key = AppKey::new("default", "a");

        process(&reconciler, &queue, &key, Duration::ZERO).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resync_enqueues_every_application_each_period() {
        let apps = Arc::new(MockApplicationRepository::default());
        for name in ["a", "b"] {
            apps.put(Application::new("default", name, ApplicationSpec::default()));
        }
        let queue = WorkQueue::new();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(resync(
            apps.clone(),
            queue.clone(),
            Duration::from_secs(60),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(queue.len(), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn permanent_error_is_not_requeued() {
        let reconciler = CountingReconciler {
            fail_with: Some(StoreError::NotFound("gone".to_string())),
            ..CountingReconciler::default()
        };
        let queue = WorkQueue::new();
        let key = AppKey::new("default", "a");

        process(&reconciler, &queue, &key, Duration::ZERO).await;
        assert!(queue.is_empty());
    }
}
