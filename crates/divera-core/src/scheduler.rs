// ── Scheduling ──
//
// The poll coordinator never owns a timer. It is registered as a periodic
// job with a `Scheduler`, which asks the job for its next delay before
// every run, so interval changes take effect at the next tick.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Work executed repeatedly with a delay chosen by the job itself.
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> String;

    /// One iteration. Errors are the job's own business.
    fn run(&self) -> BoxFuture<'_, ()>;

    /// Delay before the next iteration, read after every run.
    fn next_delay(&self) -> Duration;
}

/// Registers periodic jobs; the returned handle cancels them.
pub trait Scheduler: Send + Sync {
    fn register(&self, job: Arc<dyn PeriodicJob>) -> ScheduledTask;
}

/// Handle to a registered job. Dropping it cancels the job.
pub struct ScheduledTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn new(cancel: CancellationToken, handle: Option<JoinHandle<()>>) -> Self {
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for the job's task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Tokio ───────────────────────────────────────────────────────────

/// Runs each job on its own tokio task.
///
/// A cancelled job stops at its next await point; an in-flight request is
/// dropped with it.
#[derive(Default)]
pub struct TokioScheduler {
    root: CancellationToken,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every job registered with this scheduler.
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

impl Scheduler for TokioScheduler {
    fn register(&self, job: Arc<dyn PeriodicJob>) -> ScheduledTask {
        let cancel = self.root.child_token();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let delay = job.next_delay();
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = job.run() => {}
                }
            }
            debug!(job = %job.name(), "periodic job stopped");
        });

        ScheduledTask::new(cancel, Some(handle))
    }
}

// ── Manual ──────────────────────────────────────────────────────────

type JobSlot = (CancellationToken, Arc<dyn PeriodicJob>);

/// Scheduler driven by explicit [`tick`](Self::tick) calls.
///
/// For hosts with their own timer loop, and for tests.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    jobs: Arc<Mutex<Vec<JobSlot>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_jobs(&self) -> Vec<Arc<dyn PeriodicJob>> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.retain(|(token, _)| !token.is_cancelled());
        jobs.iter().map(|(_, job)| Arc::clone(job)).collect()
    }

    /// Run every live job once. Returns how many ran.
    pub async fn tick(&self) -> usize {
        let jobs = self.live_jobs();
        for job in &jobs {
            job.run().await;
        }
        jobs.len()
    }

    /// Name and next delay of every live job.
    pub fn delays(&self) -> Vec<(String, Duration)> {
        self.live_jobs()
            .iter()
            .map(|job| (job.name(), job.next_delay()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.live_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Scheduler for ManualScheduler {
    fn register(&self, job: Arc<dyn PeriodicJob>) -> ScheduledTask {
        let cancel = CancellationToken::new();
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((cancel.clone(), job));
        ScheduledTask::new(cancel, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: AtomicUsize,
    }

    impl PeriodicJob for Counter {
        fn name(&self) -> String {
            "counter".into()
        }

        fn run(&self) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.runs.fetch_add(1, Ordering::SeqCst);
            })
        }

        fn next_delay(&self) -> Duration {
            Duration::from_secs(30)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_runs_after_each_delay_until_cancelled() {
        let job = Arc::new(Counter {
            runs: AtomicUsize::new(0),
        });
        let scheduler = TokioScheduler::new();
        let task = scheduler.register(Arc::clone(&job) as Arc<dyn PeriodicJob>);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 3);

        task.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn manual_scheduler_skips_cancelled_jobs() {
        let scheduler = ManualScheduler::new();
        let job = Arc::new(Counter {
            runs: AtomicUsize::new(0),
        });
        let task = scheduler.register(Arc::clone(&job) as Arc<dyn PeriodicJob>);
        assert_eq!(scheduler.tick().await, 1);
        assert_eq!(scheduler.delays(), vec![("counter".to_string(), Duration::from_secs(30))]);

        drop(task);
        assert_eq!(scheduler.tick().await, 0);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }
}
