use crate::error::IngestError;
use crate::progress::ProgressReporter;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

/// Raised by the caller to stop workers from claiming further jobs.
pub type CancelToken = Arc<AtomicBool>;

#[derive(Debug, Clone)]
pub enum JobOutcome<T> {
    Success(T),
    Failure(IngestError),
    /// Never started because the run was cancelled first.
    Cancelled,
}

impl<T> JobOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobOutcome::Cancelled)
    }
}

/// Fixed-size worker pool over an index-addressed job list.
pub struct Executor {
    workers: usize,
}

impl Executor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over every job with at most `workers` jobs active at once.
    ///
    /// Outcomes come back in job order. A failing or panicking job is recorded
    /// against its own index only. Once `cancel` is raised no new job is
    /// claimed; jobs already running finish and the rest report `Cancelled`.
    pub fn run<J, T, F>(
        &self,
        jobs: &[J],
        cancel: &AtomicBool,
        reporter: &dyn ProgressReporter,
        work: F,
    ) -> Result<Vec<JobOutcome<T>>, IngestError>
    where
        J: Sync,
        T: Send + Sync,
        F: Fn(usize, &J) -> Result<T, IngestError> + Sync,
    {
        let total = jobs.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let worker_count = self.workers.min(total);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("ingest-worker-{}", i))
            .build()
            .map_err(|e| IngestError::Config(format!("could not start worker pool: {}", e)))?;
        debug!("Running {} jobs on {} workers", total, worker_count);

        let slots: Vec<OnceLock<JobOutcome<T>>> = (0..total).map(|_| OnceLock::new()).collect();
        let cursor = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);

        pool.scope(|s| {
            for _ in 0..worker_count {
                s.spawn(|_| loop {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= total {
                        break;
                    }

                    let outcome =
                        match panic::catch_unwind(AssertUnwindSafe(|| work(index, &jobs[index]))) {
                            Ok(Ok(value)) => JobOutcome::Success(value),
                            Ok(Err(e)) => JobOutcome::Failure(e),
                            Err(payload) => {
                                let message = panic_message(payload.as_ref());
                                error!("Job {} panicked: {}", index, message);
                                JobOutcome::Failure(IngestError::JobPanicked(message))
                            }
                        };
                    let _ = slots[index].set(outcome);

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    reporter.on_parse_progress(done, total);
                });
            }
        });

        let outcomes: Vec<JobOutcome<T>> = slots
            .into_iter()
            .map(|slot| slot.into_inner().unwrap_or(JobOutcome::Cancelled))
            .collect();
        let cancelled = outcomes.iter().filter(|o| o.is_cancelled()).count();
        if cancelled > 0 {
            info!("Run cancelled, {} of {} jobs never started", cancelled, total);
        }
        Ok(outcomes)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
