/// Trait for reporting ingest progress.
///
/// All methods have default no-op implementations. Parse progress is called
/// from worker threads.
pub trait ProgressReporter: Send + Sync {
    fn on_detect_start(&self) {}
    fn on_detect_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_parse_start(&self, _total_jobs: usize) {}
    fn on_parse_progress(&self, _jobs_done: usize, _total_jobs: usize) {}
    fn on_parse_complete(&self, _succeeded: usize, _failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
