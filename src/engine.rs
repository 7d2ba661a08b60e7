use crate::cache::{CacheKey, CacheLayer, CacheSource, CacheStats};
use crate::config::AppConfig;
use crate::error::{ErrorKind, IngestError};
use crate::executor::{CancelToken, Executor, JobOutcome};
use crate::hasher::fingerprint::read_full_file;
use crate::hasher::Fingerprint;
use crate::model::{Category, NormalizedRecord, ParseOutput, ParseWarning, SchemaGeneration, SourceFile};
use crate::parser::{RecordParser, SchemaTolerantParser};
use crate::progress::ProgressReporter;
use crate::retry::{Retry, RetryPolicy, RetryState};
use crate::scanner::{Detection, Detector, Validation};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct IngestEngine {
    config: AppConfig,
    parser: Arc<dyn RecordParser>,
    cancel: CancelToken,
}

/// One unit of parse work.
#[derive(Debug, Clone)]
pub struct Job {
    pub index: usize,
    pub source: SourceFile,
}

#[derive(Debug)]
struct ParsedFile {
    fingerprint: Fingerprint,
    output: ParseOutput,
    cache: CacheSource,
    retry: RetryState,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileWarning {
    pub path: PathBuf,
    #[serde(flatten)]
    pub warning: ParseWarning,
}

/// Records for one category in job order, with the warnings raised while
/// producing them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Batch {
    pub records: Vec<NormalizedRecord>,
    pub warnings: Vec<FileWarning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    Succeeded {
        records: usize,
        warnings: usize,
        cache: CacheSource,
        /// Parse attempts made by this job; 0 when the result was served
        /// from cache or by another job's computation.
        attempts: u32,
        retry_delays_ms: Vec<u64>,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        attempts: u32,
        exhausted: bool,
    },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub category: Category,
    pub generation: SchemaGeneration,
    /// Absent when the job failed before a fingerprint was taken.
    pub fingerprint: Option<String>,
    pub outcome: EntryOutcome,
}

/// Per-input outcomes for one run. Lists every recognized input exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub root: PathBuf,
    pub entries: Vec<ManifestEntry>,
    pub validation: Validation,
    pub unknown_files: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    pub media_files: usize,
    pub cache_warnings: Vec<String>,
    pub cache: CacheStats,
}

impl Manifest {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, EntryOutcome::Succeeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EntryOutcome::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, EntryOutcome::Cancelled))
    }

    pub fn to_json(&self) -> Result<String, IngestError> {
        serde_json::to_string_pretty(self).map_err(|e| IngestError::Serialization(e.to_string()))
    }

    fn count(&self, pred: impl Fn(&EntryOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

#[derive(Debug)]
pub struct IngestResult {
    pub batches: BTreeMap<Category, Batch>,
    pub manifest: Manifest,
    pub detect_duration: Duration,
    pub parse_duration: Duration,
}

impl IngestResult {
    pub fn records(&self, category: Category) -> &[NormalizedRecord] {
        self.batches
            .get(&category)
            .map(|b| b.records.as_slice())
            .unwrap_or(&[])
    }

    pub fn total_records(&self) -> usize {
        self.batches.values().map(|b| b.records.len()).sum()
    }
}

impl IngestEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            parser: Arc::new(SchemaTolerantParser),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn RecordParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Raise the returned flag to stop scheduling further files. The flag is
    /// lowered again when the next [`run`](Self::run) starts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn detect(&self, root: &Path) -> Result<Detection, IngestError> {
        Detector::new(&self.config.ignore_patterns).detect(root)
    }

    /// Run the full pipeline:
    /// 1. Detect and classify source files
    /// 2. Parse every file through cache(retry(parse)) on a fixed worker pool
    /// 3. Group records by category and build the manifest
    pub fn run(&self, root: &Path, reporter: &dyn ProgressReporter) -> Result<IngestResult, IngestError> {
        self.cancel.store(false, Ordering::SeqCst);

        // Phase 1: Detect
        info!("Detecting export layout under {}", root.display());
        reporter.on_detect_start();
        let detect_start = Instant::now();
        let detection = self.detect(root)?;
        let detect_duration = detect_start.elapsed();
        reporter.on_detect_complete(detection.total_files(), detect_duration.as_secs_f64());
        debug!(
            "Detection completed in {:.2}s: {} files, {} categories",
            detect_duration.as_secs_f64(),
            detection.total_files(),
            detection.recognized_categories(),
        );

        if detection.recognized_categories() == 0 {
            return Err(IngestError::EmptyExport {
                root: detection.root.clone(),
            });
        }
        if !detection.validation.is_valid() {
            warn!(
                "Export is missing anchors ({}), continuing with partial data",
                detection.validation.missing.join(", ")
            );
        }

        // Phase 2: Parse
        let jobs: Vec<Job> = detection
            .sources()
            .cloned()
            .enumerate()
            .map(|(index, source)| Job { index, source })
            .collect();
        info!("Parsing {} files...", jobs.len());

        let retry = Retry::new(RetryPolicy::from(&self.config.retry));
        let cache = CacheLayer::new(&self.config.cache, retry.clone());
        let executor = Executor::new(self.config.worker_count());

        reporter.on_parse_start(jobs.len());
        let parse_start = Instant::now();
        let outcomes = executor.run(&jobs, &self.cancel, reporter, |_, job| {
            self.process(job, &cache, &retry)
        })?;
        let parse_duration = parse_start.elapsed();

        // Phase 3: Assemble
        let (batches, entries) = assemble(&jobs, outcomes);
        let manifest = Manifest {
            root: detection.root.clone(),
            entries,
            validation: detection.validation.clone(),
            unknown_files: detection.unknown.clone(),
            skipped_files: detection.skipped.clone(),
            media_files: detection.media_files,
            cache_warnings: cache.take_warnings(),
            cache: cache.stats(),
        };
        reporter.on_parse_complete(
            manifest.succeeded(),
            manifest.failed(),
            parse_duration.as_secs_f64(),
        );
        debug!(
            "Parse completed in {:.2}s: {} succeeded, {} failed, {} cancelled",
            parse_duration.as_secs_f64(),
            manifest.succeeded(),
            manifest.failed(),
            manifest.cancelled(),
        );

        Ok(IngestResult {
            batches,
            manifest,
            detect_duration,
            parse_duration,
        })
    }

    fn process(&self, job: &Job, cache: &CacheLayer, retry: &Retry) -> Result<ParsedFile, IngestError> {
        let source = &job.source;
        let fingerprint = retry.run(|| Fingerprint::of(source, self.config.fingerprint))?;
        let key = CacheKey::new(
            self.parser.operation(),
            self.parser.version(),
            source.category,
            fingerprint,
        );

        let mut state = RetryState::default();
        let cached = cache.get_or_compute(&key, || {
            retry.run_tracked(&mut state, || {
                let raw = read_full_file(&source.path).map_err(|e| IngestError::io(&source.path, &e))?;
                self.parser
                    .parse(source.category, &raw)
                    .map_err(|e| e.with_path(&source.path))
            })
        })?;
        if state.attempts > 1 {
            debug!(
                "{} parsed after {} attempts",
                source.path.display(),
                state.attempts
            );
        }

        Ok(ParsedFile {
            fingerprint,
            output: cached.value,
            cache: cached.source,
            retry: state,
        })
    }
}

fn assemble(
    jobs: &[Job],
    outcomes: Vec<JobOutcome<ParsedFile>>,
) -> (BTreeMap<Category, Batch>, Vec<ManifestEntry>) {
    let mut batches: BTreeMap<Category, Batch> = BTreeMap::new();
    let mut entries = Vec::with_capacity(jobs.len());

    for (job, outcome) in jobs.iter().zip(outcomes) {
        let source = &job.source;
        let (fingerprint, outcome) = match outcome {
            JobOutcome::Success(parsed) => {
                let batch = batches.entry(source.category).or_default();
                let outcome = EntryOutcome::Succeeded {
                    records: parsed.output.records.len(),
                    warnings: parsed.output.warnings.len(),
                    cache: parsed.cache,
                    attempts: parsed.retry.attempts,
                    retry_delays_ms: parsed
                        .retry
                        .delays
                        .iter()
                        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                        .collect(),
                };
                batch.records.extend(parsed.output.records);
                batch
                    .warnings
                    .extend(parsed.output.warnings.into_iter().map(|warning| FileWarning {
                        path: source.path.clone(),
                        warning,
                    }));
                (Some(parsed.fingerprint.to_hex()), outcome)
            }
            JobOutcome::Failure(err) => {
                warn!("Failed to ingest {}: {}", source.path.display(), err);
                (
                    None,
                    EntryOutcome::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                        attempts: err.attempts(),
                        exhausted: err.is_exhausted(),
                    },
                )
            }
            JobOutcome::Cancelled => (None, EntryOutcome::Cancelled),
        };
        entries.push(ManifestEntry {
            path: source.path.clone(),
            category: source.category,
            generation: source.generation,
            fingerprint,
            outcome,
        });
    }

    (batches, entries)
}
