//! Validation Orchestrator
//!
//! Fans out one task per discovered XML file and merges what they report:
//! - **Async I/O**: file discovery and task scheduling on tokio
//! - **Blocking parse**: each file is tokenized on the blocking pool, so a large
//!   document never stalls the scheduler
//! - **Bounded concurrency**: a semaphore caps the number of files in flight
//! - **Single-writer merge**: tasks own their diagnostics until they finish; only
//!   the orchestrator appends to the run's list
//!
//! The script index is built completely before the first task starts and is
//! shared read-only through an `Arc`.

use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diagnostic::DiagnosticRecord;
use crate::error::Result;
use crate::file_discovery::{FileDiscovery, FileReference};
use crate::rules::{RuleRegistry, RuleSet};
use crate::script_index::ScriptReferenceIndex;
use crate::xml_validator;

/// Validation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Number of files validated at the same time
    pub max_concurrent_validations: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: num_cpus::get(),
        }
    }
}

/// Stops scheduling new validation tasks once cancelled. Tasks already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Status of a single file validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationStatus {
    /// Parsed to the end without findings
    Clean,
    /// At least one diagnostic was recorded
    Findings { count: usize },
    /// The file could not be read; an `IO-ERROR` diagnostic was recorded
    IoError { message: String },
    /// Never validated because the run was cancelled
    Skipped { reason: String },
}

impl ValidationStatus {
    pub fn is_clean(&self) -> bool {
        matches!(self, ValidationStatus::Clean)
    }

    pub fn has_findings(&self) -> bool {
        matches!(self, ValidationStatus::Findings { .. })
    }

    pub fn is_io_error(&self) -> bool {
        matches!(self, ValidationStatus::IoError { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ValidationStatus::Skipped { .. })
    }
}

/// Result of validating a single file
#[derive(Debug, Clone, Serialize)]
pub struct FileValidationResult {
    /// Root-relative reference of the validated file
    pub file: String,
    pub status: ValidationStatus,
    pub duration: Duration,
}

impl FileValidationResult {
    pub fn validated(file: &FileReference, diagnostic_count: usize, duration: Duration) -> Self {
        let status = if diagnostic_count == 0 {
            ValidationStatus::Clean
        } else {
            ValidationStatus::Findings {
                count: diagnostic_count,
            }
        };
        Self {
            file: file.relative().to_string(),
            status,
            duration,
        }
    }

    pub fn io_error(file: &FileReference, message: String, duration: Duration) -> Self {
        Self {
            file: file.relative().to_string(),
            status: ValidationStatus::IoError { message },
            duration,
        }
    }

    pub fn skipped(file: &FileReference, reason: &str) -> Self {
        Self {
            file: file.relative().to_string(),
            status: ValidationStatus::Skipped {
                reason: reason.to_string(),
            },
            duration: Duration::ZERO,
        }
    }
}

/// What one task hands back to the orchestrator
struct TaskOutcome {
    result: FileValidationResult,
    diagnostics: Vec<DiagnosticRecord>,
}

impl TaskOutcome {
    fn io_error(file: &FileReference, details: impl std::fmt::Display, duration: Duration) -> Self {
        let record = DiagnosticRecord::io_error(file.relative(), &details);
        Self {
            result: FileValidationResult::io_error(file, record.message.clone(), duration),
            diagnostics: vec![record],
        }
    }
}

/// Progress update for validation
#[derive(Debug, Clone)]
pub struct ValidationProgress {
    /// File that just finished
    pub current_file: Option<String>,
    pub completed: usize,
    pub total: usize,
    pub phase: ValidationPhase,
}

/// Phase of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    Discovery,
    Indexing,
    Validation,
    Complete,
}

/// Progress callback type for validation updates
pub type ProgressCallback = Arc<dyn Fn(ValidationProgress) + Send + Sync>;

/// Merged results of validating many files
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResults {
    pub total_files: usize,
    pub clean_files: usize,
    pub files_with_findings: usize,
    pub io_error_files: usize,
    pub skipped_files: usize,
    /// Sum of per-file validation time
    pub total_duration: Duration,
    pub file_results: Vec<FileValidationResult>,
    /// Every diagnostic of the run; per-file document order is preserved
    pub diagnostics: Vec<DiagnosticRecord>,
}

impl ValidationResults {
    /// Append one finished file. Only the orchestrator calls this.
    fn merge(&mut self, outcome: TaskOutcome) {
        self.total_files += 1;
        match outcome.result.status {
            ValidationStatus::Clean => self.clean_files += 1,
            ValidationStatus::Findings { .. } => self.files_with_findings += 1,
            ValidationStatus::IoError { .. } => self.io_error_files += 1,
            ValidationStatus::Skipped { .. } => self.skipped_files += 1,
        }
        self.total_duration += outcome.result.duration;
        self.file_results.push(outcome.result);
        self.diagnostics.extend(outcome.diagnostics);
    }

    /// Number of Error-severity diagnostics
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(DiagnosticRecord::is_error)
    }
}

/// Everything a report needs about one completed scan
#[derive(Debug, Clone)]
pub struct ValidationRun {
    pub registry: RuleRegistry,
    pub files: Vec<FileReference>,
    pub script_count: usize,
    pub results: ValidationResults,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ValidationRun {
    pub fn diagnostics(&self) -> &[DiagnosticRecord] {
        &self.results.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.results.has_errors()
    }

    /// 0 when no Error-severity diagnostic was recorded, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.has_errors() { 1 } else { 0 }
    }
}

/// Drives discovery, indexing and concurrent validation of a forms tree
pub struct ValidationEngine {
    registry: RuleRegistry,
    config: ValidationConfig,
    cancellation: CancellationToken,
}

impl ValidationEngine {
    /// Create a new engine. Fails if the rule registry is inconsistent.
    pub fn new(config: ValidationConfig) -> Result<Self> {
        Ok(Self {
            registry: RuleRegistry::load(RuleSet::Scan)?,
            config,
            cancellation: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Scan `root`: discover XML and script files, index the scripts, validate.
    pub async fn scan(
        &self,
        root: &Path,
        xml_discovery: &FileDiscovery,
        script_discovery: &FileDiscovery,
    ) -> Result<ValidationRun> {
        self.scan_with_progress(root, xml_discovery, script_discovery, None)
            .await
    }

    /// Scan `root` with progress tracking
    pub async fn scan_with_progress(
        &self,
        root: &Path,
        xml_discovery: &FileDiscovery,
        script_discovery: &FileDiscovery,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<ValidationRun> {
        let started_at = Utc::now();
        notify_progress(&progress_callback, None, 0, 0, ValidationPhase::Discovery);

        let files = xml_discovery.discover_files(root).await?;
        let scripts = script_discovery.discover_files(root).await?;
        info!(
            root = %root.display(),
            xml_files = files.len(),
            script_files = scripts.len(),
            "discovered files"
        );

        notify_progress(&progress_callback, None, 0, files.len(), ValidationPhase::Indexing);
        let index = Arc::new(ScriptReferenceIndex::build(&scripts));

        let results = self
            .validate_files_with_progress(files.clone(), index, progress_callback.clone())
            .await;

        notify_progress(
            &progress_callback,
            None,
            results.total_files,
            results.total_files,
            ValidationPhase::Complete,
        );

        Ok(ValidationRun {
            registry: self.registry.clone(),
            files,
            script_count: scripts.len(),
            results,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Validate files concurrently against a prebuilt script index
    pub async fn validate_files(
        &self,
        files: Vec<FileReference>,
        index: Arc<ScriptReferenceIndex>,
    ) -> ValidationResults {
        self.validate_files_with_progress(files, index, None).await
    }

    /// Validate files concurrently with progress tracking.
    ///
    /// Never fails: unreadable files and crashed tasks become `IO-ERROR` diagnostics.
    pub async fn validate_files_with_progress(
        &self,
        files: Vec<FileReference>,
        index: Arc<ScriptReferenceIndex>,
        progress_callback: Option<ProgressCallback>,
    ) -> ValidationResults {
        let mut results = ValidationResults::default();
        if files.is_empty() {
            return results;
        }

        let total_files = files.len();
        let completed = Arc::new(AtomicUsize::new(0));

        // Create a semaphore to limit concurrent validations
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.max_concurrent_validations.max(1),
        ));

        let validation_tasks: Vec<_> = files
            .iter()
            .cloned()
            .map(|file| {
                let index = Arc::clone(&index);
                let semaphore = Arc::clone(&semaphore);
                let cancellation = self.cancellation.clone();
                let progress_callback = progress_callback.clone();
                let completed = Arc::clone(&completed);

                tokio::spawn(async move {
                    let outcome = match semaphore.acquire().await {
                        Ok(_permit) if cancellation.is_cancelled() => TaskOutcome {
                            result: FileValidationResult::skipped(&file, "run cancelled"),
                            diagnostics: Vec::new(),
                        },
                        Ok(_permit) => {
                            Self::validate_single_file_internal(file.clone(), index).await
                        }
                        Err(_) => TaskOutcome {
                            result: FileValidationResult::skipped(&file, "validation pool closed"),
                            diagnostics: Vec::new(),
                        },
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    notify_progress(
                        &progress_callback,
                        Some(file.relative().to_string()),
                        done,
                        total_files,
                        ValidationPhase::Validation,
                    );

                    outcome
                })
            })
            .collect();

        let task_results = join_all(validation_tasks).await;

        for (file, task_result) in files.iter().zip(task_results) {
            let outcome = match task_result {
                Ok(outcome) => outcome,
                Err(e) => TaskOutcome::io_error(
                    file,
                    format!("validation task failed: {}", e),
                    Duration::ZERO,
                ),
            };
            results.merge(outcome);
        }

        if results.io_error_files == 0 {
            info!(files = results.total_files, "All validations completed");
        } else {
            warn!(
                files = results.total_files,
                failed = results.io_error_files,
                "At least one task failed"
            );
        }

        results
    }

    /// Validate a single file on the blocking pool
    async fn validate_single_file_internal(
        file: FileReference,
        index: Arc<ScriptReferenceIndex>,
    ) -> TaskOutcome {
        let start_time = Instant::now();
        debug!(file = %file.relative(), "validating");

        let task_file = file.clone();
        let validation_result =
            tokio::task::spawn_blocking(move || xml_validator::validate_file(&task_file, &index))
                .await;

        let duration = start_time.elapsed();
        match validation_result {
            Ok(Ok(diagnostics)) => TaskOutcome {
                result: FileValidationResult::validated(&file, diagnostics.len(), duration),
                diagnostics,
            },
            Ok(Err(e)) => TaskOutcome::io_error(&file, e, duration),
            Err(e) => {
                TaskOutcome::io_error(&file, format!("validation task failed: {}", e), duration)
            }
        }
    }

    /// Validate one file with the same task-fatal handling as a full run
    pub async fn validate_single_file(
        &self,
        file: &FileReference,
        index: Arc<ScriptReferenceIndex>,
    ) -> (FileValidationResult, Vec<DiagnosticRecord>) {
        let outcome = Self::validate_single_file_internal(file.clone(), index).await;
        (outcome.result, outcome.diagnostics)
    }
}

fn notify_progress(
    callback: &Option<ProgressCallback>,
    current_file: Option<String>,
    completed: usize,
    total: usize,
    phase: ValidationPhase,
) {
    if let Some(callback) = callback {
        callback(ValidationProgress {
            current_file,
            completed,
            total,
            phase,
        });
    }
}
