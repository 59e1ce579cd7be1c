//! Core data model: the records that flow through the pipeline
//! `RunConfig + []ParsedFile → WorkQueue → WorkerPool → SubprocessDriver →
//! OutputParser → Aggregator → RunResult`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether a [`WorkItem`] drives one test in isolation or a whole file.
///
/// Modeled as a tagged enum (rather than a string "mode") so the driver's
/// command-construction branch is exhaustive and the compiler catches a
/// missing arm, per the redesign note against dynamic dispatch on mode
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkKind {
    /// Run a single test, isolated via a name-pattern selector.
    PerTest { test_name: String },
    /// Run every test in the file, letting the framework's own (capped)
    /// internal parallelism handle it.
    PerFile { expected_test_count: usize },
}

/// The smallest unit dispatched to a subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub kind: WorkKind,
    pub file_path: PathBuf,
}

impl WorkItem {
    pub fn per_test(file_path: PathBuf, test_name: impl Into<String>) -> Self {
        WorkItem {
            kind: WorkKind::PerTest {
                test_name: test_name.into(),
            },
            file_path,
        }
    }

    pub fn per_file(file_path: PathBuf, expected_test_count: usize) -> Self {
        WorkItem {
            kind: WorkKind::PerFile {
                expected_test_count,
            },
            file_path,
        }
    }

    pub fn expected_test_count(&self) -> usize {
        match &self.kind {
            WorkKind::PerTest { .. } => 1,
            WorkKind::PerFile {
                expected_test_count,
            } => *expected_test_count,
        }
    }
}

/// A single test discovered in a source file, as produced by the Discovery
/// collaborator. Not mutated by the core; consumed only to build `WorkItem`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTest {
    pub id: String,
    pub name: String,
    pub suite_path: Vec<String>,
    pub skip: bool,
    pub only: bool,
    pub concurrent: bool,
}

/// A test-definition file as discovered and parsed by the Discovery
/// collaborator (out of core scope; supplied to the core as a contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub file_path: PathBuf,
    pub tests: Vec<ParsedTest>,
    pub has_before_all: bool,
    pub has_after_all: bool,
    pub has_before_each: bool,
    pub has_after_each: bool,
}

/// Outcome of a single test, as reconstructed by the [`crate::parser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Todo,
}

impl TestStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, TestStatus::Failed)
    }
}

/// A single test's reconstructed outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub name: String,
    pub suite: String,
    pub file_path: PathBuf,
    pub status: TestStatus,
    pub duration_ms: u64,
    /// Populated only when `status == Failed`.
    pub error: Option<String>,
    /// Which worker slot produced this result (correlation only).
    pub worker_id: usize,
}

/// The default diagnostic text attached to a failed test when the parser
/// could not recover the framework's own message.
pub const NO_DIAGNOSTIC: &str = "Test failed (no parsed diagnostic)";

/// The status of a whole file-level invocation (one `WorkItem`, exactly one
/// `FileResult`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Passed,
    Failed,
}

/// The result of dispatching exactly one `WorkItem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub file_path: PathBuf,
    pub status: FileStatus,
    pub test_results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub raw_stdout: String,
    pub raw_stderr: String,
    pub exit_code: i32,
    pub error: Option<String>,
}

impl FileResult {
    /// Builds a synthetic `FileResult` for failures that never reach the
    /// parser (spawn error, timeout, empty output, internal fallback).
    pub fn synthetic_failure(
        file_path: PathBuf,
        duration_ms: u64,
        exit_code: i32,
        raw_stdout: String,
        raw_stderr: String,
        error: impl Into<String>,
    ) -> Self {
        FileResult {
            file_path,
            status: FileStatus::Failed,
            test_results: Vec::new(),
            passed: 0,
            failed: 0,
            skipped: 0,
            duration_ms,
            raw_stdout,
            raw_stderr,
            exit_code,
            error: Some(error.into()),
        }
    }

    /// Builds a `FileResult` carrying only statically-known-skipped tests
    /// (PerTest mode never dispatches a subprocess for a skip-flagged
    /// test, so there is no raw output to parse).
    pub fn from_skipped_tests(file_path: PathBuf, test_results: Vec<TestResult>) -> Self {
        let skipped = test_results.len();
        FileResult {
            file_path,
            status: FileStatus::Passed,
            test_results,
            passed: 0,
            failed: 0,
            skipped,
            duration_ms: 0,
            raw_stdout: String::new(),
            raw_stderr: String::new(),
            exit_code: 0,
            error: None,
        }
    }
}

/// Run-wide summary, mirroring the JSON artifact's `summary` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: chrono::DateTime<chrono::Utc>,
}

/// The final, consolidated result of a run. Stable field layout: a
/// reporter renders this directly with no further normalisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub files: Vec<FileResult>,
    pub summary: RunSummary,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        if self.summary.failed == 0 { 0 } else { 1 }
    }
}

/// Immutable copy of the live counters, delivered to `RunConfig.progress_sink`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub running: usize,
    pub completed: usize,
}

/// Either running-time mode named by `RunConfig.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    PerTest,
    PerFile,
}

/// How `RunConfig.test_selector` identifies the files to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestSelector {
    Glob(String),
    Paths(Vec<PathBuf>),
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
