//! # jestpool
//!
//! A parallel test dispatcher for Jest-style test suites. Given a set of
//! test-definition files, it discovers individual test cases, schedules
//! them across a pool of subprocess workers that each invoke the host test
//! framework on a narrowly-scoped selection, captures the framework's
//! human-readable output, reconstructs per-test outcomes, and emits a
//! consolidated report.
//!
//! ## Architecture
//!
//! The crate is organized around the pipeline:
//!
//! ```text
//! RunConfig + []ParsedFile -> WorkQueue -> WorkerPool -> SubprocessDriver
//!     -> raw text -> OutputParser -> per-test results -> Aggregator -> RunResult
//! ```
//!
//! ### Core dispatcher
//!
//! - [`model`] — the data records that flow through the pipeline: `WorkItem`,
//!   `TestResult`, `FileResult`, `RunResult`, `StatusSnapshot`.
//! - [`queue::WorkQueue`] — a bounded, drain-once FIFO of work items.
//! - [`scheduler`] — the worker pool: dispatches up to `max_workers`
//!   subprocesses concurrently and refills freed slots as items complete.
//! - [`driver`] — launches one framework invocation per work item, enforces
//!   the timeout/graceful-kill/forceful-kill policy, and streams
//!   stdout/stderr concurrently.
//! - [`parser`] — reconstructs per-test outcomes from the framework's text
//!   output via a multi-pass tokenize/extract/attach-errors/dedup/reconcile
//!   pipeline.
//! - [`tracker::StatusTracker`] — live pass/fail/skip/running counters,
//!   throttled to the progress sink.
//! - [`aggregator`] — folds per-item results into one `RunResult` and writes
//!   the JSON artifact contract.
//!
//! ### Ambient collaborators
//!
//! These are swappable defaults, not part of the tested core contract:
//!
//! - [`discovery`] — glob-expands a test selector and heuristically parses
//!   Jest-style source files into `ParsedFile` records.
//! - [`report`] — a console reporter that prints a colored summary of a
//!   `RunResult`.
//! - [`config`] — `RunConfig` construction and TOML config-file loading.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use jestpool::config::RunConfig;
//! use jestpool::model::{RunMode, TestSelector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig {
//!         mode: RunMode::PerFile,
//!         max_workers: 4,
//!         timeout: std::time::Duration::from_secs(300),
//!         test_selector: TestSelector::Glob("tests/**/*.test.js".to_string()),
//!         framework_options: Default::default(),
//!         working_dir: PathBuf::from("."),
//!         report_dir: PathBuf::from("reports"),
//!         progress_sink: Arc::new(|_| {}),
//!     };
//!     config.validate().map_err(|e| anyhow::anyhow!(e))?;
//!
//!     let files = jestpool::discovery::discover(&config.test_selector, &config.working_dir)?;
//!     let result = jestpool::run(config, files, "jest").await?;
//!     std::process::exit(result.exit_code());
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod model;
pub mod parser;
pub mod queue;
pub mod report;
pub mod scheduler;
pub mod tracker;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use config::RunConfig;
pub use error::{DispatchError, DispatchResult};
pub use model::{FileResult, ParsedFile, RunResult, StatusSnapshot, TestResult, WorkItem};

/// Builds the work queue for `files` under `config.mode`, runs the worker
/// pool to completion, aggregates the results, and writes the JSON
/// artifact. This is the top-level entry point a CLI or library caller
/// drives; it wires together discovery output, scheduling, parsing, and
/// aggregation into one call.
pub async fn run(
    config: RunConfig,
    files: Vec<ParsedFile>,
    framework_binary: &str,
) -> anyhow::Result<RunResult> {
    run_cancellable(config, files, framework_binary, CancellationToken::new()).await
}

/// Like [`run`], but observes `cancel` for mid-run cancellation.
pub async fn run_cancellable(
    config: RunConfig,
    files: Vec<ParsedFile>,
    framework_binary: &str,
    cancel: CancellationToken,
) -> anyhow::Result<RunResult> {
    config.validate().map_err(DispatchError::Configuration)?;

    let (items, skipped_results) = build_work_items(&config, files);
    let expected_total: usize = items.iter().map(WorkItem::expected_test_count).sum::<usize>()
        + skipped_results.iter().map(|f| f.test_results.len()).sum::<usize>();

    let started_at = chrono::Utc::now();
    let queue = Arc::new(queue::WorkQueue::new(items));
    let tracker = Arc::new(tracker::StatusTracker::new(expected_total, config.progress_sink.clone()));
    let config = Arc::new(config);
    let framework_binary: Arc<str> = Arc::from(framework_binary);

    for skipped in &skipped_results {
        tracker.record_batch(&skipped.test_results).await;
    }

    let mut file_results = scheduler::run_pool_cancellable(
        Arc::clone(&queue),
        Arc::clone(&config),
        Arc::clone(&tracker),
        framework_binary,
        cancel,
    )
    .await;
    file_results.extend(skipped_results);
    let ended_at = chrono::Utc::now();

    let result = aggregator::aggregate(file_results, started_at, ended_at);
    aggregator::write_json_artifact(&result, &config.working_dir, &config.report_dir)?;

    Ok(result)
}

/// Builds the flat `[]WorkItem` list from discovered files, branching on
/// `config.mode`: `PerFile` emits one item per file, carrying the file's
/// non-skipped test count as the parser's reconciliation ceiling; `PerTest`
/// emits one item per non-skipped test case. A skip-flagged test's outcome
/// is already known statically, so `PerTest` mode never dispatches a
/// subprocess for it — instead its `TestResult` is synthesized directly
/// and returned alongside the work items as a `FileResult` per originating
/// file, so it still surfaces in the run's results and counters.
fn build_work_items(config: &RunConfig, files: Vec<ParsedFile>) -> (Vec<WorkItem>, Vec<FileResult>) {
    match config.mode {
        model::RunMode::PerTest => {
            let mut items = Vec::new();
            let mut skipped_file_results = Vec::new();
            for file in files {
                let mut skipped = Vec::new();
                for test in file.tests {
                    if test.skip {
                        skipped.push(skipped_test_result(&file.file_path, &test));
                    } else {
                        items.push(WorkItem::per_test(file.file_path.clone(), test.name));
                    }
                }
                if !skipped.is_empty() {
                    skipped_file_results
                        .push(FileResult::from_skipped_tests(file.file_path, skipped));
                }
            }
            (items, skipped_file_results)
        }
        model::RunMode::PerFile => {
            let items = files
                .into_iter()
                .map(|file| {
                    let expected = file.tests.iter().filter(|t| !t.skip).count();
                    WorkItem::per_file(file.file_path, expected)
                })
                .collect();
            (items, Vec::new())
        }
    }
}

fn skipped_test_result(file_path: &std::path::Path, test: &model::ParsedTest) -> crate::model::TestResult {
    crate::model::TestResult {
        id: test.id.clone(),
        name: test.name.clone(),
        suite: test.suite_path.join(" › "),
        file_path: file_path.to_path_buf(),
        status: model::TestStatus::Skipped,
        duration_ms: 0,
        error: None,
        worker_id: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{ParsedTest, RunMode};
    use std::path::PathBuf;

    fn parsed_file(path: &str, test_names: &[&str]) -> ParsedFile {
        ParsedFile {
            file_path: PathBuf::from(path),
            tests: test_names
                .iter()
                .map(|n| ParsedTest {
                    id: format!("{path}::{n}"),
                    name: n.to_string(),
                    suite_path: vec![],
                    skip: false,
                    only: false,
                    concurrent: false,
                })
                .collect(),
            has_before_all: false,
            has_after_all: false,
            has_before_each: false,
            has_after_each: false,
        }
    }

    fn base_config(mode: RunMode) -> RunConfig {
        RunConfig {
            mode,
            max_workers: 2,
            timeout: std::time::Duration::from_secs(5),
            test_selector: model::TestSelector::Glob("*".to_string()),
            framework_options: Default::default(),
            working_dir: PathBuf::from("."),
            report_dir: PathBuf::from("reports"),
            progress_sink: Arc::new(|_| {}),
        }
    }

    #[test]
    fn test_build_work_items_per_test_emits_one_item_per_non_skipped_test() {
        let files = vec![parsed_file("a.test.js", &["x", "y"])];
        let (items, skipped) = build_work_items(&base_config(RunMode::PerTest), files);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0].kind, model::WorkKind::PerTest { .. }));
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_build_work_items_per_file_emits_one_item_per_file() {
        let files = vec![
            parsed_file("a.test.js", &["x", "y"]),
            parsed_file("b.test.js", &["z"]),
        ];
        let (items, skipped) = build_work_items(&base_config(RunMode::PerFile), files);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].expected_test_count(), 2);
        assert_eq!(items[1].expected_test_count(), 1);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_build_work_items_skips_skipped_tests() {
        let mut file = parsed_file("a.test.js", &["x", "y"]);
        file.tests[1].skip = true;
        let (items, skipped) = build_work_items(&base_config(RunMode::PerTest), vec![file.clone()]);
        assert_eq!(items.len(), 1);

        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].skipped, 1);
        assert_eq!(skipped[0].test_results[0].name, "y");
        assert_eq!(skipped[0].test_results[0].status, model::TestStatus::Skipped);

        let (items, skipped) = build_work_items(&base_config(RunMode::PerFile), vec![file]);
        assert_eq!(items[0].expected_test_count(), 1);
        assert!(skipped.is_empty());
    }
}
