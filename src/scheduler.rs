//! WorkerPool/Scheduler: a fixed number of persistent workers pulling
//! from a shared [`WorkQueue`] until it drains.
//!
//! Workers refill on completion rather than running in fixed batches: a
//! worker that finishes a `WorkItem` immediately pulls the next one rather
//! than waiting for sibling workers to finish, so a slow item only stalls
//! the one worker running it instead of its whole batch.

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::driver::{self, RawExecution};
use crate::error::DispatchError;
use crate::model::{FileResult, FileStatus, WorkItem};
use crate::parser;
use crate::queue::WorkQueue;
use crate::tracker::StatusTracker;

/// Runs `config.max_workers` persistent workers against `queue` until it is
/// drained, producing exactly one [`FileResult`] per [`WorkItem`]. A single
/// item's failure (spawn error, timeout, parse trouble) never stops the
/// pool — every other worker keeps draining the queue. Equivalent to
/// calling [`run_pool_cancellable`] with a token that is never cancelled.
pub async fn run_pool(
    queue: Arc<WorkQueue>,
    config: Arc<RunConfig>,
    tracker: Arc<StatusTracker>,
    framework_binary: Arc<str>,
) -> Vec<FileResult> {
    run_pool_cancellable(queue, config, tracker, framework_binary, CancellationToken::new()).await
}

/// Like [`run_pool`], but additionally observes `cancel`: once cancelled,
/// every worker stops pulling fresh items and signals its in-flight
/// subprocess to terminate; any items still in the queue when every worker
/// has stopped are reported back as synthetic `Failed` entries rather than
/// silently dropped, preserving exactly one `FileResult` per `WorkItem`.
pub async fn run_pool_cancellable(
    queue: Arc<WorkQueue>,
    config: Arc<RunConfig>,
    tracker: Arc<StatusTracker>,
    framework_binary: Arc<str>,
    cancel: CancellationToken,
) -> Vec<FileResult> {
    let results = Arc::new(AsyncMutex::new(Vec::new()));
    let worker_count = config.max_workers;

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let queue = Arc::clone(&queue);
        let config = Arc::clone(&config);
        let tracker = Arc::clone(&tracker);
        let framework_binary = Arc::clone(&framework_binary);
        let results = Arc::clone(&results);
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            worker_loop(worker_id, queue, config, tracker, framework_binary, results, cancel).await;
        }));
    }

    for handle in handles {
        if let Err(join_err) = handle.await {
            warn!("worker task panicked: {join_err}");
        }
    }

    // Anything left in the queue only happens if cancellation stopped every
    // worker before the queue drained; represent each as a synthetic
    // cancelled failure so the completeness property still holds.
    while let Some(item) = queue.take() {
        let file_result = FileResult::synthetic_failure(
            item.file_path.clone(),
            0,
            -1,
            String::new(),
            String::new(),
            "run was cancelled before this item was dispatched",
        );
        tracker.record_batch(&file_result.test_results).await;
        results.lock().await.push(file_result);
    }

    Arc::try_unwrap(results)
        .unwrap_or_else(|_| unreachable!("all worker tasks joined, no outstanding Arc clone"))
        .into_inner()
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<WorkQueue>,
    config: Arc<RunConfig>,
    tracker: Arc<StatusTracker>,
    framework_binary: Arc<str>,
    results: Arc<AsyncMutex<Vec<FileResult>>>,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        let Some(item) = queue.take() else { break };
        let file_result = run_one(worker_id, &item, &config, &framework_binary, &cancel).await;
        tracker.record_batch(&file_result.test_results).await;
        results.lock().await.push(file_result);
    }
    debug!(worker_id, "worker exiting, queue drained or run cancelled");
}

/// Drives a single [`WorkItem`] through the subprocess driver and output
/// parser, never propagating an error: every failure mode (timeout, nonzero
/// exit, spawn failure, empty output) is captured into the returned
/// [`FileResult`] instead.
async fn run_one(
    worker_id: usize,
    item: &WorkItem,
    config: &RunConfig,
    framework_binary: &str,
    cancel: &CancellationToken,
) -> FileResult {
    let command = driver::build_command(item, config, framework_binary, worker_id);

    let raw = match driver::execute_cancellable(&command, &config.working_dir, config.timeout, cancel).await {
        Ok(raw) => raw,
        Err(DispatchError::Spawn(io_err)) => {
            return FileResult::synthetic_failure(
                item.file_path.clone(),
                0,
                -1,
                String::new(),
                String::new(),
                format!("failed to spawn worker: {io_err}"),
            );
        }
        Err(other) => {
            return FileResult::synthetic_failure(
                item.file_path.clone(),
                0,
                -1,
                String::new(),
                String::new(),
                other.to_string(),
            );
        }
    };

    build_file_result(item, raw, worker_id)
}

fn build_file_result(item: &WorkItem, raw: RawExecution, worker_id: usize) -> FileResult {
    let duration_ms = raw.wall_duration.as_millis() as u64;

    if raw.stdout.trim().is_empty() && raw.stderr.trim().is_empty() {
        let mut result = FileResult::synthetic_failure(
            item.file_path.clone(),
            duration_ms,
            raw.exit_code,
            raw.stdout,
            raw.stderr,
            DispatchError::EmptyOutput.to_string(),
        );
        if raw.timed_out {
            result.error = Some(format!("worker timed out after {duration_ms}ms"));
        } else if raw.cancelled {
            result.error = Some("run was cancelled while this item was in flight".to_string());
        }
        return result;
    }

    let (mut test_results, _hooks, quality) = parser::parse(&raw.stdout, &raw.stderr, item);
    for result in test_results.iter_mut() {
        result.worker_id = worker_id;
    }

    let passed = test_results
        .iter()
        .filter(|r| matches!(r.status, crate::model::TestStatus::Passed | crate::model::TestStatus::Todo))
        .count();
    let failed = test_results.iter().filter(|r| r.status.is_failure()).count();
    let skipped = test_results
        .iter()
        .filter(|r| matches!(r.status, crate::model::TestStatus::Skipped))
        .count();

    let status = if raw.timed_out || raw.cancelled {
        FileStatus::Failed
    } else {
        parser::file_status(raw.exit_code, Some(failed), &format!("{}\n{}", raw.stdout, raw.stderr))
    };

    let error = if raw.timed_out {
        Some(format!("worker timed out after {duration_ms}ms"))
    } else if raw.cancelled {
        Some("run was cancelled while this item was in flight".to_string())
    } else if matches!(quality, parser::ParseQuality::Poor) {
        Some("parser could not recover any test results".to_string())
    } else if status == FileStatus::Failed && failed == 0 {
        Some(format!("framework exited with code {}", raw.exit_code))
    } else {
        None
    };

    FileResult {
        file_path: item.file_path.clone(),
        status,
        test_results,
        passed,
        failed,
        skipped,
        duration_ms,
        raw_stdout: raw.stdout,
        raw_stderr: raw.stderr,
        exit_code: raw.exit_code,
        error,
    }
}
