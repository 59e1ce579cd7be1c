//! RunResult aggregator: folds every `FileResult` into one `RunResult`
//! and writes the JSON artifact to disk.
//!
//! Collects per-worker results, folds them into one structure keyed by
//! file, and serializes the result with `serde_json` rather than hand
//! building the document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::model::{FileResult, RunResult, RunSummary};

/// Folds `file_results` (one per dispatched `WorkItem`, input order
/// otherwise unspecified) into a `RunResult`, grouping by `file_path` and
/// preserving first-seen order across files.
pub fn aggregate(
    file_results: Vec<FileResult>,
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: chrono::DateTime<chrono::Utc>,
) -> RunResult {
    let mut by_file: Vec<FileResult> = Vec::new();
    let mut order: Vec<PathBuf> = Vec::new();

    for result in file_results {
        if let Some(existing) = by_file.iter_mut().find(|f| f.file_path == result.file_path) {
            merge_into(existing, result);
        } else {
            order.push(result.file_path.clone());
            by_file.push(result);
        }
    }

    // Stable by first-seen file_path order (`order` mirrors insertion).
    by_file.sort_by_key(|f| order.iter().position(|p| p == &f.file_path).unwrap_or(usize::MAX));

    let total: usize = by_file.iter().map(|f| f.test_results.len()).sum();
    let passed: usize = by_file.iter().map(|f| f.passed).sum();
    let failed: usize = by_file.iter().map(|f| f.failed).sum();
    let skipped: usize = by_file.iter().map(|f| f.skipped).sum();
    let duration_ms: u64 = by_file.iter().map(|f| f.duration_ms).sum();

    RunResult {
        files: by_file,
        summary: RunSummary {
            total,
            passed,
            failed,
            skipped,
            duration_ms,
            started_at,
            ended_at,
        },
    }
}

/// A file should only ever appear once in `file_results` under the
/// PerFile-per-item contract; PerTest mode can legitimately dispatch
/// several `WorkItem`s against the same file, one per test, each coming
/// back as its own single-test `FileResult`. Merging keeps the aggregate
/// keyed by file regardless of which mode produced the inputs.
fn merge_into(existing: &mut FileResult, incoming: FileResult) {
    existing.test_results.extend(incoming.test_results);
    existing.passed += incoming.passed;
    existing.failed += incoming.failed;
    existing.skipped += incoming.skipped;
    existing.duration_ms = existing.duration_ms.max(incoming.duration_ms);
    if incoming.status == crate::model::FileStatus::Failed {
        existing.status = crate::model::FileStatus::Failed;
    }
    if existing.error.is_none() {
        existing.error = incoming.error;
    }
    if !incoming.raw_stdout.is_empty() {
        existing.raw_stdout.push('\n');
        existing.raw_stdout.push_str(&incoming.raw_stdout);
    }
    if !incoming.raw_stderr.is_empty() {
        existing.raw_stderr.push('\n');
        existing.raw_stderr.push_str(&incoming.raw_stderr);
    }
}

#[derive(Serialize)]
struct FileSummaryEntry<'a> {
    #[serde(rename = "filePath")]
    file_path: String,
    status: &'static str,
    #[serde(rename = "testCount")]
    test_count: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    duration: String,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: &'a Option<String>,
}

/// The on-disk `summary` object: the raw counters plus derived,
/// human-formatted `successRate`/`duration` strings and ISO-8601
/// timestamps. Kept separate from [`RunSummary`] because the latter is the
/// in-memory type the rest of the core operates on, while this is purely
/// the on-disk JSON shape.
#[derive(Serialize)]
struct JsonSummary {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    completed: usize,
    running: usize,
    #[serde(rename = "successRate")]
    success_rate: String,
    duration: String,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "startTime")]
    start_time: String,
    #[serde(rename = "endTime")]
    end_time: String,
}

#[derive(Serialize)]
struct JsonArtifact<'a> {
    summary: JsonSummary,
    #[serde(rename = "fileSummary")]
    file_summary: Vec<FileSummaryEntry<'a>>,
    /// Keyed by `filePath` rather than a flat array, so a reporter or a
    /// downstream tool can look a file up directly instead of scanning.
    #[serde(rename = "fileDetails")]
    file_details: BTreeMap<String, &'a FileResult>,
    results: Vec<&'a crate::model::TestResult>,
}

/// Formats a millisecond duration as a two-decimal-place seconds string.
fn format_seconds(duration_ms: u64) -> String {
    format!("{:.2}", duration_ms as f64 / 1000.0)
}

/// Writes `<working_dir>/<report_dir>/test-status.json` with the
/// `summary`, `fileSummary`, `fileDetails`, and `results` sections.
pub fn write_json_artifact(
    result: &RunResult,
    working_dir: &Path,
    report_dir: &Path,
) -> std::io::Result<PathBuf> {
    let dir = working_dir.join(report_dir);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("test-status.json");

    let file_summary = result
        .files
        .iter()
        .map(|f| FileSummaryEntry {
            file_path: f.file_path.display().to_string(),
            status: match f.status {
                crate::model::FileStatus::Passed => "passed",
                crate::model::FileStatus::Failed => "failed",
            },
            test_count: f.test_results.len(),
            passed: f.passed,
            failed: f.failed,
            skipped: f.skipped,
            duration: format_seconds(f.duration_ms),
            duration_ms: f.duration_ms,
            error: &f.error,
        })
        .collect();

    let file_details = result
        .files
        .iter()
        .map(|f| (f.file_path.display().to_string(), f))
        .collect();

    let results = result
        .files
        .iter()
        .flat_map(|f| f.test_results.iter())
        .collect();

    let summary = &result.summary;
    let completed = summary.passed + summary.failed + summary.skipped;
    let running = summary.total.saturating_sub(completed);
    let success_rate = if summary.total == 0 {
        0.0
    } else {
        summary.passed as f64 / summary.total as f64 * 100.0
    };

    let artifact = JsonArtifact {
        summary: JsonSummary {
            total: summary.total,
            passed: summary.passed,
            failed: summary.failed,
            skipped: summary.skipped,
            completed,
            running,
            success_rate: format!("{success_rate:.1}%"),
            duration: format_seconds(summary.duration_ms),
            duration_ms: summary.duration_ms,
            start_time: summary.started_at.to_rfc3339(),
            end_time: summary.ended_at.to_rfc3339(),
        },
        file_summary,
        file_details,
        results,
    };

    let json = serde_json::to_string_pretty(&artifact)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
