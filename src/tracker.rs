//! StatusTracker: live counters plus throttled progress-sink emission.
//!
//! A single `tokio::sync::Mutex`-guarded struct rather than an actor with
//! message passing — the state is small, updates are brief, and every
//! caller already runs on the async runtime, so a mutex keeps the call
//! sites a plain `.await` instead of round-tripping through a channel.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::ProgressSink;
use crate::model::{StatusSnapshot, TestResult, TestStatus};

const EMIT_INTERVAL: Duration = Duration::from_millis(1000);

struct TrackerState {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    completed: usize,
    last_emit: Option<Instant>,
}

/// Process-wide per-run; constructed fresh for each run.
pub struct StatusTracker {
    state: Mutex<TrackerState>,
    sink: ProgressSink,
}

impl StatusTracker {
    pub fn new(expected_total: usize, sink: ProgressSink) -> Self {
        StatusTracker {
            state: Mutex::new(TrackerState {
                total: expected_total,
                passed: 0,
                failed: 0,
                skipped: 0,
                completed: 0,
                last_emit: None,
            }),
            sink,
        }
    }

    /// Updates counters atomically and conditionally emits to the sink.
    /// Emission happens at most every 1000ms, plus always on the batch
    /// that completes the run (`completed == total`), so the final
    /// snapshot is never swallowed by the throttle.
    pub async fn record_batch(&self, results: &[TestResult]) {
        let mut state = self.state.lock().await;

        for result in results {
            state.completed += 1;
            match result.status {
                TestStatus::Passed | TestStatus::Todo => state.passed += 1,
                TestStatus::Failed => state.failed += 1,
                TestStatus::Skipped => state.skipped += 1,
            }
        }

        let is_final = state.completed >= state.total;
        let should_emit = is_final
            || state
                .last_emit
                .map(|t| t.elapsed() >= EMIT_INTERVAL)
                .unwrap_or(true);

        if should_emit {
            state.last_emit = Some(Instant::now());
            let snapshot = snapshot_of(&state);
            drop(state);
            (self.sink)(snapshot);
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        snapshot_of(&*self.state.lock().await)
    }
}

fn snapshot_of(state: &TrackerState) -> StatusSnapshot {
    StatusSnapshot {
        total: state.total,
        passed: state.passed,
        failed: state.failed,
        skipped: state.skipped,
        running: state.total.saturating_sub(state.completed),
        completed: state.completed,
    }
}
