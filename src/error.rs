//! Error taxonomy for the dispatcher core.
//!
//! Mirrors the failure-semantics table: only [`DispatchError::Configuration`]
//! and [`DispatchError::Internal`] ever escape `Scheduler::run`. Every other
//! variant is captured into a [`crate::model::FileResult`] instead of being
//! propagated, so a single failing file never aborts the run.

use std::time::Duration;

/// Errors the core distinguishes internally.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Bad `RunConfig`. Fails fast, before any subprocess is spawned.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Failed to start the framework subprocess.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The subprocess exceeded its timeout and was terminated.
    #[error("worker timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    /// The subprocess exited but produced no readable stdout/stderr.
    #[error("worker produced no output")]
    EmptyOutput,

    /// The parser recovered fewer results than the framework's own summary
    /// reported and could not fully reconcile the gap.
    #[error("parse quality degraded: {0}")]
    ParseQuality(String),

    /// Invariant breach in the coordinator. Escapes `run` and aborts the pool.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn timeout(elapsed: Duration, limit: Duration) -> Self {
        DispatchError::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
            limit_ms: limit.as_millis() as u64,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
