//! SubprocessDriver: launches one framework invocation per work item,
//! enforces the timeout/kill policy, and streams stdout+stderr.
//!
//! Commands are built through a small fluent `Command` type rather than
//! shelling out to `std::process::Command` directly, so argument/env
//! construction stays testable independent of actually spawning anything.
//! Timeouts escalate from a graceful termination signal to a forceful kill
//! of the whole process group via `nix`, since dropping the child future
//! alone does not reach detached descendants.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::model::{WorkItem, WorkKind};

/// Grace window between a graceful-termination signal and a forceful kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Grace window after a zero exit code, before finalising, to let
/// in-flight child cleanup (e.g. an SDK wrapper's own subprocesses) flush.
const SUCCESS_GRACE: Duration = Duration::from_millis(500);

/// A framework invocation, built fluently via [`Command::arg`]/[`Command::env`].
#[derive(Debug, Clone)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Command {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Raw result of one subprocess invocation, before parsing.
#[derive(Debug, Clone)]
pub struct RawExecution {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub wall_duration: Duration,
    pub timed_out: bool,
    /// Set when the run-level cancellation token fired before the
    /// subprocess exited on its own.
    pub cancelled: bool,
}

/// Escapes regex metacharacters in a test name for use inside a
/// `^...$`-anchored name-pattern selector. The host framework's exact
/// escaping rules are framework-specific; this is a conservative
/// superset escape covering standard regex metachars.
fn escape_test_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Builds the subprocess invocation for a `WorkItem`.
///
/// Flag names are a concrete choice for a Jest-style host framework; a
/// different host framework would need its own flag names, but the core
/// depends only on the contract that the named flags exist and that the
/// framework emits glyph-prefixed lines and a summary line.
pub fn build_command(
    item: &WorkItem,
    config: &RunConfig,
    framework_binary: &str,
    worker_id: usize,
) -> Command {
    let mut cmd = Command::new(framework_binary)
        .arg(item.file_path.to_string_lossy().to_string())
        .arg("--verbose")
        .arg("--no-cache")
        .arg("--forceExit")
        .arg("--maxWorkers=1");

    if let WorkKind::PerTest { test_name } = &item.kind {
        let pattern = format!("^{}$", escape_test_name(test_name));
        cmd = cmd.arg(format!("--testNamePattern={pattern}"));
    }

    for (key, value) in &config.framework_options {
        cmd = cmd.env(key.clone(), value.clone());
    }
    cmd = cmd.env("JESTPOOL_WORKER_ID", worker_id.to_string());

    cmd
}

/// Executes one `Command` under the driver's timeout/kill policy, with no
/// run-level cancellation source. Equivalent to calling
/// [`execute_cancellable`] with a token that is never cancelled.
pub async fn execute(
    command: &Command,
    working_dir: &PathBuf,
    timeout: Duration,
) -> DispatchResult<RawExecution> {
    execute_cancellable(command, working_dir, timeout, &CancellationToken::new()).await
}

/// Executes one `Command` under the driver's timeout/kill policy,
/// additionally racing against a run-level `cancel` token. Never returns
/// `Err` for ordinary subprocess failure — a non-zero exit, a timeout, or
/// empty output are all represented in the returned `RawExecution`; only a
/// spawn failure surfaces as `Err`.
pub async fn execute_cancellable(
    command: &Command,
    working_dir: &PathBuf,
    timeout: Duration,
    cancel: &CancellationToken,
) -> DispatchResult<RawExecution> {
    let start = Instant::now();

    let mut tokio_cmd = tokio::process::Command::new(&command.program);
    tokio_cmd.args(&command.args);
    tokio_cmd.current_dir(working_dir);
    for (key, value) in &command.env {
        tokio_cmd.env(key, value);
    }
    tokio_cmd.stdout(Stdio::piped());
    tokio_cmd.stderr(Stdio::piped());
    tokio_cmd.kill_on_drop(true);
    place_in_own_process_group(&mut tokio_cmd);

    let mut child = tokio_cmd.spawn().map_err(DispatchError::Spawn)?;
    let pid = child.id();

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");
    // Two concurrent readers, never sequential: either pipe can fill and
    // deadlock the child if the other isn't being drained.
    let stdout_task = tokio::spawn(read_to_end(stdout));
    let stderr_task = tokio::spawn(read_to_end(stderr));

    let (status, timed_out, cancelled) = wait_with_timeout(&mut child, pid, timeout, cancel).await;

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    let exit_code = match &status {
        Some(status) => status.code().unwrap_or(-1),
        None => -1,
    };

    if !timed_out && !cancelled && exit_code == 0 {
        tokio::time::sleep(SUCCESS_GRACE).await;
    }

    Ok(RawExecution {
        exit_code,
        stdout,
        stderr,
        wall_duration: start.elapsed(),
        timed_out,
        cancelled,
    })
}

async fn read_to_end(mut pipe: impl tokio::io::AsyncRead + Unpin) -> String {
    let mut buf = String::new();
    let _ = pipe.read_to_string(&mut buf).await;
    buf
}

/// Races the child's exit against `timeout` and `cancel`; on either expiry
/// or cancellation, delivers a graceful signal, waits a short grace period,
/// then escalates to a forceful kill of the whole process group.
async fn wait_with_timeout(
    child: &mut Child,
    pid: Option<u32>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> (Option<std::process::ExitStatus>, bool, bool) {
    let outcome = tokio::select! {
        result = child.wait() => Ok(result),
        _ = tokio::time::sleep(timeout) => Err(false),
        _ = cancel.cancelled() => Err(true),
    };

    let was_cancelled = match outcome {
        Ok(Ok(status)) => return (Some(status), false, false),
        Ok(Err(_)) => return (None, false, false),
        Err(was_cancelled) => was_cancelled,
    };

    signal_process_group(pid, Signal::Term);
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => (Some(status), !was_cancelled, was_cancelled),
        _ => {
            signal_process_group(pid, Signal::Kill);
            let status = child.wait().await.ok();
            (status, !was_cancelled, was_cancelled)
        }
    }
}

enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn place_in_own_process_group(cmd: &mut tokio::process::Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: setsid() is async-signal-safe and only affects the child
    // process between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
        });
    }
}

#[cfg(not(unix))]
fn place_in_own_process_group(_cmd: &mut tokio::process::Command) {}

#[cfg(unix)]
fn signal_process_group(pid: Option<u32>, signal: Signal) {
    use nix::sys::signal::{self, Signal as NixSignal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let nix_signal = match signal {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    // setsid() made the child its own process group leader, so its pgid
    // equals its pid; killpg reaches every descendant that didn't detach.
    let _ = signal::killpg(Pid::from_raw(pid as i32), nix_signal);
}

#[cfg(not(unix))]
fn signal_process_group(_pid: Option<u32>, _signal: Signal) {}
