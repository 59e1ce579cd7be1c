//! OutputParser: reconstructs per-test outcomes from the framework's
//! text output.
//!
//! Structured as a small multi-pass pipeline rather than one regex sweep:
//! tokenise → extract results → attach diagnostics → classify → dedup →
//! reconcile against the summary line → fall back to a file-level verdict.
//! Keeping structural recovery (which tests ran, with what status)
//! separate from diagnostic attachment (which error belongs to which
//! test) makes each pass independently testable and keeps the "try a
//! structured read first, fall back to scanning plain text" shape
//! composable instead of one large state machine.
//!
//! # Wire format this parser targets
//!
//! A glyph-prefixed line per test (`✓`/`✗`/`○`/`↺` for pass/fail/skip/todo),
//! optionally suffixed with `(NNN ms)`; a suite header is any indented
//! plain-text line immediately followed by a more deeply indented
//! glyph line; a failure diagnostic block starts with an `●` error header
//! of the form `suite › name` and continues until the next result line,
//! suite header, or summary line; the summary line has the shape
//! `Tests: K passed, L failed, N total` (skipped/todo optional).

use std::path::PathBuf;

use regex::Regex;
use std::sync::OnceLock;

use crate::model::{TestResult, TestStatus, WorkItem, WorkKind, NO_DIAGNOSTIC};

/// How fully the parser reconstructed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseQuality {
    /// All summary counts matched the extracted results.
    Good,
    /// Synthetic placeholder results were added to reconcile a gap.
    Reconciled,
    /// No per-test results and no usable summary; file-level fallback only.
    Poor,
}

/// Classification of a failure's diagnostic text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    AssertionFailure,
    HookFailure,
    Timeout,
    ReferenceError,
    TypeError,
    GenericException,
    SuiteFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Ok,
    Failed,
}

/// Which lifecycle hooks (if any) failed, attributed from diagnostic text
/// mentioning `beforeAll`/`beforeEach`/`afterAll`/`afterEach`.
#[derive(Debug, Clone, Copy)]
pub struct ParsedHookInfo {
    pub before_all: HookStatus,
    pub after_all: HookStatus,
    pub before_each: HookStatus,
    pub after_each: HookStatus,
}

impl Default for ParsedHookInfo {
    fn default() -> Self {
        ParsedHookInfo {
            before_all: HookStatus::Ok,
            after_all: HookStatus::Ok,
            before_each: HookStatus::Ok,
            after_each: HookStatus::Ok,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SummaryCounts {
    passed: usize,
    failed: usize,
    skipped: usize,
    todo: usize,
    total: usize,
}

#[derive(Debug, Clone)]
enum Token {
    Pass { name: String, duration_ms: Option<u64> },
    Fail { name: String, duration_ms: Option<u64> },
    Skip { name: String },
    Todo { name: String },
    SuiteHeader { name: String },
    ErrorHeader { suite: String, name: String },
    Summary(SummaryCounts),
    Other(String),
}

struct Regexes {
    glyph: Regex,
    duration: Regex,
    error_header: Regex,
    summary: Regex,
    passed_n: Regex,
    failed_n: Regex,
    skipped_n: Regex,
    todo_n: Regex,
    total_n: Regex,
}

fn regexes() -> &'static Regexes {
    static CELL: OnceLock<Regexes> = OnceLock::new();
    CELL.get_or_init(|| Regexes {
        glyph: Regex::new(r"^(\s*)([✓✗○↺])\s+(.*)$").unwrap(),
        duration: Regex::new(r"^(.*?)\s+\((\d+)\s*ms\)$").unwrap(),
        error_header: Regex::new(r"^\s*●\s+(.*)$").unwrap(),
        summary: Regex::new(r"^\s*Tests:\s*(.*)$").unwrap(),
        passed_n: Regex::new(r"(\d+)\s+passed").unwrap(),
        failed_n: Regex::new(r"(\d+)\s+failed").unwrap(),
        skipped_n: Regex::new(r"(\d+)\s+skipped").unwrap(),
        todo_n: Regex::new(r"(\d+)\s+todo").unwrap(),
        total_n: Regex::new(r"(\d+)\s+total").unwrap(),
    })
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn split_suite_and_name(text: &str) -> (String, String) {
    match text.rsplit_once(" › ") {
        Some((suite, name)) => (suite.trim().to_string(), name.trim().to_string()),
        None => (String::new(), text.trim().to_string()),
    }
}

fn parse_summary_line(rest: &str) -> SummaryCounts {
    let re = regexes();
    let num = |r: &Regex| -> usize {
        r.captures(rest)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    SummaryCounts {
        passed: num(&re.passed_n),
        failed: num(&re.failed_n),
        skipped: num(&re.skipped_n),
        todo: num(&re.todo_n),
        total: num(&re.total_n),
    }
}

/// Step 1: tokenise lines, including the lookahead needed to distinguish a
/// suite header (plain text immediately followed by a deeper-indented
/// result line) from an ordinary diagnostic line.
fn tokenize(text: &str) -> Vec<Token> {
    let lines: Vec<&str> = text.lines().collect();
    let re = regexes();
    let mut tokens = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            tokens.push(Token::Other(String::new()));
            continue;
        }

        if let Some(caps) = re.glyph.captures(line) {
            let glyph = &caps[2];
            let rest = caps[3].trim();
            let (name, duration_ms) = split_duration(rest);
            tokens.push(match glyph {
                "✓" => Token::Pass { name, duration_ms },
                "✗" => Token::Fail { name, duration_ms },
                "○" => Token::Skip { name },
                "↺" => Token::Todo { name },
                _ => unreachable!(),
            });
            continue;
        }

        if let Some(caps) = re.error_header.captures(line) {
            let (suite, name) = split_suite_and_name(caps[1].trim());
            tokens.push(Token::ErrorHeader { suite, name });
            continue;
        }

        if let Some(caps) = re.summary.captures(line) {
            tokens.push(Token::Summary(parse_summary_line(caps[1].trim())));
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed.starts_with("PASS ") || trimmed.starts_with("FAIL ") {
            tokens.push(Token::Other(line.to_string()));
            continue;
        }

        // Candidate suite header: plain indented text immediately
        // followed by a more deeply indented result line.
        let this_indent = indent_of(line);
        let next_result = lines[i + 1..]
            .iter()
            .find(|l| !l.trim().is_empty())
            .and_then(|next| {
                re.glyph
                    .captures(next)
                    .map(|c| (indent_of(next), c.get(1).unwrap().as_str().len()))
            });

        let is_suite_header = matches!(next_result, Some((next_indent, _)) if next_indent > this_indent);

        if is_suite_header {
            tokens.push(Token::SuiteHeader {
                name: line.trim().to_string(),
            });
        } else {
            tokens.push(Token::Other(line.to_string()));
        }
    }

    tokens
}

fn split_duration(rest: &str) -> (String, Option<u64>) {
    if let Some(caps) = regexes().duration.captures(rest) {
        let name = caps[1].trim().to_string();
        let ms = caps[2].parse().ok();
        (name, ms)
    } else {
        (rest.to_string(), None)
    }
}

fn make_id(suite: &str, name: &str) -> String {
    if suite.is_empty() {
        name.to_string()
    } else {
        format!("{suite} › {name}")
    }
}

/// Step 2: walk tokens in order, tracking a single `currentSuite`, yielding
/// one `TestResult` per Pass/Fail/Skip/Todo line. Failures start with a
/// `None` error; step 3 attaches diagnostics.
fn extract_results(tokens: &[Token], file_path: &PathBuf, worker_id: usize) -> Vec<TestResult> {
    let mut current_suite = String::new();
    let mut results = Vec::new();

    for token in tokens {
        match token {
            Token::SuiteHeader { name } => current_suite = name.clone(),
            Token::Pass { name, duration_ms } => results.push(TestResult {
                id: make_id(&current_suite, name),
                name: name.clone(),
                suite: current_suite.clone(),
                file_path: file_path.clone(),
                status: TestStatus::Passed,
                duration_ms: duration_ms.unwrap_or(0),
                error: None,
                worker_id,
            }),
            Token::Fail { name, duration_ms } => results.push(TestResult {
                id: make_id(&current_suite, name),
                name: name.clone(),
                suite: current_suite.clone(),
                file_path: file_path.clone(),
                status: TestStatus::Failed,
                duration_ms: duration_ms.unwrap_or(0),
                error: None,
                worker_id,
            }),
            Token::Skip { name } => results.push(TestResult {
                id: make_id(&current_suite, name),
                name: name.clone(),
                suite: current_suite.clone(),
                file_path: file_path.clone(),
                status: TestStatus::Skipped,
                duration_ms: 0,
                error: None,
                worker_id,
            }),
            Token::Todo { name } => results.push(TestResult {
                id: make_id(&current_suite, name),
                name: name.clone(),
                suite: current_suite.clone(),
                file_path: file_path.clone(),
                status: TestStatus::Todo,
                duration_ms: 0,
                error: None,
                worker_id,
            }),
            _ => {}
        }
    }

    results
}

/// Collects the diagnostic text following an `ErrorHeader` at `tokens[i]`:
/// every subsequent `Other` line up to (not including) the next
/// result/suite/summary/error token.
fn diagnostic_after(tokens: &[Token], i: usize) -> String {
    let mut text = String::new();
    for later in &tokens[i + 1..] {
        match later {
            Token::Pass { .. }
            | Token::Fail { .. }
            | Token::Skip { .. }
            | Token::Todo { .. }
            | Token::SuiteHeader { .. }
            | Token::ErrorHeader { .. }
            | Token::Summary(_) => break,
            Token::Other(line) => {
                if !line.trim().is_empty() {
                    text.push_str(line.trim());
                    text.push('\n');
                }
            }
        }
    }
    text.trim_end().to_string()
}

/// Step 3: walk tokens again; on each `ErrorHeader`, accumulate subsequent
/// `Other` lines until the next result/suite/summary/error token and
/// attach the text to the matching failed result. Returns the indices of
/// headers that matched no existing result (a suite-level failure with no
/// preceding Pass/Fail/Skip/Todo line) for step 3b to synthesise a carrier.
fn attach_errors(tokens: &[Token], results: &mut [TestResult]) -> Vec<usize> {
    let mut unmatched = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let Token::ErrorHeader { suite, name } = token else {
            continue;
        };

        let text = diagnostic_after(tokens, i);
        if text.is_empty() {
            continue;
        }

        // Prefer an exact (suite, name) match among failed results lacking
        // an error yet; fall back to a name-only match.
        let exact = results
            .iter_mut()
            .find(|r| r.status.is_failure() && r.error.is_none() && &r.suite == suite && &r.name == name);

        match exact {
            Some(r) => r.error = Some(text),
            None => {
                let name_only = results
                    .iter_mut()
                    .find(|r| r.status.is_failure() && r.error.is_none() && &r.name == name);
                match name_only {
                    Some(r) => r.error = Some(text),
                    None => unmatched.push(i),
                }
            }
        }
    }

    unmatched
}

/// Step 3b: a header with no matching Pass/Fail/Skip/Todo line describes a
/// suite-level failure (a `beforeAll`/`afterAll` hook blowing up before
/// any test body runs) rather than an individual test. Synthesises a
/// carrier `TestResult` named after the header so the failure is still
/// visible in the file's results instead of silently dropped.
fn synthesize_suite_failures(
    tokens: &[Token],
    unmatched_headers: &[usize],
    results: &mut Vec<TestResult>,
    file_path: &PathBuf,
) {
    for &i in unmatched_headers {
        let Token::ErrorHeader { suite, name } = &tokens[i] else {
            continue;
        };
        let text = diagnostic_after(tokens, i);
        results.push(TestResult {
            id: make_id(suite, name),
            name: name.clone(),
            suite: suite.clone(),
            file_path: file_path.clone(),
            status: TestStatus::Failed,
            duration_ms: 0,
            error: if text.is_empty() { None } else { Some(text) },
            worker_id: 0,
        });
    }
}

fn classify_error(text: &str) -> (ErrorClass, Option<&'static str>) {
    let lower = text.to_ascii_lowercase();
    if text.contains("beforeAll") {
        (ErrorClass::HookFailure, Some("beforeAll"))
    } else if text.contains("beforeEach") {
        (ErrorClass::HookFailure, Some("beforeEach"))
    } else if text.contains("afterAll") {
        (ErrorClass::HookFailure, Some("afterAll"))
    } else if text.contains("afterEach") {
        (ErrorClass::HookFailure, Some("afterEach"))
    } else if lower.contains("test suite failed to run") {
        (ErrorClass::SuiteFailure, None)
    } else if lower.contains("timeout") || lower.contains("timed out") {
        (ErrorClass::Timeout, None)
    } else if text.contains("ReferenceError") {
        (ErrorClass::ReferenceError, None)
    } else if text.contains("TypeError") {
        (ErrorClass::TypeError, None)
    } else if text.contains("Expected:") || text.contains("toBe") || text.contains("toEqual") {
        (ErrorClass::AssertionFailure, None)
    } else {
        (ErrorClass::GenericException, None)
    }
}

/// Step 4: classify every failed result's error text and fold lifecycle
/// hook failures into `ParsedHookInfo`.
fn classify_and_collect_hooks(results: &[TestResult]) -> ParsedHookInfo {
    let mut hooks = ParsedHookInfo::default();
    for result in results {
        let Some(error) = &result.error else { continue };
        let (class, hook) = classify_error(error);
        if class == ErrorClass::HookFailure {
            match hook {
                Some("beforeAll") => hooks.before_all = HookStatus::Failed,
                Some("beforeEach") => hooks.before_each = HookStatus::Failed,
                Some("afterAll") => hooks.after_all = HookStatus::Failed,
                Some("afterEach") => hooks.after_each = HookStatus::Failed,
                _ => {}
            }
        }
    }
    hooks
}

/// Step 5: collapse entries sharing (normalised name, status), keeping the
/// one with an attached error, else the longer suite path, else the first.
fn dedup_results(results: Vec<TestResult>) -> Vec<TestResult> {
    let mut kept: Vec<TestResult> = Vec::with_capacity(results.len());

    for candidate in results {
        let key = (candidate.name.trim().to_ascii_lowercase(), candidate.status);
        let existing_idx = kept
            .iter()
            .position(|r| (r.name.trim().to_ascii_lowercase(), r.status) == key);

        match existing_idx {
            None => kept.push(candidate),
            Some(idx) => {
                let existing = &kept[idx];
                let candidate_better = match (&existing.error, &candidate.error) {
                    (None, Some(_)) => true,
                    (Some(_), None) => false,
                    _ => candidate.suite.len() > existing.suite.len(),
                };
                if candidate_better {
                    kept[idx] = candidate;
                }
            }
        }
    }

    kept
}

const KNOWN_POSTRUN_WARNINGS: &[&str] = &[
    "force exit",
    "forced exit",
    "did not exit one second after the test run",
    "open handle",
    "failed to exit gracefully",
];

fn has_known_postrun_warning(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    KNOWN_POSTRUN_WARNINGS.iter().any(|w| lower.contains(w))
}

/// Derives the file-level pass/fail verdict from the exit code, falling
/// back to the parsed summary when the exit code alone is misleading
/// (some framework adapters exit non-zero for shutdown-related reasons
/// even when every test passed).
pub fn file_status(exit_code: i32, summary_failed: Option<usize>, raw: &str) -> crate::model::FileStatus {
    use crate::model::FileStatus;
    if exit_code == 0 {
        return FileStatus::Passed;
    }
    if summary_failed == Some(0) && has_known_postrun_warning(raw) {
        return FileStatus::Passed;
    }
    FileStatus::Failed
}

/// Step 6/7 + overall entry point: parses `raw_stdout`/`raw_stderr` for one
/// `WorkItem`, returning per-test results, hook info, and a parse-quality
/// grade.
pub fn parse(
    raw_stdout: &str,
    raw_stderr: &str,
    item: &WorkItem,
) -> (Vec<TestResult>, ParsedHookInfo, ParseQuality) {
    let combined = format!("{raw_stdout}\n{raw_stderr}");
    let tokens = tokenize(&combined);

    let mut results = extract_results(&tokens, &item.file_path, 0);
    let unmatched_headers = attach_errors(&tokens, &mut results);
    synthesize_suite_failures(&tokens, &unmatched_headers, &mut results, &item.file_path);

    let hooks = classify_and_collect_hooks(&results);
    let mut results = dedup_results(results);

    // Fill the default diagnostic only after dedup: dedup's tie-break
    // prefers the entry with an attached error, which depends on telling
    // "no diagnostic recovered yet" (`None`) apart from "recovered this
    // placeholder text" (`Some`). Filling it earlier would make every
    // duplicate look equally diagnosed and fall through to the suite-path
    // tie-break instead.
    for result in results.iter_mut() {
        if result.status.is_failure() && result.error.is_none() {
            result.error = Some(NO_DIAGNOSTIC.to_string());
        }
    }

    let summary = tokens.iter().find_map(|t| match t {
        Token::Summary(s) => Some(*s),
        _ => None,
    });

    let expected_cap = item.expected_test_count();

    let quality = match (&summary, matches!(item.kind, WorkKind::PerFile { .. })) {
        (Some(summary), true) if results.len() < summary.total => {
            let exit_zero_no_failures = summary.failed == 0;
            let placeholder_status = if exit_zero_no_failures {
                TestStatus::Passed
            } else {
                TestStatus::Failed
            };
            let placeholder_error = if exit_zero_no_failures {
                None
            } else {
                Some("Parser could not recover details".to_string())
            };

            let deficit = (summary.total - results.len()).min(expected_cap.saturating_sub(results.len()));
            for n in 0..deficit {
                results.push(TestResult {
                    id: format!("{}::synthetic::{n}", item.file_path.display()),
                    name: format!("synthetic placeholder {n}"),
                    suite: String::new(),
                    file_path: item.file_path.clone(),
                    status: placeholder_status,
                    duration_ms: 0,
                    error: placeholder_error.clone(),
                    worker_id: 0,
                });
            }
            ParseQuality::Reconciled
        }
        (Some(summary), _) if results.len() >= summary.total && summary.total > 0 => ParseQuality::Good,
        (None, _) if results.is_empty() => ParseQuality::Poor,
        _ => {
            if results.is_empty() {
                ParseQuality::Poor
            } else {
                ParseQuality::Good
            }
        }
    };

    (results, hooks, quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_per_file(expected: usize) -> WorkItem {
        WorkItem::per_file(PathBuf::from("math.test.js"), expected)
    }

    #[test]
    fn test_mixed_pass_fail_skip_attaches_diagnostic_to_failure() {
        let stdout = "\
  Math
    ✓ a (1 ms)
    ✓ b (1 ms)
    ✗ c (2 ms)
  ● Math › c

    Expected: 1
    Received: 2
      at file:10
    ○ d
    ✓ e (1 ms)

Tests: 3 passed, 1 failed, 1 skipped, 5 total
";
        let (results, _hooks, quality) = parse(stdout, "", &item_per_file(5));
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].status, TestStatus::Passed);
        assert_eq!(results[1].status, TestStatus::Passed);
        assert_eq!(results[2].status, TestStatus::Failed);
        let err = results[2].error.as_ref().unwrap();
        assert!(err.contains("Expected: 1"));
        assert!(err.contains("Received: 2"));
        assert_eq!(results[3].status, TestStatus::Skipped);
        assert_eq!(results[4].status, TestStatus::Passed);
        assert_eq!(quality, ParseQuality::Good);
    }

    #[test]
    fn test_hook_failure_synthesizes_carrier_result() {
        let stdout = "\
  ● Test suite failed to run

    beforeAll hook failed
    Error: boom

Tests: 0 passed, 0 failed, 0 total
";
        let (results, hooks, _quality) = parse(stdout, "", &item_per_file(1));
        // No Pass/Fail/Skip/Todo line precedes the error header, so step 2
        // yields no result for it; step 3b synthesises a carrier named
        // after the header instead of dropping the failure.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Test suite failed to run");
        assert_eq!(results[0].status, TestStatus::Failed);
        let err = results[0].error.as_ref().unwrap();
        assert!(err.contains("beforeAll hook failed"));
        let (class, hook) = classify_error(err);
        assert_eq!(class, ErrorClass::HookFailure);
        assert_eq!(hook, Some("beforeAll"));
        assert_eq!(hooks.before_all, HookStatus::Failed);
    }

    #[test]
    fn test_empty_output_yields_no_results_and_poor_quality() {
        let (results, _hooks, quality) = parse("", "", &item_per_file(1));
        assert!(results.is_empty());
        assert_eq!(quality, ParseQuality::Poor);
    }

    #[test]
    fn test_summary_reconciliation_bounded_by_expected_count() {
        let stdout = "\
  ✓ a (1 ms)

Tests: 1 passed, 0 failed, 10 total
";
        let (results, _hooks, quality) = parse(stdout, "", &item_per_file(2));
        // summary claims 10 total but expected_test_count caps synthesis at 2
        assert_eq!(results.len(), 2);
        assert_eq!(quality, ParseQuality::Reconciled);
    }

    #[test]
    fn test_dedup_keeps_entry_with_error() {
        let results = vec![
            TestResult {
                id: "a".into(),
                name: "dup".into(),
                suite: "S".into(),
                file_path: PathBuf::from("f.js"),
                status: TestStatus::Failed,
                duration_ms: 1,
                error: None,
                worker_id: 0,
            },
            TestResult {
                id: "b".into(),
                name: "dup".into(),
                suite: "S2".into(),
                file_path: PathBuf::from("f.js"),
                status: TestStatus::Failed,
                duration_ms: 1,
                error: Some("boom".into()),
                worker_id: 0,
            },
        ];
        let deduped = dedup_results(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let stdout = "\
  ✓ a (1 ms)
  ✓ a (1 ms)

Tests: 2 passed, 0 failed, 2 total
";
        let (once, _, _) = parse(stdout, "", &item_per_file(2));
        let twice = dedup_results(once.clone());
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn test_file_status_known_postrun_warning_overrides_nonzero_exit() {
        let raw = "A worker process has failed to exit gracefully";
        assert_eq!(
            file_status(1, Some(0), raw),
            crate::model::FileStatus::Passed
        );
    }

    #[test]
    fn test_file_status_nonzero_without_known_warning_is_failed() {
        assert_eq!(
            file_status(1, Some(0), "no special warning here"),
            crate::model::FileStatus::Failed
        );
    }

    #[test]
    fn test_failure_without_diagnostic_gets_default_error_text() {
        let stdout = "\
  ✗ lonely failure (1 ms)

Tests: 0 passed, 1 failed, 1 total
";
        let (results, _, _) = parse(stdout, "", &item_per_file(1));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error.as_deref(), Some(NO_DIAGNOSTIC));
    }
}
