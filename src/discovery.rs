//! Default file discovery and test-case collection.
//!
//! The dispatch core only needs a `[]ParsedFile`; this module is the
//! concrete default that produces one for a Jest-style JS/TS project by
//! walking the working directory for test files and line-scanning each for
//! `describe`/`it`/`test` declarations, rather than shelling out to the
//! framework for a real collect-only pass (no such generic mode exists for
//! an opaque framework binary).

use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::OnceLock;

use crate::model::{ParsedFile, ParsedTest, TestSelector};

struct Regexes {
    test_decl: Regex,
    describe: Regex,
    before_all: Regex,
    after_all: Regex,
    before_each: Regex,
    after_each: Regex,
}

fn regexes() -> &'static Regexes {
    static CELL: OnceLock<Regexes> = OnceLock::new();
    CELL.get_or_init(|| Regexes {
        // Matches `it(`, `test(`, `it.skip(`, `test.only(`, `it.concurrent(`
        // and their `describe`-nested equivalents, capturing the modifier
        // (if any) and the quoted test name.
        test_decl: Regex::new(
            r#"(?m)^\s*(?:it|test)(?:\.(skip|only|concurrent))?\s*\(\s*["'`]([^"'`]*)["'`]"#,
        )
        .unwrap(),
        describe: Regex::new(r#"(?m)^\s*describe(?:\.(?:skip|only))?\s*\(\s*["'`]([^"'`]*)["'`]"#)
            .unwrap(),
        before_all: Regex::new(r"(?m)^\s*beforeAll\s*\(").unwrap(),
        after_all: Regex::new(r"(?m)^\s*afterAll\s*\(").unwrap(),
        before_each: Regex::new(r"(?m)^\s*beforeEach\s*\(").unwrap(),
        after_each: Regex::new(r"(?m)^\s*afterEach\s*\(").unwrap(),
    })
}

/// Expands `selector` against `working_dir` and heuristically parses each
/// matched file into a [`ParsedFile`]. Intentionally shallow — a line/regex
/// scan, not a JS/TS parser — since this component is a swappable default,
/// not the core's tested contract.
pub fn discover(selector: &TestSelector, working_dir: &Path) -> anyhow::Result<Vec<ParsedFile>> {
    let paths = expand_selector(selector, working_dir)?;
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        files.push(parse_file(path, &content));
    }
    Ok(files)
}

fn expand_selector(selector: &TestSelector, working_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    match selector {
        TestSelector::Paths(paths) => Ok(paths.clone()),
        TestSelector::Glob(pattern) => {
            let full_pattern = working_dir.join(pattern);
            let mut matches = Vec::new();
            for entry in glob::glob(&full_pattern.to_string_lossy())
                .map_err(|e| anyhow::anyhow!("invalid glob pattern '{pattern}': {e}"))?
            {
                match entry {
                    Ok(path) if path.is_file() => matches.push(path),
                    Ok(_) => {}
                    Err(e) => return Err(anyhow::anyhow!("glob error: {e}")),
                }
            }
            matches.sort();
            Ok(matches)
        }
    }
}

/// Scans one file's source text, tracking the nearest enclosing
/// `describe(...)` as the test's suite path, the `.skip`/`.only`/
/// `.concurrent` modifier, and whether any lifecycle hook appears anywhere
/// in the file.
fn parse_file(file_path: PathBuf, content: &str) -> ParsedFile {
    let re = regexes();
    let mut tests = Vec::new();
    let mut suite_stack: Vec<(usize, String)> = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let indent = line.len() - line.trim_start().len();

        while suite_stack.last().is_some_and(|(i, _)| *i >= indent) {
            suite_stack.pop();
        }

        if let Some(caps) = re.describe.captures(line) {
            suite_stack.push((indent, caps[1].to_string()));
            continue;
        }

        if let Some(caps) = re.test_decl.captures(line) {
            let modifier = caps.get(1).map(|m| m.as_str());
            let name = caps[2].to_string();
            let suite_path: Vec<String> = suite_stack.iter().map(|(_, n)| n.clone()).collect();
            let id = if suite_path.is_empty() {
                format!("{}::{line_no}::{name}", file_path.display())
            } else {
                format!("{}::{}::{name}", file_path.display(), suite_path.join(" › "))
            };
            tests.push(ParsedTest {
                id,
                name,
                suite_path,
                skip: modifier == Some("skip"),
                only: modifier == Some("only"),
                concurrent: modifier == Some("concurrent"),
            });
        }
    }

    ParsedFile {
        has_before_all: re.before_all.is_match(content),
        has_after_all: re.after_all.is_match(content),
        has_before_each: re.before_each.is_match(content),
        has_after_each: re.after_each.is_match(content),
        file_path,
        tests,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.test.js");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_parse_file_finds_flat_tests() {
        let content = "\
it('adds numbers', () => { expect(1+1).toBe(2); });
test.skip('todo later', () => {});
";
        let parsed = parse_file(PathBuf::from("a.test.js"), content);
        assert_eq!(parsed.tests.len(), 2);
        assert_eq!(parsed.tests[0].name, "adds numbers");
        assert!(!parsed.tests[0].skip);
        assert!(parsed.tests[1].skip);
    }

    #[test]
    fn test_parse_file_tracks_nested_describe_suite_path() {
        let content = "\
describe('Math', () => {
  describe('addition', () => {
    it('adds two positives', () => {});
  });
  it('top level in Math', () => {});
});
";
        let parsed = parse_file(PathBuf::from("math.test.js"), content);
        assert_eq!(parsed.tests.len(), 2);
        assert_eq!(parsed.tests[0].suite_path, vec!["Math", "addition"]);
        assert_eq!(parsed.tests[1].suite_path, vec!["Math"]);
    }

    #[test]
    fn test_parse_file_detects_hooks() {
        let content = "\
beforeAll(() => setup());
afterEach(() => cleanup());
it('works', () => {});
";
        let parsed = parse_file(PathBuf::from("h.test.js"), content);
        assert!(parsed.has_before_all);
        assert!(parsed.has_after_each);
        assert!(!parsed.has_after_all);
        assert!(!parsed.has_before_each);
    }

    #[test]
    fn test_discover_expands_glob_against_working_dir() {
        let (dir, _path) = write_temp("it('x', () => {});\n");
        let selector = TestSelector::Glob("*.test.js".to_string());
        let files = discover(&selector, dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].tests.len(), 1);
    }

    #[test]
    fn test_discover_explicit_paths_bypasses_glob() {
        let (_dir, path) = write_temp("it('y', () => {});\n");
        let selector = TestSelector::Paths(vec![path.clone()]);
        let files = discover(&selector, Path::new(".")).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_path, path);
    }
}
