//! `RunConfig` construction and TOML loading.
//!
//! `load_config`/`load_config_str` parse a TOML file into a [`ConfigFile`]
//! and resolve it into a runnable `RunConfig`, expanding `${VAR}` and
//! `${VAR:-default}` references against the process environment in string
//! values (notably `framework_options`) so a config file can stay
//! environment-agnostic.

pub mod schema;

pub use schema::{ConfigFile, SelectorConfig};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::model::{RunMode, StatusSnapshot, TestSelector};

/// Callback invoked with a `StatusSnapshot` at least once per completed
/// batch and at most once per second.
pub type ProgressSink = Arc<dyn Fn(StatusSnapshot) + Send + Sync>;

/// Immutable for the duration of a run; constructed before and discarded
/// after.
#[derive(Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub max_workers: usize,
    pub timeout: Duration,
    pub test_selector: TestSelector,
    pub framework_options: HashMap<String, String>,
    pub working_dir: PathBuf,
    pub report_dir: PathBuf,
    pub progress_sink: ProgressSink,
}

impl RunConfig {
    /// Validates invariants a bad config would otherwise surface much later
    /// as a confusing scheduler failure. Fails fast, before any subprocess
    /// is spawned.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be at least 1".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Loads a [`ConfigFile`] from a TOML file and expands `${VAR}` references
/// in `framework_options` values.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    load_config_str(&content)
}

/// Loads a [`ConfigFile`] from a TOML string. Useful for tests and for
/// embedding configuration.
pub fn load_config_str(content: &str) -> Result<ConfigFile> {
    let mut config: ConfigFile = toml::from_str(content).context("failed to parse config")?;
    expand_env_hashmap(&mut config.framework_options)
        .context("failed to expand framework_options")?;
    Ok(config)
}

/// Builds a runtime [`RunConfig`] from a loaded [`ConfigFile`] and a
/// progress sink, applying any CLI overrides.
pub fn build_run_config(file: ConfigFile, progress_sink: ProgressSink) -> RunConfig {
    let test_selector = match file.test_selector {
        SelectorConfig::Glob(g) => TestSelector::Glob(g),
        SelectorConfig::Paths(p) => TestSelector::Paths(p),
    };

    RunConfig {
        mode: file.mode,
        max_workers: file.max_workers,
        timeout: Duration::from_secs(file.timeout_secs),
        test_selector,
        framework_options: file.framework_options,
        working_dir: file.working_dir,
        report_dir: file.report_dir,
        progress_sink,
    }
}

/// Expands environment variable references in a string value.
///
/// Syntax:
/// - `${VAR}` - required, fails if VAR is not set
/// - `${VAR:-default}` - optional, uses "default" if VAR not set
/// - `$$` - escaped dollar sign (becomes single `$`)
fn expand_env_value(value: &str) -> Result<String, String> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();

                    let mut var_content = String::new();
                    let mut found_close = false;

                    for c in chars.by_ref() {
                        if c == '}' {
                            found_close = true;
                            break;
                        }
                        var_content.push(c);
                    }

                    if !found_close {
                        return Err(format!("unclosed variable reference: ${{{var_content}"));
                    }

                    let (var_name, default_value) = if let Some(idx) = var_content.find(":-") {
                        let (name, rest) = var_content.split_at(idx);
                        (name, Some(&rest[2..]))
                    } else {
                        (var_content.as_str(), None)
                    };

                    if var_name.is_empty() {
                        return Err("empty variable name in ${}".to_string());
                    }

                    match std::env::var(var_name) {
                        Ok(val) => result.push_str(&val),
                        Err(_) => {
                            if let Some(default) = default_value {
                                result.push_str(default);
                            } else {
                                return Err(format!(
                                    "required environment variable not set: {var_name}"
                                ));
                            }
                        }
                    }
                }
                _ => result.push('$'),
            }
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn expand_env_hashmap(env: &mut HashMap<String, String>) -> Result<()> {
    for (key, value) in env.iter_mut() {
        *value = expand_env_value(value)
            .map_err(|e| anyhow::anyhow!("failed to expand env var '{key}': {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_value_no_variables() -> Result<(), String> {
        assert_eq!(expand_env_value("hello world")?, "hello world");
        Ok(())
    }

    #[test]
    fn test_expand_env_value_escaped_dollar() -> Result<(), String> {
        assert_eq!(expand_env_value("price is $$100")?, "price is $100");
        Ok(())
    }

    #[test]
    fn test_expand_env_value_literal_dollar_no_brace() -> Result<(), String> {
        assert_eq!(expand_env_value("$x and $y")?, "$x and $y");
        Ok(())
    }

    #[test]
    fn test_expand_env_value_empty_var_name() {
        let result = expand_env_value("${}");
        assert!(matches!(&result, Err(e) if e.contains("empty variable name")));
    }

    #[test]
    fn test_expand_env_value_unclosed_brace() {
        let result = expand_env_value("${VAR");
        assert!(matches!(&result, Err(e) if e.contains("unclosed variable reference")));
    }

    #[test]
    fn test_expand_env_value_var_set() -> Result<(), String> {
        let result = expand_env_value("${HOME}")?;
        assert!(!result.is_empty());
        Ok(())
    }

    #[test]
    fn test_expand_env_value_var_unset() {
        let result = expand_env_value("${_JESTPOOL_TEST_NONEXISTENT_VAR}");
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_env_value_default_used_when_unset() -> Result<(), String> {
        let result = expand_env_value("${_JESTPOOL_TEST_MISSING:-fallback}")?;
        assert_eq!(result, "fallback");
        Ok(())
    }

    #[test]
    fn test_expand_env_value_empty_default() -> Result<(), String> {
        let result = expand_env_value("${_JESTPOOL_TEST_MISSING:-}")?;
        assert_eq!(result, "");
        Ok(())
    }

    #[test]
    fn test_load_config_str_minimal() -> Result<()> {
        let file = load_config_str(
            r#"
            test_selector = "tests/**/*.test.js"
            "#,
        )?;
        assert_eq!(file.max_workers, 4);
        assert_eq!(file.timeout_secs, 300);
        Ok(())
    }

    #[test]
    fn test_config_validate_rejects_zero_workers() {
        let config = build_run_config(
            ConfigFile {
                mode: RunMode::PerTest,
                max_workers: 0,
                timeout_secs: 300,
                test_selector: SelectorConfig::Glob("*".to_string()),
                framework_options: HashMap::new(),
                working_dir: PathBuf::from("."),
                report_dir: PathBuf::from("reports"),
            },
            Arc::new(|_| {}),
        );
        assert!(config.validate().is_err());
    }
}
