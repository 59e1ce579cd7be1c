//! jestpool CLI — parallel dispatcher for Jest-style test suites.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use jestpool::config::{self, RunConfig};
use jestpool::{discovery, report};

#[derive(Parser)]
#[command(name = "jestpool")]
#[command(about = "Parallel dispatcher for Jest-style test suites", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "jestpool.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and run tests
    Run {
        /// Override the configured worker count
        #[arg(short = 'j', long)]
        max_workers: Option<usize>,

        /// Path to the host test framework binary
        #[arg(long, default_value = "jest")]
        framework_binary: String,
    },

    /// Discover tests without running them
    Discover,

    /// Validate a configuration file without running anything
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    match cli.command {
        Commands::Run {
            max_workers,
            framework_binary,
        } => run(&cli.config, max_workers, &framework_binary, cli.verbose).await,
        Commands::Discover => discover(&cli.config).await,
        Commands::ValidateConfig => validate_config(&cli.config),
    }
}

async fn run(config_path: &PathBuf, max_workers: Option<usize>, framework_binary: &str, verbose: bool) -> Result<()> {
    let file = config::load_config(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let mut run_config = build_config(file, max_workers);

    if let Err(e) = run_config.validate() {
        eprintln!("configuration error: {e}");
        std::process::exit(2);
    }

    info!(
        selector = ?run_config.test_selector,
        max_workers = run_config.max_workers,
        "discovering tests"
    );
    let files = discovery::discover(&run_config.test_selector, &run_config.working_dir)
        .context("test discovery failed")?;
    let total_tests: usize = files.iter().map(|f| f.tests.len()).sum();
    info!(files = files.len(), tests = total_tests, "discovery complete");

    let (bar, sink) = report::console_progress_sink(total_tests.max(1));
    run_config.progress_sink = Arc::new(sink);

    let result = jestpool::run(run_config, files, framework_binary)
        .await
        .context("test run failed")?;
    bar.finish_and_clear();

    report::print_console_report(&result, verbose);
    std::process::exit(result.exit_code());
}

async fn discover(config_path: &PathBuf) -> Result<()> {
    let file = config::load_config(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let run_config = build_config(file, None);

    let files = discovery::discover(&run_config.test_selector, &run_config.working_dir)
        .context("test discovery failed")?;

    for parsed in &files {
        println!("{}", parsed.file_path.display());
        for test in &parsed.tests {
            let marker = if test.skip {
                "skip"
            } else if test.only {
                "only"
            } else {
                "    "
            };
            let suite = if test.suite_path.is_empty() {
                String::new()
            } else {
                format!("{} › ", test.suite_path.join(" › "))
            };
            println!("  [{marker}] {suite}{}", test.name);
        }
    }
    println!();
    println!(
        "{} file(s), {} test(s)",
        files.len(),
        files.iter().map(|f| f.tests.len()).sum::<usize>()
    );
    Ok(())
}

fn validate_config(config_path: &PathBuf) -> Result<()> {
    let file = config::load_config(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let run_config = build_config(file, None);

    match run_config.validate() {
        Ok(()) => {
            println!("configuration is valid");
            Ok(())
        }
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    }
}

fn build_config(file: config::ConfigFile, max_workers_override: Option<usize>) -> RunConfig {
    let mut file = file;
    if let Some(max_workers) = max_workers_override {
        file.max_workers = max_workers;
    }
    config::build_run_config(file, Arc::new(|_| {}))
}
