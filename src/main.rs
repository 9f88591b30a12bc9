//! findsynth - multi-horizon finding synthesis
//!
//! A CLI tool that turns raw worker task output into structured findings,
//! consolidates them at incremental, phase and final horizons, and queues
//! every result for an external memory store.
//!
//! Exit codes:
//!   0 - Operation finished, skipped, failed or timed out (failures go to
//!       logs/synthesis_errors.log, never to the caller)
//!   1 - Invalid arguments or an unusable configuration

mod analysis;
mod cli;
mod config;
mod error;
mod extract;
mod horizon;
mod models;
mod report;
mod store;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, Mode};
use config::{Config, CONFIG_FILE_NAME};
use horizon::{ErrorLog, HorizonController, Outcome};
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Error raised by the bounded runner.
#[derive(Debug, thiserror::Error)]
enum BoundedError {
    #[error("timed out after {0} ms")]
    TimedOut(u64),
    #[error("worker stopped unexpectedly: {0}")]
    Aborted(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);
    if let Err(e) = config.validate() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    // Initialize logging
    init_logging(&args, &config);

    info!("findsynth v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    run(args, config).await;

    // Exit right away so a timed-out worker cannot hold the process open.
    std::process::exit(0);
}

/// Handle --init-config: generate a default .findsynth.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize keywords, thresholds, and the store.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `FINDSYNTH_LOG` overrides the level with a full filter directive.
/// Logs go to stderr so stdout stays clean for recalled data.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };
    let filter = EnvFilter::try_from_env("FINDSYNTH_LOG")
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}", CONFIG_FILE_NAME, e);
            Ok(Config::default())
        }
    }
}

/// Run the selected horizon under the configured time bound.
async fn run(args: Args, config: Config) {
    let timeout_ms = config.general.operation_timeout_ms;
    let errors = ErrorLog::new(&config.general.temp_dir);
    let quiet = args.quiet;
    let mode = args.mode;

    let result = run_bounded(Duration::from_millis(timeout_ms), move || {
        execute(&args, &config)
    })
    .await;

    match result {
        Ok(Some(outcome)) => report_outcome(mode, &outcome, quiet),
        Ok(None) => {}
        Err(e) => {
            let message = format!("{:?} synthesis {}", mode, e);
            error!("{}", message);
            errors.record(&message);
        }
    }
}

/// Run `job` on the blocking pool, giving up after `limit`.
///
/// On timeout the job keeps running in the background; the caller is
/// expected to exit.
async fn run_bounded<T, F>(limit: Duration, job: F) -> std::result::Result<T, BoundedError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(job);

    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_err)) => Err(BoundedError::Aborted(join_err.to_string())),
        Err(_) => Err(BoundedError::TimedOut(limit.as_millis() as u64)),
    }
}

/// Dispatch one operation. Recall prints its data and yields no outcome.
fn execute(args: &Args, config: &Config) -> Option<Outcome> {
    let mut controller = HorizonController::new(config);
    debug!(
        "Session directory {} (store mode {:?})",
        config.general.temp_dir.display(),
        controller.queue().mode()
    );

    let outcome = match args.mode {
        Mode::Immediate => {
            controller.synthesize_immediate(args.task_id.as_deref().unwrap_or_default())
        }
        Mode::Incremental => controller.synthesize_incremental(args.agent_id.as_deref()),
        Mode::Phase => controller.synthesize_phase(args.consolidate),
        Mode::Final => controller.synthesize_final(
            args.session_id.as_deref().unwrap_or_default(),
            args.output.as_deref(),
            args.format,
        ),
        Mode::Recall => {
            let key = args.key.as_deref().unwrap_or_default();
            match controller.recall_patterns(key, Utc::now()) {
                Some(value) => match serde_json::to_string_pretty(&value) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        controller.record_failure(&format!("Recall failed for {}: {}", key, e))
                    }
                },
                None => debug!("Nothing stored under patterns/{}", key),
            }
            return None;
        }
    };

    Some(outcome)
}

fn report_outcome(mode: Mode, outcome: &Outcome, quiet: bool) {
    match outcome {
        Outcome::Produced { .. } => {
            if !quiet {
                println!("✓ {:?} synthesis {}", mode, outcome);
            }
        }
        Outcome::Skipped(reason) => info!("{:?} synthesis skipped: {}", mode, reason),
        Outcome::Failed(_) => {
            // Already logged and recorded by the controller.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_run_bounded_returns_value() {
        let value = tokio_test::block_on(run_bounded(Duration::from_secs(5), || 40 + 2)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_run_bounded_times_out() {
        let result = tokio_test::block_on(run_bounded(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(300));
        }));
        assert!(matches!(result, Err(BoundedError::TimedOut(20))));
    }

    #[test]
    fn test_run_bounded_reports_panics() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let result: std::result::Result<(), _> =
            tokio_test::block_on(run_bounded(Duration::from_secs(5), move || {
                flag.store(true, Ordering::SeqCst);
                panic!("boom");
            }));

        assert!(ran.load(Ordering::SeqCst));
        assert!(matches!(result, Err(BoundedError::Aborted(_))));
    }

    #[test]
    fn test_execute_dispatches_modes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.general.temp_dir = temp_dir.path().to_path_buf();
        config.store.enabled = false;

        let agents = temp_dir.path().join("agents");
        std::fs::create_dir_all(&agents).unwrap();
        std::fs::write(agents.join("raw_t1.txt"), "Found pattern: cache warmup").unwrap();

        let args = Args {
            mode: Mode::Immediate,
            task_id: Some("t1".to_string()),
            agent_id: None,
            session_id: None,
            key: None,
            temp_dir: None,
            no_store: true,
            consolidate: false,
            output: None,
            format: report::ReportFormat::Json,
            threshold: None,
            timeout_ms: None,
            config: None,
            verbose: false,
            quiet: true,
            init_config: false,
        };

        let outcome = execute(&args, &config).unwrap();
        assert!(outcome.is_produced());

        let recall = Args {
            mode: Mode::Recall,
            key: Some("missing".to_string()),
            ..args
        };
        assert!(execute(&recall, &config).is_none());
    }
}
