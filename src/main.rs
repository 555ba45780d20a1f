use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::time::sleep;
use tracing::{error, info, warn};

use pixelbot::config::{self as cfg, ActionDef, Config};
use pixelbot::executor::Runtime;
use pixelbot::utils::window;
use pixelbot::{EXIT_CONFIG_FAILURE, EXIT_RUN_FAILURE, EXIT_SUCCESS};

/// Pixelbot CLI
#[derive(Debug, Parser)]
#[command(
    name = pixelbot::PKG_NAME,
    version = pixelbot::PKG_VERSION,
    about = "Batch UI automation driven by image recognition and a JSON task file"
)]
struct Args {
    /// Path to the JSON task file (batch mode). Omit it to enter interactive
    /// mode, which reads one JSON action per stdin line.
    #[arg(value_name = "TASK")]
    task: Option<PathBuf>,

    /// Enable dry-run mode (log actions instead of simulating input)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for the task file and exit
    #[arg(long = "print-schema")]
    print_schema: bool,

    /// Skip the pre-run countdown
    #[arg(long = "no-countdown")]
    no_countdown: bool,

    /// Keep the console window visible during the run
    #[arg(long = "no-minimize")]
    no_minimize: bool,

    /// Override the post-run delay before the process exits
    #[arg(long = "exit-delay-secs")]
    exit_delay_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Honor --log-level by initializing tracing at that level directly.
    if let Some(level) = &args.log_level {
        let level = match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        };
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    } else {
        pixelbot::init_tracing();
    }

    match &args.task {
        Some(path) => info!(
            version = pixelbot::PKG_VERSION,
            task = %path.display(),
            dry_run = args.dry_run,
            "Starting Pixelbot"
        ),
        None => info!(
            version = pixelbot::PKG_VERSION,
            dry_run = args.dry_run,
            "Starting Pixelbot (interactive)"
        ),
    }

    if args.print_schema {
        let schema = cfg::generate_schema();
        match serde_json::to_string_pretty(&schema) {
            Ok(json) => {
                println!("{json}");
                return ExitCode::from(EXIT_SUCCESS);
            }
            Err(err) => {
                error!(error = %err, "Failed to serialize schema");
                return ExitCode::from(EXIT_CONFIG_FAILURE);
            }
        }
    }

    match args.task.clone() {
        Some(path) => run_batch_mode(&path, &args).await,
        None => run_interactive_mode(args.dry_run).await,
    }
}

/// Batch mode: load + validate the task (failures exit 2), count down,
/// minimize the console, execute the steps (failures exit 1), restore the
/// console, and hold the process open briefly so the outcome is readable.
async fn run_batch_mode(path: &std::path::Path, args: &Args) -> ExitCode {
    let config = match cfg::load_from_path_async(path).await {
        Ok(c) => c,
        Err(err) => {
            error!(error = format!("{err:#}"), task = %path.display(), "Task file rejected");
            return ExitCode::from(EXIT_CONFIG_FAILURE);
        }
    };

    let countdown_secs = if args.no_countdown {
        0
    } else {
        config.settings.countdown_secs
    };
    let exit_delay_secs = args
        .exit_delay_secs
        .unwrap_or(config.settings.exit_delay_secs);
    let minimize = config.settings.minimize_window && !args.no_minimize && !args.dry_run;

    for remaining in (1..=countdown_secs).rev() {
        info!(remaining, "Batch run starting soon");
        sleep(Duration::from_secs(1)).await;
    }

    if minimize {
        match window::minimize_own_console() {
            Ok(true) => info!("Console minimized for the run"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "Could not minimize console; continuing"),
        }
    }

    let mut runtime = Runtime::new(config, args.dry_run);
    let outcome = runtime.run_batch();

    if minimize {
        if let Err(err) = window::restore_own_console() {
            warn!(error = %err, "Could not restore console");
        }
    }

    let code = match outcome {
        Ok(()) => {
            info!("Batch run succeeded");
            EXIT_SUCCESS
        }
        Err(err) => {
            error!(error = format!("{err:#}"), "Batch run failed");
            EXIT_RUN_FAILURE
        }
    };

    if exit_delay_secs > 0 {
        info!(exit_delay_secs, exit_code = u32::from(code), "Exiting shortly");
        sleep(Duration::from_secs(exit_delay_secs)).await;
    }

    ExitCode::from(code)
}

/// Interactive mode: read one JSON `ActionDef` per stdin line and execute it
/// immediately. Variables persist across lines; bad lines are logged and
/// skipped. EOF or Ctrl+C ends the session with exit code 0.
async fn run_interactive_mode(dry_run: bool) -> ExitCode {
    info!("Interactive mode: enter one JSON action per line (Ctrl+D to quit)");

    let mut runtime = Runtime::new(Config::default(), dry_run);
    let mut vars = HashMap::new();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(raw)) => {
                    let raw = raw.trim();
                    if raw.is_empty() {
                        continue;
                    }
                    let action: ActionDef = match serde_json::from_str(raw) {
                        Ok(a) => a,
                        Err(err) => {
                            warn!(error = %err, line = raw, "Could not parse action; skipping");
                            continue;
                        }
                    };
                    if let Err(err) = runtime.run_action(&action, &mut vars) {
                        error!(error = format!("{err:#}"), "Action failed");
                    }
                }
                Ok(None) => {
                    info!("EOF on stdin; leaving interactive mode");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Error reading stdin; leaving interactive mode");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    info!("Pixelbot exited");
    ExitCode::from(EXIT_SUCCESS)
}
