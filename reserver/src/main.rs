//! Study reservation CLI.
//!
//! Reads project state from `.reserver/` under `--root`. `run` drives a
//! reservation session against the page snapshot until it succeeds, the study
//! becomes unavailable or Ctrl-C stops it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reserver::core::interval::RetryConfig;
use reserver::core::types::{MachineState, StopReason};
use reserver::exit_codes;
use reserver::io::config::{load_config, save_retry_range};
use reserver::io::init::{InitOptions, ReserverPaths, init_reserver};
use reserver::io::page::FilePage;
use reserver::io::reporter::ConsoleReporter;
use reserver::io::seen_store::{clear_logged_studies, load_logged_studies};
use reserver::io::sheet::WebAppSink;
use reserver::session::{SessionOptions, spawn_session};
use reserver::watch::{StudyLogger, run_watch};
use tracing::info;

const MANUAL_STOP: &str = "Manually stopped";

#[derive(Parser)]
#[command(
    name = "reserver",
    version,
    about = "Reserve a study by retrying at random intervals"
)]
struct Cli {
    /// Project directory (contains .reserver/)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.reserver/` with default config and an empty page snapshot.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Show or change configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Run a reservation session until reserved, unavailable or interrupted.
    Run,
    /// Watch the study list and log studies from target researchers.
    Watch,
    /// Inspect or reset logged studies.
    Studies {
        #[command(subcommand)]
        command: StudiesCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective config as TOML.
    Show,
    /// Save a new retry range (seconds).
    Set {
        #[arg(long)]
        min: u64,
        #[arg(long)]
        max: u64,
    },
}

#[derive(Subcommand)]
enum StudiesCommand {
    /// Print logged studies, oldest first.
    List,
    /// Forget every logged study.
    Clear,
}

#[tokio::main]
async fn main() {
    reserver::logging::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let paths = ReserverPaths::new(&cli.root);
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Config { command } => match command {
            ConfigCommand::Show => cmd_config_show(&paths),
            ConfigCommand::Set { min, max } => cmd_config_set(&paths, min, max),
        },
        Command::Run => cmd_run(&paths).await,
        Command::Watch => cmd_watch(&paths).await,
        Command::Studies { command } => match command {
            StudiesCommand::List => cmd_studies_list(&paths),
            StudiesCommand::Clear => cmd_studies_clear(&paths),
        },
    }
}

fn cmd_init(root: &std::path::Path, force: bool) -> Result<i32> {
    let paths = init_reserver(root, &InitOptions { force })?;
    println!("initialized {}", paths.reserver_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_config_show(paths: &ReserverPaths) -> Result<i32> {
    let cfg = load_config(&paths.config_path)?;
    let rendered = toml::to_string_pretty(&cfg).context("serialize config toml")?;
    print!("{rendered}");
    Ok(exit_codes::OK)
}

fn cmd_config_set(paths: &ReserverPaths, min: u64, max: u64) -> Result<i32> {
    let cfg = save_retry_range(&paths.config_path, RetryConfig::new(min, max))?;
    println!(
        "Intervals saved ({}-{}s)",
        cfg.retry.min_secs, cfg.retry.max_secs
    );
    Ok(exit_codes::OK)
}

async fn cmd_run(paths: &ReserverPaths) -> Result<i32> {
    let cfg = load_config(&paths.config_path)?;
    let page = FilePage::new(
        paths.resolve(&cfg.reservation.page_path),
        paths.resolve(&cfg.reservation.actions_path),
    );
    let options = SessionOptions {
        retry: cfg.retry,
        success_policy: cfg.reservation.success_policy(),
    };
    info!(page = %page.snapshot_path().display(), "reservation session starting");

    let handle = spawn_session(page, ConsoleReporter, options);
    handle.start();
    let state = tokio::select! {
        state = handle.wait_for_terminal() => state?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listen for ctrl-c")?;
            handle.stop(MANUAL_STOP);
            handle.wait_for_terminal().await?
        }
    };
    handle.shutdown().await?;
    Ok(exit_code_for(&state))
}

fn exit_code_for(state: &MachineState) -> i32 {
    match state {
        MachineState::Succeeded => exit_codes::OK,
        MachineState::Stopped {
            reason: StopReason::Unavailable(_),
        } => exit_codes::STOPPED,
        MachineState::Stopped {
            reason: StopReason::Operator(_),
        } => exit_codes::CANCELLED,
        _ => exit_codes::INVALID,
    }
}

async fn cmd_watch(paths: &ReserverPaths) -> Result<i32> {
    let cfg = load_config(&paths.config_path)?;
    let logger_cfg = &cfg.logger;
    if logger_cfg.target_researchers.is_empty() {
        println!("no target researchers configured; nothing will be logged");
    }
    let sink = if logger_cfg.web_app_url.trim().is_empty() {
        None
    } else {
        Some(WebAppSink::new(logger_cfg.web_app_url.trim())?)
    };
    let mut logger = StudyLogger::open(
        paths.resolve(&logger_cfg.studies_path),
        &paths.logged_studies_path,
        logger_cfg.target_researchers.clone(),
        sink,
    )?;

    run_watch(
        &mut logger,
        Duration::from_millis(logger_cfg.debounce_ms),
        |record| println!("{}", record.display_line()),
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await?;
    Ok(exit_codes::OK)
}

fn cmd_studies_list(paths: &ReserverPaths) -> Result<i32> {
    let logged = load_logged_studies(&paths.logged_studies_path)?;
    let mut records: Vec<_> = logged.values().collect();
    records.sort_by(|a, b| (&a.date, &a.time, &a.id).cmp(&(&b.date, &b.time, &b.id)));
    for record in records {
        println!("{}", record.display_line());
    }
    Ok(exit_codes::OK)
}

fn cmd_studies_clear(paths: &ReserverPaths) -> Result<i32> {
    let cleared = clear_logged_studies(&paths.logged_studies_path)?;
    println!("cleared {cleared} logged studies");
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reserver::core::types::ErrorClassification;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["reserver", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_config_set() {
        let cli = Cli::parse_from(["reserver", "config", "set", "--min", "5", "--max", "9"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                command: ConfigCommand::Set { min: 5, max: 9 }
            }
        ));
    }

    #[test]
    fn parse_root_after_subcommand() {
        let cli = Cli::parse_from(["reserver", "run", "--root", "/tmp/project"]);
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
    }

    #[test]
    fn parse_studies_clear() {
        let cli = Cli::parse_from(["reserver", "studies", "clear"]);
        assert!(matches!(
            cli.command,
            Command::Studies {
                command: StudiesCommand::Clear
            }
        ));
    }

    #[test]
    fn exit_codes_follow_terminal_state() {
        assert_eq!(exit_code_for(&MachineState::Succeeded), exit_codes::OK);
        assert_eq!(
            exit_code_for(&MachineState::Stopped {
                reason: StopReason::Unavailable(ErrorClassification::Full)
            }),
            exit_codes::STOPPED
        );
        assert_eq!(
            exit_code_for(&MachineState::Stopped {
                reason: StopReason::Operator(MANUAL_STOP.to_string())
            }),
            exit_codes::CANCELLED
        );
        assert_eq!(exit_code_for(&MachineState::Idle), exit_codes::INVALID);
    }
}
