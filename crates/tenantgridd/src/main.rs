//! tenantgridd — the tenantgrid daemon.
//!
//! # Usage
//!
//! ```text
//! tenantgridd run --config /etc/tenantgrid/tenantgridd.toml
//! tenantgridd apply --config /etc/tenantgrid/tenantgridd.toml registration.json
//! tenantgridd validate-scheduling rules.json
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tenantgrid_admission::AdmittedStore;
use tenantgrid_state::StateStore;
use tenantgridd::scheduling::validate_file;
use tenantgridd::{Config, Driver, LogFormat, apply_file};

const DEFAULT_LOG_FILTER: &str = "info,tenantgridd=debug,tenantgrid=debug";

#[derive(Parser)]
#[command(name = "tenantgridd", about = "tenantgrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the resync driver against the local store.
    Run {
        /// Path to the TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Admit a document and write it to the local store.
    ///
    /// The store is opened directly, so the daemon must not be running
    /// against the same data directory.
    Apply {
        /// Path to the TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Document (JSON or TOML) with a top-level `kind`.
        file: PathBuf,
    },

    /// Check a TargetScheduling document (JSON or TOML) without storing it.
    ValidateScheduling {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = load_config(config.as_deref())?;
            init_tracing(config.log_format);
            run(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Apply { config, file } => {
            let config = load_config(config.as_deref())?;
            init_tracing(config.log_format);
            std::fs::create_dir_all(&config.data_dir)?;
            let writer = AdmittedStore::new(StateStore::open(&config.db_path())?);
            match apply_file(&writer, &file)? {
                Ok(report) => {
                    println!("{report}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(errors) => {
                    for error in errors {
                        eprintln!("{error}");
                    }
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::ValidateScheduling { file } => {
            init_tracing(LogFormat::Text);
            match validate_file(&file)? {
                Ok(scheduling) => {
                    println!(
                        "{}: valid, {} rule(s)",
                        file.display(),
                        scheduling.spec.rules.len()
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(errors) => {
                    for error in errors {
                        eprintln!("{error}");
                    }
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("tenantgrid daemon starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.db_path();
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    if let Some(scheduling) = &config.scheduling {
        info!(
            namespace = %scheduling.namespace,
            name = %scheduling.name,
            "manual scheduling rules enabled"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut driver = Driver::new(store, config.lifecycle());
    let interval = config.resync_interval();
    let driver_handle = tokio::spawn(async move {
        driver.run(interval, shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    driver_handle.await?;

    info!("tenantgrid daemon stopped");
    Ok(())
}
