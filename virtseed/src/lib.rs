use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};
use virtseed_config::{Config, ConfigError};
use virtseed_libvirt::{DEFAULT_CONNECT_URI, Virsh};
use virtseed_system::MachineName;
use virtseed_vm::{BatchReport, Operation, Orchestrator, run_batch};

#[derive(Parser, Debug)]
#[command(
    name = "virtseed",
    version,
    about = "Build virtual machines from qcow2 images and cloud-init"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Hypervisor connection URI.
    #[arg(long = "connect", global = true, env = "VIRTSEED_CONNECT", default_value = DEFAULT_CONNECT_URI)]
    pub connect: String,

    #[arg(long = "log", global = true, default_value = "info")]
    pub log: String,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the config file, or a directory holding virtseed.yaml.
    #[arg(short = 'c', long = "config")]
    pub path: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create virtual machines.
    Create {
        #[command(flatten)]
        config: ConfigArgs,

        /// Delete machines whose creation failed.
        #[arg(long)]
        revert: bool,
    },
    /// Delete virtual machines.
    Delete {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Delete everything from a previous run and create afresh.
    Recreate {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// List machines from the config.
    List {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{count} machine(s) failed to {operation}")]
    MachinesFailed { operation: Operation, count: usize },
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    let orchestrator = Orchestrator::virsh(Virsh::new(cli.connect));

    match cli.command {
        Command::Create { config, revert } => {
            let config = Config::load(&config.path).await?;
            let report = run_batch(&orchestrator, Operation::Create, config.records()).await;
            if revert && !report.is_success() {
                revert_failed(&orchestrator, &config, &report).await;
            }
            check(report)
        }
        Command::Delete { config } => check(delete(&orchestrator, &config.path).await?),
        Command::Recreate { config } => {
            let deleted = delete(&orchestrator, &config.path).await?;
            let created = create(&orchestrator, &config.path).await?;
            check(deleted)?;
            check(created)
        }
        Command::List { config } => {
            Config::load(&config.path).await?.print_machines();
            Ok(())
        }
    }
}

pub async fn create(orchestrator: &Orchestrator, config_path: &Path) -> Result<BatchReport, ConfigError> {
    execute(orchestrator, Operation::Create, config_path).await
}

pub async fn delete(orchestrator: &Orchestrator, config_path: &Path) -> Result<BatchReport, ConfigError> {
    execute(orchestrator, Operation::Delete, config_path).await
}

/// Compile the config, then apply `operation` to every machine.
pub async fn execute(
    orchestrator: &Orchestrator,
    operation: Operation,
    config_path: &Path,
) -> Result<BatchReport, ConfigError> {
    let config = Config::load(config_path).await?;
    Ok(run_batch(orchestrator, operation, config.records()).await)
}

async fn revert_failed(orchestrator: &Orchestrator, config: &Config, report: &BatchReport) {
    let failed: HashSet<&MachineName> = report.failed_names().collect();
    warn!("reverting {} failed machine(s)", failed.len());
    let records = config
        .records()
        .filter(|record| failed.contains(&record.name));
    let reverted = run_batch(orchestrator, Operation::Delete, records).await;
    info!("reverted {} machine(s)", reverted.succeeded.len());
}

fn check(report: BatchReport) -> Result<(), AppError> {
    if report.is_success() {
        Ok(())
    } else {
        Err(AppError::MachinesFailed {
            operation: report.operation,
            count: report.failed.len(),
        })
    }
}
