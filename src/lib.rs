pub mod cli;
pub mod config;
pub mod error;
pub mod guest;
pub mod provisioner;
pub mod remote;
pub mod template;
pub mod tfvars;
pub mod ui;
pub mod version;

pub use error::{ProvisionerError, StepFailure};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::provisioner::TerraformProvisioner;
use crate::remote::Communicator;
use crate::ui::Ui;
use crate::version::VersionSource;

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(filter)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Loads and resolves the configuration file named by `file`.
fn prepare_from_file(
    file: &camino::Utf8Path,
    versions: &dyn VersionSource,
) -> Result<TerraformProvisioner> {
    let raw = config::load_config(file)
        .with_context(|| format!("failed to load configuration from {}", file))?;
    let provisioner = TerraformProvisioner::prepare([raw], versions)
        .context("configuration validation failed")?;
    Ok(provisioner)
}

pub fn run_apply(
    opts: &cli::ApplyArgs,
    versions: &dyn VersionSource,
    ui: &dyn Ui,
    comm: &dyn Communicator,
) -> Result<()> {
    let provisioner = prepare_from_file(opts.file.as_path(), versions)?;
    provisioner
        .provision(ui, comm)
        .context("provisioning failed")?;
    Ok(())
}

pub fn run_validate(opts: &cli::ValidateArgs, versions: &dyn VersionSource) -> Result<()> {
    let provisioner = prepare_from_file(opts.file.as_path(), versions)?;
    info!("validation successful:\n{:#?}", provisioner.config());
    Ok(())
}
