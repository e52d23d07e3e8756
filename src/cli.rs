use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::version::VersionEndpoint;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the local host with the given configuration
    Apply(ApplyArgs),

    /// Resolve and validate the given configuration
    Validate(ValidateArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to the YAML or JSON provisioner configuration
    #[arg(short, long, default_value = "provisioner.yaml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,

    /// Do not run, just show what would be done
    #[arg(long)]
    pub dry_run: bool,

    /// Endpoint used to look up the latest Terraform version
    #[arg(long, value_enum, default_value_t = VersionEndpoint::Releases)]
    pub endpoint: VersionEndpoint,

    /// Name shown in front of console output
    #[arg(long, default_value = "terraform")]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the YAML or JSON provisioner configuration
    #[arg(short, long, default_value = "provisioner.yaml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,

    /// Endpoint used to look up the latest Terraform version
    #[arg(long, value_enum, default_value_t = VersionEndpoint::Releases)]
    pub endpoint: VersionEndpoint,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

/// Log verbosity, mapped directly onto `tracing` levels.
///
/// `debug` additionally shows rendered commands and the output of
/// successful remote commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Commands {
    /// Log level requested by the subcommand, if it takes one.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Apply(opts) => opts.log_level,
            Self::Validate(opts) => opts.log_level,
            Self::Completions(_) => LogLevel::Warn,
        }
    }
}

pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
