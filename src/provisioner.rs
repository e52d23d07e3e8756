//! Terraform provisioner: the ordered remote execution sequence.
//!
//! A provisioning pass runs five steps strictly in order, each gated on the
//! success of the previous one:
//!
//! 1. create the staging directory on the target
//! 2. upload the contents of `code_path` into it
//! 3. write and upload `terraform.auto.tfvars`
//! 4. render and run the install command
//! 5. render and run the run command
//!
//! The first failure aborts the pass; nothing is rolled back or retried.

use std::collections::HashMap;

use strum::{Display, EnumIter};
use tracing::{debug, info, warn};

use crate::config::{ProvisionerConfig, RawConfig};
use crate::error::{ProvisionerError, StepFailure};
use crate::remote::Communicator;
use crate::template::{self, RenderError};
use crate::tfvars;
use crate::ui::Ui;
use crate::version::VersionSource;

/// Data available to the install and run command templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTemplate<'a> {
    /// Remote staging directory (`{{.StagingDir}}`).
    pub staging_dir: &'a str,
    /// Whether commands should be elevated (`{{.Sudo}}`).
    pub sudo: bool,
    /// Terraform version to install (`{{.Version}}`).
    pub version: &'a str,
}

impl From<&RunTemplate<'_>> for gtmpl::Value {
    fn from(data: &RunTemplate<'_>) -> Self {
        let mut fields = HashMap::new();
        fields.insert("StagingDir".to_string(), gtmpl::Value::String(data.staging_dir.to_string()));
        fields.insert("Sudo".to_string(), gtmpl::Value::Bool(data.sudo));
        fields.insert("Version".to_string(), gtmpl::Value::String(data.version.to_string()));
        gtmpl::Value::Object(fields)
    }
}

/// Steps of a provisioning pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum ProvisionStep {
    CreateStagingDir,
    UploadCode,
    RenderVariables,
    Install,
    Run,
}

/// Installs Terraform on the target and applies the uploaded code.
#[derive(Debug, Clone)]
pub struct TerraformProvisioner {
    config: ProvisionerConfig,
}

impl TerraformProvisioner {
    /// Wraps an already resolved configuration.
    pub fn new(config: ProvisionerConfig) -> Self {
        Self { config }
    }

    /// Merges the raw configurations in order (later ones win) and resolves
    /// the result. See [`ProvisionerConfig::prepare`].
    pub fn prepare<I>(raws: I, versions: &dyn VersionSource) -> Result<Self, ProvisionerError>
    where
        I: IntoIterator<Item = RawConfig>,
    {
        let mut merged = RawConfig::default();
        for raw in raws {
            merged.merge(raw);
        }
        Ok(Self::new(ProvisionerConfig::prepare(merged, versions)?))
    }

    /// Returns the resolved configuration.
    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Builds the data the command templates are rendered against.
    pub fn run_template(&self) -> RunTemplate<'_> {
        RunTemplate {
            staging_dir: &self.config.staging_dir,
            sudo: !self.config.prevent_sudo,
            version: &self.config.version,
        }
    }

    /// Renders the install command.
    pub fn render_install_command(&self) -> Result<String, RenderError> {
        template::render(&self.config.install_command, gtmpl::Value::from(&self.run_template()))
    }

    /// Renders the run command.
    pub fn render_run_command(&self) -> Result<String, RenderError> {
        template::render(&self.config.run_command, gtmpl::Value::from(&self.run_template()))
    }

    /// Renders the body of `terraform.auto.tfvars`.
    pub fn render_variables(&self) -> String {
        tfvars::render(&self.config.variables)
    }

    /// Remote path of the generated variables file.
    pub fn tfvars_path(&self) -> String {
        let dir = self.config.staging_dir.trim_end_matches(['/', '\\']);
        format!("{}/{}", dir, tfvars::TFVARS_FILE_NAME)
    }

    /// Local source path with a trailing separator, so that the directory's
    /// contents (not the directory itself) land in the staging directory.
    fn upload_source(&self) -> String {
        let mut src = self.config.code_path.to_string();
        if !src.ends_with('/') && !src.ends_with(std::path::MAIN_SEPARATOR) {
            src.push('/');
        }
        src
    }

    /// Runs one provisioning pass against the target behind `comm`.
    ///
    /// Progress is announced on `ui` before each step starts. Output of
    /// successful commands is only traced at DEBUG level; output of a failed
    /// command is echoed to `ui` and carried in the returned error.
    #[tracing::instrument(skip_all, fields(staging_dir = %self.config.staging_dir))]
    pub fn provision(&self, ui: &dyn Ui, comm: &dyn Communicator) -> Result<(), ProvisionerError> {
        ui.say("Provisioning with Terraform...");
        let staging_dir = self.config.staging_dir.as_str();

        start_step(ui, ProvisionStep::CreateStagingDir, &format!("Creating directory: {}", staging_dir));
        let mkdir = self.config.guest_os_type.profile().create_dir_command(staging_dir);
        run_checked(ui, comm, &mkdir).map_err(ProvisionerError::DirectoryCreation)?;

        start_step(ui, ProvisionStep::UploadCode, "Uploading code");
        let src = self.upload_source();
        debug!("uploading {} to {}", src, staging_dir);
        comm.upload_dir(staging_dir, &src)
            .map_err(|e| ProvisionerError::Upload(StepFailure::Transport(e)))?;

        start_step(ui, ProvisionStep::RenderVariables, "Generating tfvars");
        let body = self.render_variables();
        debug!("generated variables:\n{}", body);
        let tfvars_path = self.tfvars_path();
        comm.upload(&tfvars_path, &mut body.as_bytes())
            .map_err(|e| ProvisionerError::Variables(StepFailure::Transport(e)))?;

        start_step(ui, ProvisionStep::Install, "Installing Terraform");
        let command = self.render_install_command()?;
        run_checked(ui, comm, &command).map_err(ProvisionerError::Install)?;

        start_step(ui, ProvisionStep::Run, "Running Terraform");
        let command = self.render_run_command()?;
        run_checked(ui, comm, &command).map_err(ProvisionerError::Run)?;

        info!("provisioning completed successfully");
        Ok(())
    }
}

fn start_step(ui: &dyn Ui, step: ProvisionStep, message: &str) {
    info!(step = %step, "starting step");
    ui.message(message);
}

/// Runs `command` and requires exit status 0.
fn run_checked(ui: &dyn Ui, comm: &dyn Communicator, command: &str) -> Result<(), StepFailure> {
    debug!("executing command: {}", command);
    let result = comm.run_command(command).map_err(StepFailure::Transport)?;

    if result.success() {
        debug!(stdout = %result.stdout, stderr = %result.stderr, "command succeeded");
        return Ok(());
    }

    warn!(exit_status = result.exit_status, "command failed: {}", command);
    ui.error(&format!("Command exited with non-zero status {}: {}", result.exit_status, command));
    for (label, text) in [("stderr", &result.stderr), ("stdout", &result.stdout)] {
        let text = text.trim_end();
        if !text.is_empty() {
            ui.error(&format!("{}:\n{}", label, text));
        }
    }

    Err(StepFailure::ExitStatus {
        status: result.exit_status,
        stdout: result.stdout,
        stderr: result.stderr,
    })
}
