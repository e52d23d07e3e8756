//! Provisioner configuration.
//!
//! [`RawConfig`] is the user-facing surface as decoded from a YAML or JSON
//! document, with every field optional. [`ProvisionerConfig::prepare`]
//! turns one into a fully resolved [`ProvisionerConfig`] by applying the
//! guest profile defaults, checking the local source path, resolving the
//! Terraform version and decoding the variables.
//!
//! `install_command` and `run_command` are kept verbatim here; they are
//! templates rendered only at provisioning time, when the resolved version
//! and the elevation flag are known.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::str::FromStr;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ProvisionerError;
use crate::guest::GuestOsType;
use crate::tfvars;
use crate::version::VersionSource;

/// Terraform variables as written in the configuration.
///
/// Newer configurations pass a JSON object as text, older ones a structured
/// mapping; both are accepted under the `variables` key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VariablesInput {
    /// Raw JSON object text, decoded during [`ProvisionerConfig::prepare`].
    Json(String),
    /// Structured mapping.
    Map(BTreeMap<String, Value>),
}

/// Configuration as supplied by the user, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Terraform version to install; latest when absent.
    pub version: Option<String>,
    /// Local directory holding the Terraform code (required).
    pub code_path: Option<Utf8PathBuf>,
    /// Install command template.
    pub install_command: Option<String>,
    /// Run command template.
    pub run_command: Option<String>,
    /// Remote staging directory.
    pub staging_dir: Option<String>,
    /// Disables the `sudo` prefix in the default templates.
    pub prevent_sudo: Option<bool>,
    /// Terraform variables written to `terraform.auto.tfvars`.
    pub variables: Option<VariablesInput>,
    /// Legacy key for variables as JSON text; entries override `variables`.
    pub variable_string: Option<String>,
    /// Guest OS family (`unix` or `windows`, case-insensitive).
    pub guest_os_type: Option<String>,
}

impl RawConfig {
    /// Overlays `other` on top of `self`: every field set in `other` wins.
    pub fn merge(&mut self, other: RawConfig) {
        fn overlay<T>(dst: &mut Option<T>, src: Option<T>) {
            if src.is_some() {
                *dst = src;
            }
        }
        overlay(&mut self.version, other.version);
        overlay(&mut self.code_path, other.code_path);
        overlay(&mut self.install_command, other.install_command);
        overlay(&mut self.run_command, other.run_command);
        overlay(&mut self.staging_dir, other.staging_dir);
        overlay(&mut self.prevent_sudo, other.prevent_sudo);
        overlay(&mut self.variables, other.variables);
        overlay(&mut self.variable_string, other.variable_string);
        overlay(&mut self.guest_os_type, other.guest_os_type);
    }

    /// Resolves a relative `code_path` against `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        if let Some(ref mut code_path) = self.code_path
            && code_path.is_relative()
        {
            *code_path = base_dir.join(&*code_path);
        }
    }
}

/// Loads a [`RawConfig`] from a YAML (or JSON) file.
///
/// A relative `code_path` is resolved against the file's directory.
pub fn load_config(path: &Utf8Path) -> Result<RawConfig> {
    let file = File::open(path).with_context(|| format!("failed to load file: {}", path))?;
    let reader = BufReader::new(file);
    let mut raw: RawConfig = serde_yaml::from_reader(reader)
        .with_context(|| format!("failed to parse yaml: {}", path))?;

    let base_dir = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    raw.resolve_paths(base_dir);
    Ok(raw)
}

/// Fully resolved provisioner configuration.
///
/// Every field consumed during provisioning is non-empty once
/// [`prepare`](Self::prepare) has succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionerConfig {
    /// Terraform version to install.
    pub version: String,
    /// Local directory holding the Terraform code.
    pub code_path: Utf8PathBuf,
    /// Install command template.
    pub install_command: String,
    /// Run command template.
    pub run_command: String,
    /// Remote staging directory.
    pub staging_dir: String,
    /// Whether the `sudo` prefix is suppressed.
    pub prevent_sudo: bool,
    /// Decoded Terraform variables.
    pub variables: BTreeMap<String, Value>,
    /// Guest OS family.
    pub guest_os_type: GuestOsType,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Decodes a JSON object into a variables mapping.
pub fn parse_variables(json: &str) -> Result<BTreeMap<String, Value>, ProvisionerError> {
    serde_json::from_str(json).map_err(ProvisionerError::InvalidVariables)
}

impl ProvisionerConfig {
    /// Resolves `raw` into a complete configuration.
    ///
    /// Steps, in order: guest OS family, staging directory, local source
    /// check, version (queried from `versions` only when not pinned),
    /// command templates, variables.
    ///
    /// # Errors
    ///
    /// - [`ProvisionerError::InvalidConfig`] for a missing `code_path` or an
    ///   unknown `guest_os_type`
    /// - [`ProvisionerError::InvalidSource`] if `code_path` cannot be accessed
    /// - [`ProvisionerError::VersionResolution`] if no version is pinned and
    ///   the query fails
    /// - [`ProvisionerError::InvalidVariables`] if the variables JSON is malformed,
    ///   a variable name is not an identifier, or a value is an array or object
    pub fn prepare(raw: RawConfig, versions: &dyn VersionSource) -> Result<Self, ProvisionerError> {
        let guest_os_type = match non_empty(raw.guest_os_type) {
            Some(name) => GuestOsType::from_str(&name.to_lowercase()).map_err(|_| {
                ProvisionerError::InvalidConfig(format!(
                    "guest_os_type '{}' is not supported (expected 'unix' or 'windows')",
                    name
                ))
            })?,
            None => GuestOsType::default(),
        };
        let profile = guest_os_type.profile();
        debug!("guest OS type: {}", guest_os_type);

        let staging_dir = match non_empty(raw.staging_dir) {
            Some(dir) => dir,
            None => {
                info!("setting default staging_dir: {}", profile.staging_dir);
                profile.staging_dir.to_string()
            }
        };

        let code_path = raw
            .code_path
            .filter(|p| !p.as_str().is_empty())
            .ok_or_else(|| ProvisionerError::InvalidConfig("code_path must be specified".to_string()))?;
        fs::metadata(&code_path)
            .map_err(|e| ProvisionerError::invalid_source(code_path.as_str(), e))?;

        let version = match non_empty(raw.version) {
            Some(version) => version,
            None => {
                let version = versions
                    .latest_version()
                    .map_err(ProvisionerError::VersionResolution)?;
                info!("setting default Terraform version: {}", version);
                version
            }
        };

        let install_command = non_empty(raw.install_command).unwrap_or_else(|| {
            info!("setting default install_command for {}", guest_os_type);
            profile.install_command.to_string()
        });
        let run_command = non_empty(raw.run_command).unwrap_or_else(|| {
            info!("setting default run_command for {}", guest_os_type);
            profile.run_command.to_string()
        });

        let mut variables = match raw.variables {
            Some(VariablesInput::Map(map)) => map,
            Some(VariablesInput::Json(json)) if !json.trim().is_empty() => parse_variables(&json)?,
            Some(VariablesInput::Json(_)) | None => BTreeMap::new(),
        };
        if let Some(json) = non_empty(raw.variable_string) {
            variables.extend(parse_variables(&json)?);
        }
        for (name, value) in &variables {
            tfvars::check_variable(name, value).map_err(|message| {
                ProvisionerError::InvalidVariables(serde::de::Error::custom(message))
            })?;
        }
        debug!("decoded {} variable(s)", variables.len());

        Ok(Self {
            version,
            code_path,
            install_command,
            run_command,
            staging_dir,
            prevent_sudo: raw.prevent_sudo.unwrap_or(false),
            variables,
            guest_os_type,
        })
    }
}
