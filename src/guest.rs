//! Guest OS families and their default command templates.
//!
//! Each family maps to a fixed [`GuestProfile`] holding the install and run
//! command templates, the default staging directory and the command used to
//! create directories on that guest.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Coarse classification of the target machine's operating system.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GuestOsType {
    /// POSIX-like guests (Linux, BSD, ...)
    #[default]
    Unix,
    /// Windows guests
    Windows,
}

/// OS-specific defaults for a guest family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestProfile {
    /// Template that downloads and unpacks the Terraform release archive.
    pub install_command: &'static str,
    /// Template that runs `terraform init` and `terraform apply`.
    pub run_command: &'static str,
    /// Default remote working directory.
    pub staging_dir: &'static str,
    create_dir: CreateDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateDir {
    Posix,
    PowerShell,
}

/// Base URL of the published Terraform release archives.
pub const RELEASES_BASE_URL: &str = "https://releases.hashicorp.com/terraform";

const UNIX_PROFILE: GuestProfile = GuestProfile {
    install_command: "curl https://releases.hashicorp.com/terraform/{{.Version}}/terraform_{{.Version}}_linux_amd64.zip \
        -so /tmp/terraform.zip && \
        {{if .Sudo}}sudo {{end}}unzip -o -d /usr/local/bin/ /tmp/terraform.zip",
    run_command: "cd {{.StagingDir}} && \
        {{if .Sudo}}sudo {{end}}/usr/local/bin/terraform init && \
        {{if .Sudo}}sudo {{end}}/usr/local/bin/terraform apply -auto-approve",
    staging_dir: "/tmp/packer-terraform",
    create_dir: CreateDir::Posix,
};

const WINDOWS_PROFILE: GuestProfile = GuestProfile {
    install_command: "powershell.exe -Command \"Invoke-WebRequest -UseBasicParsing \
        -Uri 'https://releases.hashicorp.com/terraform/{{.Version}}/terraform_{{.Version}}_windows_amd64.zip' \
        -OutFile 'C:\\Windows\\Temp\\terraform.zip' ; \
        Expand-Archive -Force C:\\Windows\\Temp\\terraform.zip -DestinationPath 'C:\\Windows\\Temp\\'\"",
    run_command: "cd {{.StagingDir}} && \
        C:\\Windows\\Temp\\terraform init && \
        C:\\Windows\\Temp\\terraform apply -auto-approve",
    staging_dir: "C:\\Windows\\Temp\\packer-terraform",
    create_dir: CreateDir::PowerShell,
};

impl GuestOsType {
    /// Returns the default profile for this family.
    pub fn profile(self) -> &'static GuestProfile {
        match self {
            Self::Unix => &UNIX_PROFILE,
            Self::Windows => &WINDOWS_PROFILE,
        }
    }
}

impl GuestProfile {
    /// Builds the command that creates `dir` (and its parents) on the guest.
    pub fn create_dir_command(&self, dir: &str) -> String {
        match self.create_dir {
            CreateDir::Posix => format!("mkdir -p {}", posix_quote(dir)),
            CreateDir::PowerShell => format!(
                "powershell.exe -Command \"New-Item -ItemType Directory -Force -Path {}\"",
                powershell_quote(dir)
            ),
        }
    }
}

/// Single-quotes `s` for a POSIX shell.
fn posix_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Single-quotes `s` for PowerShell, where `'` is escaped by doubling.
fn powershell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
