//! Latest-version discovery for Terraform.
//!
//! Version discovery is best-effort and must never stall an image build, so
//! every request is bounded by [`DEFAULT_TIMEOUT`]. Two endpoint generations
//! are supported:
//!
//! - [`VersionEndpoint::Releases`]: `api.releases.hashicorp.com`, which
//!   answers with a top-level `version` field and a list of builds
//! - [`VersionEndpoint::Checkpoint`]: the legacy `checkpoint-api.hashicorp.com`
//!   service, which takes `arch`/`os` query parameters and answers with a
//!   top-level `current_version` field

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

/// Total time allowed for one version query, including reading the body.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// User agent sent with every version query.
pub const USER_AGENT: &str = "Servian/Packer-Plugin-Terraform";

/// Errors returned by [`VersionResolver`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VersionError {
    /// The request could not be built, sent, or completed in time.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// The URL that was queried.
        url: String,
        /// Description of the transport failure (including timeouts).
        message: String,
    },

    /// The endpoint answered with something other than HTTP 200.
    #[error("unknown status {status} from {url}")]
    UnexpectedStatus {
        /// The URL that was queried.
        url: String,
        /// The HTTP status code received.
        status: u16,
    },

    /// The body did not have the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// The URL that was queried.
        url: String,
        /// Why decoding failed.
        message: String,
    },
}

/// Metadata endpoint generation to query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum VersionEndpoint {
    /// `https://api.releases.hashicorp.com/v1/releases/terraform/latest`
    #[default]
    Releases,
    /// `https://checkpoint-api.hashicorp.com/v1/check/terraform`
    Checkpoint,
}

impl VersionEndpoint {
    fn default_base(self) -> &'static str {
        match self {
            Self::Releases => "https://api.releases.hashicorp.com",
            Self::Checkpoint => "https://checkpoint-api.hashicorp.com",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Releases => "/v1/releases/terraform/latest",
            Self::Checkpoint => "/v1/check/terraform",
        }
    }
}

/// Legacy checkpoint response. Only the fields that are used are decoded.
#[derive(Debug, Deserialize)]
struct CheckpointResponse {
    #[serde(default)]
    product: String,
    current_version: String,
}

/// Releases API response. Only the fields that are used are decoded.
#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    #[serde(default)]
    name: String,
    version: String,
    #[serde(default)]
    builds: Vec<serde::de::IgnoredAny>,
}

/// Architecture name as used in Terraform release artifacts.
pub fn release_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Operating system name as used in Terraform release artifacts.
pub fn release_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Source of the latest Terraform version.
///
/// Implemented by [`VersionResolver`]; tests substitute a stub.
pub trait VersionSource {
    /// Returns the latest stable version string.
    fn latest_version(&self) -> Result<String, VersionError>;
}

/// HTTP client for the Terraform version metadata endpoints.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    endpoint: VersionEndpoint,
    base_url: Option<Url>,
    timeout: Duration,
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new(VersionEndpoint::default())
    }
}

impl VersionResolver {
    /// Creates a resolver for the given endpoint generation.
    pub fn new(endpoint: VersionEndpoint) -> Self {
        Self {
            endpoint,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replaces the scheme, host and port of the endpoint (the path is kept).
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Returns the endpoint generation this resolver queries.
    pub fn endpoint(&self) -> VersionEndpoint {
        self.endpoint
    }

    /// Returns the total request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the full request URL, including query parameters.
    pub fn request_url(&self) -> Result<Url, VersionError> {
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => Url::parse(self.endpoint.default_base()).map_err(|e| VersionError::Transport {
                url: self.endpoint.default_base().to_string(),
                message: e.to_string(),
            })?,
        };
        let mut url = base.join(self.endpoint.path()).map_err(|e| VersionError::Transport {
            url: base.to_string(),
            message: e.to_string(),
        })?;
        if self.endpoint == VersionEndpoint::Checkpoint {
            url.query_pairs_mut()
                .append_pair("arch", release_arch())
                .append_pair("os", release_os());
        }
        Ok(url)
    }

    /// Queries the endpoint and returns the latest version.
    ///
    /// # Errors
    ///
    /// - [`VersionError::Transport`] if the request cannot be sent, the body
    ///   cannot be read, or the whole exchange exceeds the timeout
    /// - [`VersionError::UnexpectedStatus`] for any status other than 200
    /// - [`VersionError::Decode`] if the body is not the expected JSON shape
    pub fn resolve_latest_version(&self) -> Result<String, VersionError> {
        let url = self.request_url()?;
        info!("fetching latest Terraform version from {}", url);

        let agent = ureq::AgentBuilder::new()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build();

        let response = match agent
            .get(url.as_str())
            .set("Accept", "application/json")
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(VersionError::UnexpectedStatus {
                    url: url.to_string(),
                    status,
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(VersionError::Transport {
                    url: url.to_string(),
                    message: transport.to_string(),
                });
            }
        };

        if response.status() != 200 {
            return Err(VersionError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let body = response.into_string().map_err(|e| VersionError::Transport {
            url: url.to_string(),
            message: format!("failed to read response body: {}", e),
        })?;

        let version = self.decode_version(url.as_str(), &body)?;
        info!("got latest Terraform version: {}", version);
        Ok(version)
    }

    fn decode_version(&self, url: &str, body: &str) -> Result<String, VersionError> {
        let decode_error = |message: String| VersionError::Decode {
            url: url.to_string(),
            message,
        };

        let version = match self.endpoint {
            VersionEndpoint::Releases => {
                let release: ReleaseResponse =
                    serde_json::from_str(body).map_err(|e| decode_error(e.to_string()))?;
                debug!(
                    name = %release.name,
                    builds = release.builds.len(),
                    "decoded release response"
                );
                release.version
            }
            VersionEndpoint::Checkpoint => {
                let check: CheckpointResponse =
                    serde_json::from_str(body).map_err(|e| decode_error(e.to_string()))?;
                debug!(product = %check.product, "decoded checkpoint response");
                check.current_version
            }
        };

        if version.trim().is_empty() {
            return Err(decode_error("response contains an empty version".to_string()));
        }
        Ok(version)
    }
}

impl VersionSource for VersionResolver {
    fn latest_version(&self) -> Result<String, VersionError> {
        self.resolve_latest_version()
    }
}
