//! Settings file for kubelab.
//!
//! Read from `<home>/kubelab.toml`, layered file → environment → CLI:
//!
//! ```toml
//! [defaults]
//! poll_interval_secs = 30
//! convergence_timeout_secs = 1800
//! auto_approve = false
//!
//! [terraform]
//! binary = "terraform"
//! providers_dir = "/opt/kubelab/providers"
//! ```
//!
//! `KUBELAB_TERRAFORM` overrides `terraform.binary` and
//! `KUBELAB_POLL_INTERVAL` overrides `defaults.poll_interval_secs`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::poll::{
    DEFAULT_CONVERGENCE_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS, PollPolicy,
};

pub const CONFIG_FILE_NAME: &str = "kubelab.toml";
pub const TERRAFORM_ENV: &str = "KUBELAB_TERRAFORM";
pub const POLL_INTERVAL_ENV: &str = "KUBELAB_POLL_INTERVAL";

/// Default settings for every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// Seconds between two status checks while waiting on the cloud
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds before a wait gives up
    #[serde(default = "default_convergence_timeout")]
    pub convergence_timeout_secs: u64,
    /// Skip destroy confirmations (same as `--yes`)
    #[serde(default)]
    pub auto_approve: bool,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_convergence_timeout() -> u64 {
    DEFAULT_CONVERGENCE_TIMEOUT_SECS
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            convergence_timeout_secs: default_convergence_timeout(),
            auto_approve: false,
        }
    }
}

/// Terraform settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerraformSection {
    /// Terraform (or OpenTofu) executable
    #[serde(default)]
    pub binary: Option<String>,
    /// Directory holding one module per provider (default `<home>/providers`)
    #[serde(default)]
    pub providers_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabToml {
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub terraform: TerraformSection,
}

impl LabToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse kubelab.toml")
    }

    /// Load `<home>/kubelab.toml`, or defaults if there is none.
    pub fn load_or_default(home: &Path) -> Result<Self> {
        let config_path = home.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize kubelab.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Terraform executable (env → file → `terraform`).
    pub fn terraform_binary(&self) -> String {
        std::env::var(TERRAFORM_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.terraform.binary.clone())
            .unwrap_or_else(|| "terraform".to_string())
    }

    pub fn providers_dir(&self, home: &Path) -> PathBuf {
        self.terraform
            .providers_dir
            .clone()
            .unwrap_or_else(|| home.join("providers"))
    }

    /// Poll policy with the environment interval override applied.
    pub fn poll_policy(&self) -> PollPolicy {
        let interval = match std::env::var(POLL_INTERVAL_ENV) {
            Ok(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "ignoring invalid {}", POLL_INTERVAL_ENV);
                self.defaults.poll_interval_secs
            }),
            Err(_) => self.defaults.poll_interval_secs,
        };
        PollPolicy::new(
            Duration::from_secs(interval),
            Duration::from_secs(self.defaults.convergence_timeout_secs),
        )
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self, home: &Path) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.poll_interval_secs == 0 {
            warnings.push(
                "poll_interval_secs is 0: status queries will run back to back".to_string(),
            );
        }

        if self.defaults.convergence_timeout_secs < self.defaults.poll_interval_secs {
            warnings.push(format!(
                "convergence_timeout_secs ({}) is shorter than poll_interval_secs ({})",
                self.defaults.convergence_timeout_secs, self.defaults.poll_interval_secs
            ));
        }

        let providers_dir = self.providers_dir(home);
        if !providers_dir.is_dir() {
            warnings.push(format!(
                "Terraform providers directory {} does not exist",
                providers_dir.display()
            ));
        }

        if self
            .terraform
            .binary
            .as_deref()
            .is_some_and(|b| b.trim().is_empty())
        {
            warnings.push("terraform.binary is empty".to_string());
        }

        warnings
    }
}
