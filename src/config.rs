use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::action_log::ActionLog;
use crate::catalog::Catalog;
use crate::lab_config::{CONFIG_FILE_NAME, LabToml};
use crate::orchestrator::poll::PollPolicy;
use crate::provider::Terraform;
use crate::registry::ClusterRegistry;
use crate::resolver::ConfigResolver;

pub const HOME_ENV: &str = "KUBELAB_HOME";
pub const DEFAULT_HOME_DIR: &str = ".kubelab";

/// Per-invocation runtime context.
///
/// Built once from the CLI flags and `kubelab.toml`, then handed to every
/// component that needs a path or a policy. Layout under `home`:
///
/// ```text
/// ~/.kubelab/
/// ├── clusters/       # one YAML descriptor per cluster
/// ├── credentials/    # captured provider credentials
/// ├── logs/           # action logs
/// ├── state/          # Terraform state, per provider and cluster
/// ├── catalog/        # product manifests and operator checkouts
/// ├── providers/      # Terraform modules (default location)
/// └── kubelab.toml
/// ```
#[derive(Debug, Clone)]
pub struct LabContext {
    pub home: PathBuf,
    /// The user's own home, where provider CLIs keep their files.
    pub user_home: PathBuf,
    pub clusters_dir: PathBuf,
    pub credentials_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub state_dir: PathBuf,
    pub catalog_dir: PathBuf,
    pub config_file: PathBuf,
    pub settings: LabToml,
    pub poll: PollPolicy,
    pub auto_approve: bool,
    pub verbose: bool,
}

impl LabContext {
    /// `home` defaults to `~/.kubelab`.
    pub fn new(home: Option<PathBuf>, auto_approve: bool, verbose: bool) -> Result<Self> {
        let user_home = dirs::home_dir().context("Failed to determine the user's home directory")?;
        let home = home.unwrap_or_else(|| user_home.join(DEFAULT_HOME_DIR));
        Self::with_paths(home, user_home, auto_approve, verbose)
    }

    pub fn with_paths(
        home: PathBuf,
        user_home: PathBuf,
        auto_approve: bool,
        verbose: bool,
    ) -> Result<Self> {
        let settings = LabToml::load_or_default(&home)?;
        let poll = settings.poll_policy();
        let auto_approve = auto_approve || settings.defaults.auto_approve;

        Ok(Self {
            clusters_dir: home.join("clusters"),
            credentials_dir: home.join("credentials"),
            logs_dir: home.join("logs"),
            state_dir: home.join("state"),
            catalog_dir: home.join("catalog"),
            config_file: home.join(CONFIG_FILE_NAME),
            home,
            user_home,
            settings,
            poll,
            auto_approve,
            verbose,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.clusters_dir)
            .context("Failed to create clusters directory")?;
        std::fs::create_dir_all(&self.credentials_dir)
            .context("Failed to create credentials directory")?;
        std::fs::create_dir_all(&self.logs_dir).context("Failed to create logs directory")?;
        std::fs::create_dir_all(&self.state_dir).context("Failed to create state directory")?;
        std::fs::create_dir_all(&self.catalog_dir)
            .context("Failed to create catalog directory")?;
        Ok(())
    }

    pub fn providers_dir(&self) -> PathBuf {
        self.settings.providers_dir(&self.home)
    }

    pub fn action_log(&self) -> ActionLog {
        ActionLog::new(&self.logs_dir)
    }

    pub fn registry(&self) -> ClusterRegistry {
        ClusterRegistry::new(&self.clusters_dir)
    }

    pub fn resolver(&self) -> ConfigResolver {
        ConfigResolver::new(&self.user_home, &self.credentials_dir)
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(&self.catalog_dir)
    }

    pub fn terraform(&self) -> Terraform {
        Terraform::new(
            self.settings.terraform_binary(),
            &self.providers_dir(),
            &self.state_dir,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_under_home() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("lab");
        let ctx = LabContext::with_paths(home.clone(), dir.path().to_path_buf(), false, false)
            .unwrap();

        assert_eq!(ctx.clusters_dir, home.join("clusters"));
        assert_eq!(ctx.config_file, home.join("kubelab.toml"));
        assert_eq!(ctx.providers_dir(), home.join("providers"));

        ctx.ensure_directories().unwrap();
        assert!(home.join("clusters").is_dir());
        assert!(home.join("credentials").is_dir());
        assert!(home.join("logs").is_dir());
        assert!(home.join("state").is_dir());
        assert!(home.join("catalog").is_dir());
    }

    #[test]
    fn test_auto_approve_from_file_or_flag() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().to_path_buf();

        let ctx = LabContext::with_paths(home.clone(), home.clone(), false, false).unwrap();
        assert!(!ctx.auto_approve);
        let ctx = LabContext::with_paths(home.clone(), home.clone(), true, false).unwrap();
        assert!(ctx.auto_approve);

        std::fs::write(home.join("kubelab.toml"), "[defaults]\nauto_approve = true\n").unwrap();
        let ctx = LabContext::with_paths(home.clone(), home, false, false).unwrap();
        assert!(ctx.auto_approve);
    }

    #[test]
    fn test_broken_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("kubelab.toml"), "defaults = [").unwrap();
        let result = LabContext::with_paths(
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            false,
            false,
        );
        assert!(result.is_err());
    }
}
