//! Terraform plumbing shared by all adapters.
//!
//! Each provider has its own module directory (`<providers_dir>/<provider>`)
//! and every cluster gets its own state file
//! (`<state_dir>/<provider>/<name>.tfstate`), so one module can back any
//! number of clusters and `destroy` only touches the resources of the
//! cluster it was asked about.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use super::{Provider, ProvisionReport, launch, parse_json_output, run_checked};
use crate::errors::{LabError, LabResult};
use crate::registry::ClusterDescriptor;
use crate::runner::{CommandRunner, ExternalCommand};

/// `-var` assignments, ordered for reproducible command lines.
pub type TerraformVars = BTreeMap<&'static str, String>;

#[derive(Debug, Clone)]
pub struct Terraform {
    binary: String,
    providers_dir: PathBuf,
    state_dir: PathBuf,
}

impl Terraform {
    pub fn new(binary: impl Into<String>, providers_dir: &Path, state_dir: &Path) -> Self {
        Self {
            binary: binary.into(),
            providers_dir: providers_dir.to_path_buf(),
            state_dir: state_dir.to_path_buf(),
        }
    }

    pub fn module_dir(&self, provider: Provider) -> PathBuf {
        self.providers_dir.join(provider.as_str())
    }

    pub fn state_file(&self, provider: Provider, cluster: &str) -> PathBuf {
        self.state_dir
            .join(provider.as_str())
            .join(format!("{}.tfstate", cluster))
    }

    fn command(&self, provider: Provider) -> ExternalCommand {
        ExternalCommand::new(&self.binary).current_dir(self.module_dir(provider))
    }

    fn state_arg(&self, provider: Provider, cluster: &str) -> String {
        format!("-state={}", self.state_file(provider, cluster).display())
    }

    fn with_vars(cmd: ExternalCommand, vars: &TerraformVars) -> ExternalCommand {
        vars.iter().fold(cmd, |cmd, (key, value)| {
            cmd.arg("-var").arg(format!("{}={}", key, value))
        })
    }

    pub fn init(&self, provider: Provider) -> ExternalCommand {
        self.command(provider).args(["init", "-input=false"])
    }

    pub fn apply(&self, provider: Provider, cluster: &str, vars: &TerraformVars) -> ExternalCommand {
        let cmd = self
            .command(provider)
            .args(["apply", "-auto-approve", "-input=false"])
            .arg(self.state_arg(provider, cluster));
        Self::with_vars(cmd, vars)
    }

    pub fn destroy(&self, provider: Provider, cluster: &str, vars: &TerraformVars) -> ExternalCommand {
        let cmd = self
            .command(provider)
            .args(["destroy", "-auto-approve", "-input=false"])
            .arg(self.state_arg(provider, cluster));
        Self::with_vars(cmd, vars)
    }

    pub fn output_json(&self, provider: Provider, cluster: &str) -> ExternalCommand {
        self.command(provider)
            .args(["output", "-json"])
            .arg(self.state_arg(provider, cluster))
    }

    fn ensure_module(&self, provider: Provider) -> LabResult<PathBuf> {
        let dir = self.module_dir(provider);
        if !dir.is_dir() {
            return Err(LabError::Other(anyhow!(
                "Terraform module for {} not found at {}. Set [terraform] providers_dir in kubelab.toml",
                provider,
                dir.display()
            )));
        }
        Ok(dir)
    }

    /// `terraform init` in the provider module.
    pub async fn prepare(&self, runner: &dyn CommandRunner, provider: Provider) -> LabResult<()> {
        self.ensure_module(provider)?;
        run_checked(runner, provider, &self.init(provider)).await?;
        Ok(())
    }

    /// Init and apply. When `wait` is false the apply runs in the background
    /// and the report carries no outputs.
    pub async fn provision(
        &self,
        runner: &dyn CommandRunner,
        descriptor: &ClusterDescriptor,
        vars: &TerraformVars,
        wait: bool,
    ) -> LabResult<ProvisionReport> {
        let provider = descriptor.provider;
        self.prepare(runner, provider).await?;

        let state_parent = self.state_dir.join(provider.as_str());
        std::fs::create_dir_all(&state_parent).map_err(|e| LabError::io(&state_parent, e))?;

        let apply = self.apply(provider, &descriptor.name, vars);
        if !wait {
            launch(runner, provider, &apply).await?;
            return Ok(ProvisionReport::default());
        }

        run_checked(runner, provider, &apply).await?;
        let output_cmd = self.output_json(provider, &descriptor.name);
        let raw = run_checked(runner, provider, &output_cmd).await?;
        Ok(ProvisionReport {
            completed: true,
            outputs: parse_outputs(&output_cmd, &raw)?,
        })
    }

    /// `terraform destroy` against the cluster's own state.
    pub async fn teardown(
        &self,
        runner: &dyn CommandRunner,
        descriptor: &ClusterDescriptor,
        vars: &TerraformVars,
    ) -> LabResult<()> {
        let provider = descriptor.provider;
        self.prepare(runner, provider).await?;
        run_checked(runner, provider, &self.destroy(provider, &descriptor.name, vars)).await?;
        Ok(())
    }
}

/// Flatten `terraform output -json` (`{"name": {"value": ..., "type": ...}}`).
fn parse_outputs(
    command: &ExternalCommand,
    raw: &str,
) -> LabResult<BTreeMap<String, serde_json::Value>> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let json = parse_json_output(command, raw)?;
    let outputs = json
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(key, entry)| {
                    let value = entry.get("value").cloned().unwrap_or_else(|| entry.clone());
                    (key.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(outputs)
}
