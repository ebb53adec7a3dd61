//! GCP / GKE adapter.

use std::sync::Arc;

use async_trait::async_trait;

use super::terraform::{Terraform, TerraformVars};
use super::{
    ClusterState, DependentKind, DependentResource, Location, Provider, ProviderAdapter,
    ProvisionReport, launch, parse_json_output, succeeds, query, run_checked,
};
use crate::errors::LabResult;
use crate::registry::ClusterDescriptor;
use crate::runner::{CommandRunner, ExternalCommand, LogTarget};

const NOT_FOUND: &[&str] = &["NOT_FOUND", "was not found", "Not found"];

pub struct GcpAdapter {
    runner: Arc<dyn CommandRunner>,
    terraform: Terraform,
}

/// Region and project, both mandatory for every GKE call.
struct Scope<'a> {
    region: &'a str,
    project: &'a str,
}

impl<'a> Scope<'a> {
    fn of(location: &'a Location) -> LabResult<Self> {
        Ok(Self {
            region: location.require_region(Provider::Gcp)?,
            project: location.require_project(Provider::Gcp)?,
        })
    }

    fn flags(&self) -> [String; 4] {
        [
            "--region".to_string(),
            self.region.to_string(),
            "--project".to_string(),
            self.project.to_string(),
        ]
    }
}

impl GcpAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, terraform: Terraform) -> Self {
        Self { runner, terraform }
    }

    fn container(args: &[&str], scope: &Scope<'_>) -> ExternalCommand {
        ExternalCommand::new("gcloud")
            .arg("container")
            .args(args.iter().copied())
            .args(scope.flags())
    }

    fn describe_command(name: &str, scope: &Scope<'_>) -> ExternalCommand {
        Self::container(&["clusters", "describe", name], scope).arg("--format=json")
    }

    fn list_nodepools_command(name: &str, scope: &Scope<'_>) -> ExternalCommand {
        Self::container(&["node-pools", "list", "--cluster", name], scope).arg("--format=json")
    }

    fn delete_nodepool_command(name: &str, pool: &str, scope: &Scope<'_>) -> ExternalCommand {
        Self::container(&["node-pools", "delete", pool, "--cluster", name], scope)
            .args(["--quiet", "--async"])
    }

    fn delete_cluster_command(name: &str, scope: &Scope<'_>) -> ExternalCommand {
        Self::container(&["clusters", "delete", name], scope).args(["--quiet", "--async"])
    }

    fn kubeconfig_command(name: &str, scope: &Scope<'_>) -> ExternalCommand {
        Self::container(&["clusters", "get-credentials", name], scope)
    }

    fn vars(descriptor: &ClusterDescriptor) -> LabResult<TerraformVars> {
        let scope = Scope::of(&descriptor.location)?;
        let mut vars = TerraformVars::new();
        vars.insert("cluster_name", descriptor.name.clone());
        vars.insert("region", scope.region.to_string());
        vars.insert("project", scope.project.to_string());
        Ok(vars)
    }
}

#[async_trait]
impl ProviderAdapter for GcpAdapter {
    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    /// GKE rejects a node-pool operation while another runs on the cluster.
    fn serial_dependent_deletes(&self) -> bool {
        true
    }

    async fn check_cli_available(&self) -> bool {
        succeeds(self.runner.as_ref(), Provider::Gcp, &ExternalCommand::new("gcloud").arg("--version")).await
    }

    async fn check_authenticated(&self) -> bool {
        let cmd = ExternalCommand::new("gcloud").args([
            "auth",
            "list",
            "--filter=status:ACTIVE",
            "--format=value(account)",
        ]);
        match self.runner.run(&cmd, LogTarget::Provider(Provider::Gcp), true).await {
            Ok(output) => output.success() && !output.output.trim().is_empty(),
            Err(_) => false,
        }
    }

    async fn init_infrastructure(&self) -> LabResult<()> {
        self.terraform.prepare(self.runner.as_ref(), Provider::Gcp).await
    }

    async fn create_cluster(
        &self,
        descriptor: &ClusterDescriptor,
        wait: bool,
    ) -> LabResult<ProvisionReport> {
        let vars = Self::vars(descriptor)?;
        self.terraform
            .provision(self.runner.as_ref(), descriptor, &vars, wait)
            .await
    }

    async fn describe_cluster(
        &self,
        name: &str,
        location: &Location,
    ) -> LabResult<Option<ClusterState>> {
        let cmd = Self::describe_command(name, &Scope::of(location)?);
        let Some(output) = query(self.runner.as_ref(), Provider::Gcp, &cmd, NOT_FOUND).await? else {
            return Ok(None);
        };
        let json = parse_json_output(&cmd, &output)?;
        let status = json["status"].as_str().unwrap_or("STATUS_UNSPECIFIED");
        Ok(Some(ClusterState::new(status)))
    }

    async fn list_dependent_resources(
        &self,
        name: &str,
        location: &Location,
    ) -> LabResult<Vec<DependentResource>> {
        let cmd = Self::list_nodepools_command(name, &Scope::of(location)?);
        let Some(output) = query(self.runner.as_ref(), Provider::Gcp, &cmd, NOT_FOUND).await? else {
            return Ok(Vec::new());
        };
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        let json = parse_json_output(&cmd, &output)?;
        Ok(json
            .as_array()
            .map(|pools| {
                pools
                    .iter()
                    .filter_map(|p| p["name"].as_str())
                    .map(|p| DependentResource::new(p, DependentKind::NodePool))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_dependent_resource(
        &self,
        name: &str,
        dependent: &DependentResource,
        location: &Location,
    ) -> LabResult<()> {
        let cmd = Self::delete_nodepool_command(name, &dependent.name, &Scope::of(location)?);
        launch(self.runner.as_ref(), Provider::Gcp, &cmd).await
    }

    async fn delete_cluster(&self, name: &str, location: &Location) -> LabResult<()> {
        let cmd = Self::delete_cluster_command(name, &Scope::of(location)?);
        launch(self.runner.as_ref(), Provider::Gcp, &cmd).await
    }

    async fn destroy_infrastructure(&self, descriptor: &ClusterDescriptor) -> LabResult<()> {
        let vars = Self::vars(descriptor)?;
        self.terraform
            .teardown(self.runner.as_ref(), descriptor, &vars)
            .await
    }

    async fn update_kubeconfig(&self, name: &str, location: &Location) -> LabResult<()> {
        let cmd = Self::kubeconfig_command(name, &Scope::of(location)?);
        run_checked(self.runner.as_ref(), Provider::Gcp, &cmd).await?;
        Ok(())
    }
}
