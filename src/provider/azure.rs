//! Azure / AKS adapter.
//!
//! Only user-mode node pools count as dependents: AKS refuses to delete the
//! last system pool, which goes away together with the cluster.

use std::sync::Arc;

use async_trait::async_trait;

use super::terraform::{Terraform, TerraformVars};
use super::{
    ClusterState, DependentKind, DependentResource, Location, Provider, ProviderAdapter,
    ProvisionReport, launch, parse_json_output, succeeds, query, run_checked,
};
use crate::errors::LabResult;
use crate::registry::ClusterDescriptor;
use crate::runner::{CommandRunner, ExternalCommand};

const NOT_FOUND: &[&str] = &["ResourceNotFound", "ResourceGroupNotFound", "could not be found", "was not found"];

pub struct AzureAdapter {
    runner: Arc<dyn CommandRunner>,
    terraform: Terraform,
}

impl AzureAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, terraform: Terraform) -> Self {
        Self { runner, terraform }
    }

    fn aks(args: &[&str]) -> ExternalCommand {
        ExternalCommand::new("az").arg("aks").args(args.iter().copied())
    }

    pub fn show_command(name: &str, group: &str) -> ExternalCommand {
        Self::aks(&["show", "--name", name, "--resource-group", group, "--output", "json"])
    }

    pub fn list_nodepools_command(name: &str, group: &str) -> ExternalCommand {
        Self::aks(&["nodepool", "list", "--cluster-name", name, "--resource-group", group, "--output", "json"])
    }

    pub fn delete_nodepool_command(name: &str, pool: &str, group: &str) -> ExternalCommand {
        Self::aks(&[
            "nodepool",
            "delete",
            "--cluster-name",
            name,
            "--resource-group",
            group,
            "--name",
            pool,
            "--no-wait",
        ])
    }

    pub fn delete_cluster_command(name: &str, group: &str) -> ExternalCommand {
        Self::aks(&["delete", "--name", name, "--resource-group", group, "--yes", "--no-wait"])
    }

    pub fn kubeconfig_command(name: &str, group: &str) -> ExternalCommand {
        Self::aks(&["get-credentials", "--name", name, "--resource-group", group, "--overwrite-existing"])
    }

    fn vars(descriptor: &ClusterDescriptor) -> LabResult<TerraformVars> {
        let mut vars = TerraformVars::new();
        vars.insert("cluster_name", descriptor.name.clone());
        vars.insert(
            "resource_group",
            descriptor
                .location
                .require_resource_group(Provider::Azure)?
                .to_string(),
        );
        if let Some(region) = descriptor.location.region() {
            vars.insert("location", region.to_string());
        }
        Ok(vars)
    }
}

#[async_trait]
impl ProviderAdapter for AzureAdapter {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    async fn check_cli_available(&self) -> bool {
        succeeds(self.runner.as_ref(), Provider::Azure, &ExternalCommand::new("az").arg("--version")).await
    }

    async fn check_authenticated(&self) -> bool {
        let cmd = ExternalCommand::new("az").args(["account", "show", "--output", "json"]);
        succeeds(self.runner.as_ref(), Provider::Azure, &cmd).await
    }

    async fn init_infrastructure(&self) -> LabResult<()> {
        self.terraform.prepare(self.runner.as_ref(), Provider::Azure).await
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
        let group = location.require_resource_group(Provider::Azure)?;
        let cmd = Self::show_command(name, group);
        let Some(output) = query(self.runner.as_ref(), Provider::Azure, &cmd, NOT_FOUND).await? else {
            return Ok(None);
        };
        let json = parse_json_output(&cmd, &output)?;
        let status = json["provisioningState"].as_str().unwrap_or("Unknown");
        Ok(Some(ClusterState::new(status)))
    }

    async fn list_dependent_resources(
        &self,
        name: &str,
        location: &Location,
    ) -> LabResult<Vec<DependentResource>> {
        let group = location.require_resource_group(Provider::Azure)?;
        let cmd = Self::list_nodepools_command(name, group);
        let Some(output) = query(self.runner.as_ref(), Provider::Azure, &cmd, NOT_FOUND).await? else {
            return Ok(Vec::new());
        };
        let json = parse_json_output(&cmd, &output)?;
        Ok(json
            .as_array()
            .map(|pools| {
                pools
                    .iter()
                    .filter(|p| p["mode"].as_str().is_some_and(|m| m.eq_ignore_ascii_case("user")))
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
        let group = location.require_resource_group(Provider::Azure)?;
        let cmd = Self::delete_nodepool_command(name, &dependent.name, group);
        launch(self.runner.as_ref(), Provider::Azure, &cmd).await
    }

    async fn delete_cluster(&self, name: &str, location: &Location) -> LabResult<()> {
        let group = location.require_resource_group(Provider::Azure)?;
        launch(self.runner.as_ref(), Provider::Azure, &Self::delete_cluster_command(name, group)).await
    }

    async fn destroy_infrastructure(&self, descriptor: &ClusterDescriptor) -> LabResult<()> {
        let vars = Self::vars(descriptor)?;
        self.terraform
            .teardown(self.runner.as_ref(), descriptor, &vars)
            .await
    }

    async fn update_kubeconfig(&self, name: &str, location: &Location) -> LabResult<()> {
        let group = location.require_resource_group(Provider::Azure)?;
        run_checked(self.runner.as_ref(), Provider::Azure, &Self::kubeconfig_command(name, group)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LabError;
    use crate::provider::testing::ScriptedRunner;
    use crate::registry::ManagedBy;
    use std::path::{Path, PathBuf};

    fn adapter(runner: ScriptedRunner) -> (AzureAdapter, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let tf = Terraform::new("terraform", Path::new("/mods"), Path::new("/state"));
        (AzureAdapter::new(runner.clone(), tf), runner)
    }

    fn rg() -> Location {
        Location::new(None, Some("lab-rg".into()), None)
    }

    #[test]
    fn test_delete_commands_do_not_block_on_azure() {
        assert_eq!(
            AzureAdapter::delete_cluster_command("aks", "lab-rg").to_string(),
            "az aks delete --name aks --resource-group lab-rg --yes --no-wait"
        );
        assert!(
            AzureAdapter::delete_nodepool_command("aks", "user1", "lab-rg")
                .to_string()
                .ends_with("--name user1 --no-wait")
        );
    }

    #[test]
    fn test_vars_include_optional_location() {
        let mut descriptor = ClusterDescriptor::new(
            "aks",
            Provider::Azure,
            rg(),
            PathBuf::from("/creds"),
            ManagedBy::Tool,
        );
        let vars = AzureAdapter::vars(&descriptor).unwrap();
        assert_eq!(vars.get("resource_group").map(String::as_str), Some("lab-rg"));
        assert!(!vars.contains_key("location"));

        descriptor.location.region = Some("westeurope".into());
        let vars = AzureAdapter::vars(&descriptor).unwrap();
        assert_eq!(vars.get("location").map(String::as_str), Some("westeurope"));
    }

    #[tokio::test]
    async fn test_show_reads_provisioning_state() {
        let (az, _) = adapter(
            ScriptedRunner::default().reply(0, r#"{"name": "aks", "provisioningState": "Succeeded"}"#),
        );
        let state = az.describe_cluster("aks", &rg()).await.unwrap();
        assert_eq!(state, Some(ClusterState::new("Succeeded")));
    }

    #[tokio::test]
    async fn test_show_not_found() {
        let (az, _) = adapter(ScriptedRunner::default().reply(
            3,
            "ERROR: (ResourceNotFound) The Resource 'Microsoft.ContainerService/managedClusters/aks' under resource group 'lab-rg' was not found.",
        ));
        assert_eq!(az.describe_cluster("aks", &rg()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_only_user_pools_are_dependents() {
        let (az, _) = adapter(ScriptedRunner::default().reply(
            0,
            r#"[{"name": "system", "mode": "System"}, {"name": "user1", "mode": "User"}]"#,
        ));
        let deps = az.list_dependent_resources("aks", &rg()).await.unwrap();
        assert_eq!(deps, vec![DependentResource::new("user1", DependentKind::NodePool)]);
    }

    #[tokio::test]
    async fn test_resource_group_required_before_any_call() {
        let (az, runner) = adapter(ScriptedRunner::default());
        let result = az.update_kubeconfig("aks", &Location::in_region("westeurope")).await;
        assert!(matches!(result, Err(LabError::MissingParameter { .. })));
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_kubeconfig_failure_is_an_error() {
        let (az, _) = adapter(ScriptedRunner::default().reply(1, "ERROR: Please run 'az login'"));
        let result = az.update_kubeconfig("aks", &rg()).await;
        assert!(matches!(result, Err(LabError::ExternalCommandFailed { .. })));
    }
}
