//! AWS / EKS adapter.

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

const NOT_FOUND: &[&str] = &["ResourceNotFoundException", "No cluster found"];

pub struct AwsAdapter {
    runner: Arc<dyn CommandRunner>,
    terraform: Terraform,
}

impl AwsAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, terraform: Terraform) -> Self {
        Self { runner, terraform }
    }

    fn eks(args: &[&str]) -> ExternalCommand {
        ExternalCommand::new("aws").arg("eks").args(args.iter().copied())
    }

    pub fn describe_command(name: &str, region: &str) -> ExternalCommand {
        Self::eks(&["describe-cluster", "--name", name, "--region", region, "--output", "json"])
    }

    pub fn list_nodegroups_command(name: &str, region: &str) -> ExternalCommand {
        Self::eks(&["list-nodegroups", "--cluster-name", name, "--region", region, "--output", "json"])
    }

    pub fn delete_nodegroup_command(name: &str, nodegroup: &str, region: &str) -> ExternalCommand {
        Self::eks(&[
            "delete-nodegroup",
            "--cluster-name",
            name,
            "--nodegroup-name",
            nodegroup,
            "--region",
            region,
        ])
    }

    pub fn delete_cluster_command(name: &str, region: &str) -> ExternalCommand {
        Self::eks(&["delete-cluster", "--name", name, "--region", region])
    }

    pub fn kubeconfig_command(name: &str, region: &str) -> ExternalCommand {
        Self::eks(&["update-kubeconfig", "--name", name, "--region", region])
    }

    fn vars(descriptor: &ClusterDescriptor) -> LabResult<TerraformVars> {
        let mut vars = TerraformVars::new();
        vars.insert("cluster_name", descriptor.name.clone());
        vars.insert(
            "region",
            descriptor.location.require_region(Provider::Aws)?.to_string(),
        );
        Ok(vars)
    }
}

#[async_trait]
impl ProviderAdapter for AwsAdapter {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    async fn check_cli_available(&self) -> bool {
        succeeds(self.runner.as_ref(), Provider::Aws, &ExternalCommand::new("aws").arg("--version")).await
    }

    async fn check_authenticated(&self) -> bool {
        let cmd = ExternalCommand::new("aws").args(["sts", "get-caller-identity", "--output", "json"]);
        succeeds(self.runner.as_ref(), Provider::Aws, &cmd).await
    }

    async fn init_infrastructure(&self) -> LabResult<()> {
        self.terraform.prepare(self.runner.as_ref(), Provider::Aws).await
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
        let cmd = Self::describe_command(name, location.require_region(Provider::Aws)?);
        let Some(output) = query(self.runner.as_ref(), Provider::Aws, &cmd, NOT_FOUND).await? else {
            return Ok(None);
        };
        let json = parse_json_output(&cmd, &output)?;
        let status = json["cluster"]["status"].as_str().unwrap_or("UNKNOWN");
        Ok(Some(ClusterState::new(status)))
    }

    async fn list_dependent_resources(
        &self,
        name: &str,
        location: &Location,
    ) -> LabResult<Vec<DependentResource>> {
        let cmd = Self::list_nodegroups_command(name, location.require_region(Provider::Aws)?);
        let Some(output) = query(self.runner.as_ref(), Provider::Aws, &cmd, NOT_FOUND).await? else {
            return Ok(Vec::new());
        };
        let json = parse_json_output(&cmd, &output)?;
        Ok(json["nodegroups"]
            .as_array()
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|g| g.as_str())
                    .map(|g| DependentResource::new(g, DependentKind::NodeGroup))
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
        let region = location.require_region(Provider::Aws)?;
        let cmd = Self::delete_nodegroup_command(name, &dependent.name, region);
        launch(self.runner.as_ref(), Provider::Aws, &cmd).await
    }

    async fn delete_cluster(&self, name: &str, location: &Location) -> LabResult<()> {
        let cmd = Self::delete_cluster_command(name, location.require_region(Provider::Aws)?);
        launch(self.runner.as_ref(), Provider::Aws, &cmd).await
    }

    async fn destroy_infrastructure(&self, descriptor: &ClusterDescriptor) -> LabResult<()> {
        let vars = Self::vars(descriptor)?;
        self.terraform
            .teardown(self.runner.as_ref(), descriptor, &vars)
            .await
    }

    async fn update_kubeconfig(&self, name: &str, location: &Location) -> LabResult<()> {
        let cmd = Self::kubeconfig_command(name, location.require_region(Provider::Aws)?);
        run_checked(self.runner.as_ref(), Provider::Aws, &cmd).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LabError;
    use crate::orchestrator::poll::PollPolicy;
    use crate::provider::testing::ScriptedRunner;
    use std::path::Path;
    use std::time::Duration;

    fn adapter(runner: ScriptedRunner) -> (AwsAdapter, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let tf = Terraform::new("terraform", Path::new("/mods"), Path::new("/state"));
        (AwsAdapter::new(runner.clone(), tf), runner)
    }

    fn eu() -> Location {
        Location::in_region("eu-west-2")
    }

    #[test]
    fn test_command_lines() {
        assert_eq!(
            AwsAdapter::describe_command("eks", "eu-west-2").to_string(),
            "aws eks describe-cluster --name eks --region eu-west-2 --output json"
        );
        assert_eq!(
            AwsAdapter::delete_nodegroup_command("eks", "ng-1", "eu-west-2").to_string(),
            "aws eks delete-nodegroup --cluster-name eks --nodegroup-name ng-1 --region eu-west-2"
        );
        assert_eq!(
            AwsAdapter::kubeconfig_command("eks", "eu-west-2").to_string(),
            "aws eks update-kubeconfig --name eks --region eu-west-2"
        );
    }

    #[tokio::test]
    async fn test_describe_reads_status() {
        let (aws, _) = adapter(
            ScriptedRunner::default().reply(0, r#"{"cluster": {"name": "eks", "status": "ACTIVE"}}"#),
        );
        let state = aws.describe_cluster("eks", &eu()).await.unwrap();
        assert_eq!(state, Some(ClusterState::new("ACTIVE")));
    }

    #[tokio::test]
    async fn test_describe_distinguishes_not_found_from_failure() {
        let (aws, _) = adapter(ScriptedRunner::default().reply(
            254,
            "An error occurred (ResourceNotFoundException) when calling the DescribeCluster operation: No cluster found for name: eks.",
        ));
        assert_eq!(aws.describe_cluster("eks", &eu()).await.unwrap(), None);

        let (aws, _) = adapter(ScriptedRunner::default().reply(
            255,
            "Could not connect to the endpoint URL: \"https://eks.eu-west-2.amazonaws.com/\"",
        ));
        assert!(matches!(
            aws.describe_cluster("eks", &eu()).await,
            Err(LabError::ExternalCommandFailed { exit_code: 255, .. })
        ));
    }

    #[tokio::test]
    async fn test_describe_requires_region() {
        let (aws, runner) = adapter(ScriptedRunner::default());
        let result = aws.describe_cluster("eks", &Location::default()).await;
        assert!(matches!(result, Err(LabError::MissingParameter { .. })));
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_list_nodegroups() {
        let (aws, _) = adapter(
            ScriptedRunner::default().reply(0, r#"{"nodegroups": ["ng-1", "ng-2"]}"#),
        );
        let deps = aws.list_dependent_resources("eks", &eu()).await.unwrap();
        assert_eq!(
            deps,
            vec![
                DependentResource::new("ng-1", DependentKind::NodeGroup),
                DependentResource::new("ng-2", DependentKind::NodeGroup),
            ]
        );
    }

    #[tokio::test]
    async fn test_deletes_are_fire_and_forget() {
        let (aws, runner) = adapter(ScriptedRunner::default());
        let ng = DependentResource::new("ng-1", DependentKind::NodeGroup);
        aws.delete_dependent_resource("eks", &ng, &eu()).await.unwrap();
        aws.delete_cluster("eks", &eu()).await.unwrap();
        let seen = runner.seen.lock().unwrap();
        assert!(seen.iter().all(|(_, blocking)| !blocking));
        assert!(seen[1].0.starts_with("aws eks delete-cluster"));
    }

    #[tokio::test]
    async fn test_wait_for_nodegroups_polls_until_empty() {
        let (aws, runner) = adapter(
            ScriptedRunner::default()
                .reply(0, r#"{"nodegroups": ["ng-1"]}"#)
                .reply(0, r#"{"nodegroups": []}"#),
        );
        let poll = PollPolicy::new(Duration::ZERO, Duration::from_secs(5));
        aws.wait_for_dependents_cleared("eks", &eu(), poll).await.unwrap();
        assert_eq!(runner.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_cluster_gone() {
        let (aws, _) = adapter(
            ScriptedRunner::default()
                .reply(0, r#"{"cluster": {"status": "DELETING"}}"#)
                .reply(254, "ResourceNotFoundException"),
        );
        let poll = PollPolicy::new(Duration::ZERO, Duration::from_secs(5));
        aws.wait_for_cluster_gone("eks", &eu(), poll).await.unwrap();
    }
}
