//! Provider adapters.
//!
//! Each cloud gets one `ProviderAdapter` implementation that turns an
//! abstract cluster operation into the concrete `aws`, `az`, `gcloud` or
//! `terraform` invocation. The orchestrator picks an adapter once per
//! operation through an `AdapterSource` and never branches on the provider
//! again.
//!
//! | Provider | Cluster CLI | Dependents            |
//! |----------|-------------|-----------------------|
//! | `aws`    | `aws eks`   | node groups           |
//! | `azure`  | `az aks`    | user-mode node pools  |
//! | `gcp`    | `gcloud`    | node pools            |

pub mod aws;
pub mod azure;
pub mod gcp;
pub mod terraform;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LabContext;
use crate::errors::{LabError, LabResult};
use crate::orchestrator::poll::{PollPolicy, poll_until};
use crate::registry::ClusterDescriptor;
use crate::runner::{CommandRunner, ExternalCommand, LogTarget, ProcessRunner};

pub use aws::AwsAdapter;
pub use azure::AzureAdapter;
pub use gcp::GcpAdapter;
pub use terraform::Terraform;

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Aws, Provider::Azure, Provider::Gcp];

    /// Lowercase identifier used on the command line and in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
        }
    }

    /// The provider's own command-line tool.
    pub fn cli(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "az",
            Provider::Gcp => "gcloud",
        }
    }

    /// What to run when the CLI is installed but not signed in.
    pub fn login_command(&self) -> &'static str {
        match self {
            Provider::Aws => "aws configure",
            Provider::Azure => "az login",
            Provider::Gcp => "gcloud auth login",
        }
    }

    /// AKS clusters are addressed by resource group; the others by region.
    pub fn requires_region(&self) -> bool {
        !matches!(self, Provider::Azure)
    }

    /// Native authentication state captured by `kubelab init`.
    pub fn credential_file(&self, user_home: &Path) -> PathBuf {
        match self {
            Provider::Aws => user_home.join(".aws").join("credentials"),
            Provider::Azure => user_home.join(".azure").join("azureProfile.json"),
            Provider::Gcp => gcloud_default_config(user_home),
        }
    }

    /// Native configuration file holding region / group / project defaults.
    pub fn config_file(&self, user_home: &Path) -> PathBuf {
        match self {
            Provider::Aws => user_home.join(".aws").join("config"),
            Provider::Azure => user_home.join(".azure").join("config"),
            Provider::Gcp => gcloud_default_config(user_home),
        }
    }

    pub fn log_file_name(&self) -> String {
        format!("kubelab-{}.log", self.as_str())
    }

    /// Kind of the sub-resources that must go before the cluster itself.
    pub fn dependent_kind(&self) -> DependentKind {
        match self {
            Provider::Aws => DependentKind::NodeGroup,
            Provider::Azure | Provider::Gcp => DependentKind::NodePool,
        }
    }
}

fn gcloud_default_config(user_home: &Path) -> PathBuf {
    user_home
        .join(".config")
        .join("gcloud")
        .join("configurations")
        .join("config_default")
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Aws => write!(f, "AWS"),
            Provider::Azure => write!(f, "Azure"),
            Provider::Gcp => write!(f, "GCP"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aws" | "eks" => Ok(Provider::Aws),
            "azure" | "aks" => Ok(Provider::Azure),
            "gcp" | "gke" => Ok(Provider::Gcp),
            _ => Err(LabError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Where a cluster lives. Which fields are mandatory depends on the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Location {
    pub fn new(
        region: Option<String>,
        resource_group: Option<String>,
        project: Option<String>,
    ) -> Self {
        Self {
            region,
            resource_group,
            project,
        }
    }

    pub fn in_region(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..Default::default()
        }
    }

    pub fn region(&self) -> Option<&str> {
        non_blank(&self.region)
    }

    pub fn resource_group(&self) -> Option<&str> {
        non_blank(&self.resource_group)
    }

    pub fn project(&self) -> Option<&str> {
        non_blank(&self.project)
    }

    pub fn require_region(&self, provider: Provider) -> LabResult<&str> {
        self.region().ok_or_else(|| {
            LabError::missing(
                "region",
                format!("{} clusters need --region or a default region in the {} config", provider, provider.cli()),
            )
        })
    }

    pub fn require_resource_group(&self, provider: Provider) -> LabResult<&str> {
        self.resource_group().ok_or_else(|| {
            LabError::missing(
                "resource-group",
                format!("{} clusters need --resource-group or `az config set defaults.group=<name>`", provider),
            )
        })
    }

    pub fn require_project(&self, provider: Provider) -> LabResult<&str> {
        self.project().ok_or_else(|| {
            LabError::missing(
                "project",
                format!("{} clusters need --project or `gcloud config set project <id>`", provider),
            )
        })
    }

    /// Check the provider-specific presence rules.
    pub fn validate(&self, provider: Provider) -> LabResult<()> {
        match provider {
            Provider::Aws => {
                self.require_region(provider)?;
            }
            Provider::Azure => {
                self.require_resource_group(provider)?;
            }
            Provider::Gcp => {
                self.require_region(provider)?;
                self.require_project(provider)?;
            }
        }
        Ok(())
    }

    /// Fill blank fields from `defaults`. Explicit values always win.
    pub fn fill_from(&self, defaults: &Location) -> Location {
        let pick = |explicit: Option<&str>, fallback: Option<&str>| {
            explicit.or(fallback).map(str::to_string)
        };
        Location {
            region: pick(self.region(), defaults.region()),
            resource_group: pick(self.resource_group(), defaults.resource_group()),
            project: pick(self.project(), defaults.project()),
        }
    }

    /// Human readable summary for prompts and tables.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(project) = self.project() {
            parts.push(format!("project {}", project));
        }
        if let Some(group) = self.resource_group() {
            parts.push(format!("resource group {}", group));
        }
        if let Some(region) = self.region() {
            parts.push(format!("region {}", region));
        }
        if parts.is_empty() {
            "no location".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Live status of a cluster as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterState {
    pub status: String,
}

impl ClusterState {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }

    pub fn is_deleting(&self) -> bool {
        matches!(self.status.to_uppercase().as_str(), "DELETING" | "STOPPING")
    }

    pub fn is_creating(&self) -> bool {
        matches!(
            self.status.to_uppercase().as_str(),
            "CREATING" | "PROVISIONING"
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependentKind {
    NodeGroup,
    NodePool,
}

impl DependentKind {
    pub fn plural(&self) -> &'static str {
        match self {
            DependentKind::NodeGroup => "node groups",
            DependentKind::NodePool => "node pools",
        }
    }
}

impl std::fmt::Display for DependentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependentKind::NodeGroup => write!(f, "node group"),
            DependentKind::NodePool => write!(f, "node pool"),
        }
    }
}

/// A sub-resource (node group / pool) attached to a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentResource {
    pub name: String,
    pub kind: DependentKind,
}

impl DependentResource {
    pub fn new(name: impl Into<String>, kind: DependentKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Result of a Terraform apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionReport {
    /// False when the apply was launched in the background.
    pub completed: bool,
    /// `terraform output -json` values, flattened to their `value` field.
    pub outputs: BTreeMap<String, serde_json::Value>,
}

/// The capability set every cloud implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn check_cli_available(&self) -> bool;

    async fn check_authenticated(&self) -> bool;

    /// Prepare the provider's Terraform module (`terraform init`).
    async fn init_infrastructure(&self) -> LabResult<()>;

    async fn create_cluster(
        &self,
        descriptor: &ClusterDescriptor,
        wait: bool,
    ) -> LabResult<ProvisionReport>;

    /// `Ok(None)` means the cluster does not exist. Query failures are errors.
    async fn describe_cluster(
        &self,
        name: &str,
        location: &Location,
    ) -> LabResult<Option<ClusterState>>;

    async fn list_dependent_resources(
        &self,
        name: &str,
        location: &Location,
    ) -> LabResult<Vec<DependentResource>>;

    /// Fire-and-forget deletion of one dependent.
    async fn delete_dependent_resource(
        &self,
        name: &str,
        dependent: &DependentResource,
        location: &Location,
    ) -> LabResult<()>;

    /// Fire-and-forget deletion of the cluster object.
    async fn delete_cluster(&self, name: &str, location: &Location) -> LabResult<()>;

    async fn destroy_infrastructure(&self, descriptor: &ClusterDescriptor) -> LabResult<()>;

    /// Point the local kubeconfig at the cluster.
    async fn update_kubeconfig(&self, name: &str, location: &Location) -> LabResult<()>;

    /// True when the cloud runs one dependent operation per cluster at a
    /// time, so deletes must be issued one after another.
    fn serial_dependent_deletes(&self) -> bool {
        false
    }

    async fn wait_for_dependent_gone(
        &self,
        name: &str,
        dependent: &DependentResource,
        location: &Location,
        poll: PollPolicy,
    ) -> LabResult<()> {
        let what = format!(
            "{} '{}' of cluster '{}' to be deleted",
            dependent.kind, dependent.name, name
        );
        poll_until(poll, &what, move || async move {
            Ok(!self
                .list_dependent_resources(name, location)
                .await?
                .iter()
                .any(|d| d.name == dependent.name))
        })
        .await
    }

    async fn wait_for_dependents_cleared(
        &self,
        name: &str,
        location: &Location,
        poll: PollPolicy,
    ) -> LabResult<()> {
        let what = format!(
            "{} of cluster '{}' to be deleted",
            self.provider().dependent_kind().plural(),
            name
        );
        poll_until(poll, &what, move || async move {
            Ok(self
                .list_dependent_resources(name, location)
                .await?
                .is_empty())
        })
        .await
    }

    async fn wait_for_cluster_gone(
        &self,
        name: &str,
        location: &Location,
        poll: PollPolicy,
    ) -> LabResult<()> {
        let what = format!("cluster '{}' to be deleted", name);
        poll_until(poll, &what, move || async move {
            Ok(self.describe_cluster(name, location).await?.is_none())
        })
        .await
    }
}

/// Selects the adapter for a provider.
pub trait AdapterSource: Send + Sync {
    fn adapter(&self, provider: Provider) -> Arc<dyn ProviderAdapter>;
}

/// The real adapters, all sharing one runner and Terraform setup.
pub struct CloudAdapters {
    runner: Arc<dyn CommandRunner>,
    terraform: Terraform,
}

impl CloudAdapters {
    pub fn new(runner: Arc<dyn CommandRunner>, terraform: Terraform) -> Self {
        Self { runner, terraform }
    }

    pub fn from_context(ctx: &LabContext) -> Self {
        let runner = Arc::new(ProcessRunner::new(ctx.action_log()));
        Self::new(runner, ctx.terraform())
    }

    /// The runner shared by every adapter, for commands outside a provider CLI.
    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }
}

impl AdapterSource for CloudAdapters {
    fn adapter(&self, provider: Provider) -> Arc<dyn ProviderAdapter> {
        let runner = Arc::clone(&self.runner);
        let terraform = self.terraform.clone();
        match provider {
            Provider::Aws => Arc::new(AwsAdapter::new(runner, terraform)),
            Provider::Azure => Arc::new(AzureAdapter::new(runner, terraform)),
            Provider::Gcp => Arc::new(GcpAdapter::new(runner, terraform)),
        }
    }
}

/// Run a blocking command and return its output, failing on non-zero exit.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    provider: Provider,
    command: &ExternalCommand,
) -> LabResult<String> {
    runner
        .run(command, LogTarget::Provider(provider), true)
        .await?
        .into_result(command)
}

/// Run a blocking command and report whether it succeeded.
pub(crate) async fn succeeds(
    runner: &dyn CommandRunner,
    provider: Provider,
    command: &ExternalCommand,
) -> bool {
    match runner.run(command, LogTarget::Provider(provider), true).await {
        Ok(output) => output.success(),
        Err(err) => {
            tracing::debug!(%provider, error = %err, "check command failed");
            false
        }
    }
}

/// Launch a command without waiting for it.
pub(crate) async fn launch(
    runner: &dyn CommandRunner,
    provider: Provider,
    command: &ExternalCommand,
) -> LabResult<()> {
    runner
        .run(command, LogTarget::Provider(provider), false)
        .await
        .map(|_| ())
}

/// Run a query whose failure may mean "does not exist".
///
/// Returns `Ok(None)` when the command failed and its output contains one of
/// `not_found_markers`; any other failure is surfaced as an error.
pub(crate) async fn query(
    runner: &dyn CommandRunner,
    provider: Provider,
    command: &ExternalCommand,
    not_found_markers: &[&str],
) -> LabResult<Option<String>> {
    let output = runner
        .run(command, LogTarget::Provider(provider), true)
        .await?;
    if output.success() {
        return Ok(Some(output.output));
    }
    if not_found_markers
        .iter()
        .any(|marker| output.output.contains(marker))
    {
        return Ok(None);
    }
    output.into_result(command).map(Some)
}

/// Parse the JSON document embedded in command output.
///
/// Provider CLIs print warnings on stderr, which the runner merges into the
/// same text, so the document is located before parsing.
pub(crate) fn parse_json_output(command: &ExternalCommand, output: &str) -> LabResult<serde_json::Value> {
    let document = crate::util::extract_json(output).ok_or_else(|| LabError::ExternalCommandFailed {
        command: command.to_string(),
        exit_code: 0,
        output: format!("expected JSON output, got: {}", output.trim()),
    })?;
    // A half-written document is as transient as a failed query.
    serde_json::from_str(document).map_err(|e| LabError::ExternalCommandFailed {
        command: command.to_string(),
        exit_code: 0,
        output: format!("malformed JSON output ({}): {}", e, output.trim()),
    })
}
