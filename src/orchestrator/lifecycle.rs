//! Create, use, inspect and destroy sequencing.
//!
//! Parameter and registry checks always run before the first external call,
//! so a rejected request leaves both the cloud and the registry untouched.
//! Every failure is also written to the provider's action log, or to the
//! generic log while the provider is not known yet.

use std::sync::Arc;

use futures::future::try_join_all;

use super::gate::{self, Prompter};
use super::poll::PollPolicy;
use super::{
    ClusterInspection, ClusterPhase, CreateOutcome, CreateRequest, DestroyOutcome, DestroyRequest,
    DestroyStep, DestroyTarget, UseOutcome, UseRequest,
};
use crate::action_log::ActionLog;
use crate::config::LabContext;
use crate::errors::{LabError, LabResult};
use crate::provider::{AdapterSource, Provider, ProviderAdapter};
use crate::registry::{ClusterDescriptor, ClusterRegistry, ManagedBy, validate_name};
use crate::resolver::{ConfigResolver, ProviderCredential};
use crate::runner::LogTarget;

pub struct Orchestrator {
    registry: ClusterRegistry,
    resolver: ConfigResolver,
    adapters: Arc<dyn AdapterSource>,
    prompter: Arc<dyn Prompter>,
    log: ActionLog,
    poll: PollPolicy,
}

impl Orchestrator {
    pub fn new(
        ctx: &LabContext,
        adapters: Arc<dyn AdapterSource>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            registry: ctx.registry(),
            resolver: ctx.resolver(),
            adapters,
            prompter,
            log: ctx.action_log(),
            poll: ctx.poll,
        }
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Check the CLI, capture credentials and prepare the Terraform module.
    pub async fn init_provider(&self, provider: Provider) -> LabResult<ProviderCredential> {
        let target = LogTarget::Provider(provider);
        self.log.info(target, format!("Initializing {}", provider));

        let result = async {
            let adapter = self.adapters.adapter(provider);
            ensure_tooling(adapter.as_ref()).await?;
            let credential = self.resolver.capture_credentials(provider)?;
            self.log.info(
                target,
                format!("{} credentials saved to {}", provider, credential.path.display()),
            );
            adapter.init_infrastructure().await?;
            self.log.info(target, format!("{} initialized", provider));
            Ok::<_, LabError>(credential)
        }
        .await;

        self.logged(target, result)
    }

    pub async fn create(&self, request: CreateRequest) -> LabResult<CreateOutcome> {
        let target = LogTarget::Provider(request.provider);
        let result = self.create_cluster(request).await;
        self.logged(target, result)
    }

    async fn create_cluster(&self, request: CreateRequest) -> LabResult<CreateOutcome> {
        let CreateRequest {
            name,
            provider,
            location,
            wait,
        } = request;

        validate_name(&name)?;
        if self.registry.contains(&name) {
            return Err(LabError::DuplicateName { name });
        }
        let location = self.resolver.resolve(provider, &location)?;
        location.validate(provider)?;

        let adapter = self.adapters.adapter(provider);
        ensure_tooling(adapter.as_ref()).await?;

        let credential = self.resolver.credential(provider);
        if !credential.captured {
            self.log.warn(
                LogTarget::Provider(provider),
                format!("{} credentials not captured yet; run `kubelab init {}`", provider, provider.as_str()),
            );
        }

        let descriptor =
            ClusterDescriptor::new(name, provider, location, credential.path, ManagedBy::Tool);
        self.transition(&descriptor, ClusterPhase::Absent, ClusterPhase::Creating);

        let report = adapter.create_cluster(&descriptor, wait).await?;
        self.registry.create(&descriptor)?;

        if report.completed {
            self.transition(&descriptor, ClusterPhase::Creating, ClusterPhase::Ready);
        } else {
            self.log.info(
                LogTarget::Provider(provider),
                format!("Cluster '{}' creation continues in background", descriptor.name),
            );
        }

        Ok(CreateOutcome { descriptor, report })
    }

    /// Registered clusters matching the optional glob and provider filter.
    pub fn list(
        &self,
        name_pattern: Option<&str>,
        provider: Option<Provider>,
    ) -> LabResult<Vec<ClusterDescriptor>> {
        self.registry.find(name_pattern, provider)
    }

    pub async fn inspect(&self, name: &str) -> LabResult<ClusterInspection> {
        let descriptor = self.registry.get(name)?;
        let adapter = self.adapters.adapter(descriptor.provider);
        let state = adapter
            .describe_cluster(&descriptor.name, &descriptor.location)
            .await?;
        let phase = ClusterPhase::derive(true, state.as_ref());
        Ok(ClusterInspection {
            descriptor,
            state,
            phase,
        })
    }

    /// Point kubeconfig at a cluster, adopting it if the registry does not
    /// know it yet.
    pub async fn use_cluster(&self, request: UseRequest) -> LabResult<UseOutcome> {
        let generic = LogTarget::Generic;
        self.logged(generic, validate_name(&request.name))?;

        match self.registry.get(&request.name) {
            Ok(descriptor) => {
                if request.provider.is_some_and(|p| p != descriptor.provider) {
                    tracing::warn!(
                        name = %descriptor.name,
                        registered = %descriptor.provider,
                        "ignoring --provider for a registered cluster"
                    );
                }
                let target = LogTarget::Provider(descriptor.provider);
                let adapter = self.adapters.adapter(descriptor.provider);
                let result = adapter
                    .update_kubeconfig(&descriptor.name, &descriptor.location)
                    .await;
                self.logged(target, result)?;
                self.log.info(
                    target,
                    format!("kubeconfig now points at cluster '{}'", descriptor.name),
                );
                Ok(UseOutcome {
                    descriptor,
                    adopted: false,
                })
            }
            Err(LabError::NotManaged { .. }) => self.adopt(request).await,
            Err(err) => self.logged(generic, Err(err)),
        }
    }

    async fn adopt(&self, request: UseRequest) -> LabResult<UseOutcome> {
        let UseRequest {
            name,
            provider,
            location,
        } = request;
        let provider = self.logged(
            LogTarget::Generic,
            provider.ok_or_else(|| {
                LabError::missing(
                    "provider",
                    format!("cluster '{}' is not registered; pass --provider to adopt it", name),
                )
            }),
        )?;
        let target = LogTarget::Provider(provider);

        let result = async {
            location.validate(provider)?;
            let adapter = self.adapters.adapter(provider);
            adapter.update_kubeconfig(&name, &location).await?;

            let credential = self.resolver.credential_path(provider);
            let descriptor =
                ClusterDescriptor::new(name, provider, location, credential, ManagedBy::User);
            self.registry.create(&descriptor)?;
            self.log.info(
                target,
                format!("Adopted user-managed cluster '{}'", descriptor.name),
            );
            Ok::<_, LabError>(UseOutcome {
                descriptor,
                adopted: true,
            })
        }
        .await;

        self.logged(target, result)
    }

    pub async fn destroy(&self, request: DestroyRequest) -> LabResult<DestroyOutcome> {
        let descriptor = match request.target {
            DestroyTarget::Interactive => {
                match self.logged(LogTarget::Generic, self.select_cluster())? {
                    Some(descriptor) => descriptor,
                    None => return Ok(DestroyOutcome::Cancelled),
                }
            }
            DestroyTarget::Named { name, region } => {
                let descriptor = self.logged(LogTarget::Generic, self.registry.get(&name))?;
                self.logged(
                    LogTarget::Provider(descriptor.provider),
                    check_region(&descriptor, region.as_deref()),
                )?;
                descriptor
            }
        };
        let target = LogTarget::Provider(descriptor.provider);

        let prompt = match descriptor.managed_by {
            ManagedBy::Tool => format!(
                "Destroy {} cluster '{}' ({}) and all its resources?",
                descriptor.provider,
                descriptor.name,
                descriptor.location.summary()
            ),
            ManagedBy::User => format!(
                "Forget user-managed cluster '{}'? Its cloud resources are left alone.",
                descriptor.name
            ),
        };
        let confirmed = gate::confirm(self.prompter.as_ref(), request.auto_approve, &prompt);
        if !self.logged(target, confirmed)? {
            self.log
                .info(target, format!("Destroy of cluster '{}' cancelled", descriptor.name));
            return Ok(DestroyOutcome::Cancelled);
        }

        let result = self.teardown(descriptor).await;
        self.logged(target, result)
    }

    fn select_cluster(&self) -> LabResult<Option<ClusterDescriptor>> {
        let clusters = self.registry.find(None, None)?;
        if clusters.is_empty() {
            return Ok(None);
        }
        let items: Vec<String> = clusters
            .iter()
            .map(|d| format!("{} ({}, {})", d.name, d.provider, d.location.summary()))
            .collect();
        let choice = self
            .prompter
            .select("Select the cluster to destroy", &items)?;
        Ok(choice.and_then(|i| clusters.into_iter().nth(i)))
    }

    async fn teardown(&self, descriptor: ClusterDescriptor) -> LabResult<DestroyOutcome> {
        let target = LogTarget::Provider(descriptor.provider);

        if descriptor.managed_by == ManagedBy::User {
            self.registry
                .remove(&descriptor.name)
                .map_err(|e| e.at_step(DestroyStep::RemoveDescriptor))?;
            self.log.info(
                target,
                format!("Removed user-managed cluster '{}' from the registry", descriptor.name),
            );
            return Ok(DestroyOutcome::Forgotten(descriptor));
        }

        let adapter = self.adapters.adapter(descriptor.provider);
        self.transition(&descriptor, ClusterPhase::Ready, ClusterPhase::Destroying);

        self.delete_dependents(adapter.as_ref(), &descriptor)
            .await
            .map_err(|e| e.at_step(DestroyStep::DeleteDependents))?;

        self.delete_cluster_object(adapter.as_ref(), &descriptor)
            .await
            .map_err(|e| e.at_step(DestroyStep::DeleteCluster))?;

        self.log.info(
            target,
            format!("Destroying infrastructure of cluster '{}'", descriptor.name),
        );
        adapter
            .destroy_infrastructure(&descriptor)
            .await
            .map_err(|e| e.at_step(DestroyStep::DestroyInfrastructure))?;

        self.registry
            .remove(&descriptor.name)
            .map_err(|e| e.at_step(DestroyStep::RemoveDescriptor))?;

        self.transition(&descriptor, ClusterPhase::Destroying, ClusterPhase::Absent);
        Ok(DestroyOutcome::Destroyed(descriptor))
    }

    async fn delete_dependents(
        &self,
        adapter: &dyn ProviderAdapter,
        descriptor: &ClusterDescriptor,
    ) -> LabResult<()> {
        let target = LogTarget::Provider(descriptor.provider);
        let kind = descriptor.provider.dependent_kind();
        let (name, location) = (&descriptor.name, &descriptor.location);

        let dependents = adapter.list_dependent_resources(name, location).await?;
        if dependents.is_empty() {
            self.log
                .info(target, format!("Cluster '{}' has no {}", name, kind.plural()));
            return Ok(());
        }

        let names: Vec<&str> = dependents.iter().map(|d| d.name.as_str()).collect();
        self.log.info(
            target,
            format!("Deleting {} {}: {}", dependents.len(), kind.plural(), names.join(", ")),
        );
        if adapter.serial_dependent_deletes() {
            for dependent in &dependents {
                adapter
                    .delete_dependent_resource(name, dependent, location)
                    .await?;
                adapter
                    .wait_for_dependent_gone(name, dependent, location, self.poll)
                    .await?;
                self.log.info(
                    target,
                    format!("{} '{}' of cluster '{}' deleted", kind, dependent.name, name),
                );
            }
        } else {
            try_join_all(
                dependents
                    .iter()
                    .map(|dependent| adapter.delete_dependent_resource(name, dependent, location)),
            )
            .await?;
        }

        adapter
            .wait_for_dependents_cleared(name, location, self.poll)
            .await?;
        self.log
            .info(target, format!("All {} of cluster '{}' deleted", kind.plural(), name));
        Ok(())
    }

    async fn delete_cluster_object(
        &self,
        adapter: &dyn ProviderAdapter,
        descriptor: &ClusterDescriptor,
    ) -> LabResult<()> {
        let target = LogTarget::Provider(descriptor.provider);
        let (name, location) = (&descriptor.name, &descriptor.location);

        if adapter.describe_cluster(name, location).await?.is_none() {
            self.log.info(
                target,
                format!("Cluster '{}' already deleted, skipping", name),
            );
            return Ok(());
        }

        self.log.info(target, format!("Deleting cluster '{}'", name));
        adapter.delete_cluster(name, location).await?;
        adapter.wait_for_cluster_gone(name, location, self.poll).await?;
        self.log.info(target, format!("Cluster '{}' deleted", name));
        Ok(())
    }

    fn transition(&self, descriptor: &ClusterDescriptor, from: ClusterPhase, to: ClusterPhase) {
        self.log.info(
            LogTarget::Provider(descriptor.provider),
            format!("Cluster '{}': {} -> {}", descriptor.name, from, to),
        );
    }

    fn logged<T>(&self, target: LogTarget, result: LabResult<T>) -> LabResult<T> {
        if let Err(err) = &result {
            self.log.error(target, err.detail());
        }
        result
    }
}

async fn ensure_tooling(adapter: &dyn ProviderAdapter) -> LabResult<()> {
    let provider = adapter.provider();
    if !adapter.check_cli_available().await {
        return Err(LabError::ToolUnavailable {
            tool: provider.cli().to_string(),
            reason: format!("`{}` is not installed or not on PATH", provider.cli()),
        });
    }
    if !adapter.check_authenticated().await {
        return Err(LabError::ToolUnavailable {
            tool: provider.cli().to_string(),
            reason: format!("not authenticated; run `{}`", provider.login_command()),
        });
    }
    Ok(())
}

/// The caller's region must match the stored one before anything is deleted.
fn check_region(descriptor: &ClusterDescriptor, given: Option<&str>) -> LabResult<()> {
    let given = given.map(str::trim).filter(|r| !r.is_empty());
    let mismatch = |expected: &str, actual: &str| LabError::LocationMismatch {
        name: descriptor.name.clone(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    };

    match (descriptor.region(), given) {
        (Some(stored), Some(given)) if stored == given => Ok(()),
        (Some(stored), Some(given)) => Err(mismatch(stored, given)),
        (Some(stored), None) if descriptor.provider.requires_region() => Err(LabError::missing(
            "region",
            format!("cluster '{}' lives in {}; pass --region {}", descriptor.name, stored, stored),
        )),
        (Some(_), None) => Ok(()),
        (None, Some(given)) => Err(mismatch("no region", given)),
        (None, None) => Ok(()),
    }
}
