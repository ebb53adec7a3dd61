//! Add-on product installation on registered clusters.
//!
//! Before any command runs the cluster must be registered and the product's
//! recorded state must allow the change. kubeconfig is then pointed at the
//! cluster, the catalog commands run in order, and only after all of them
//! succeed is the descriptor's product list rewritten.

use std::sync::Arc;

use super::ProductRequest;
use crate::action_log::ActionLog;
use crate::catalog::{Catalog, ProductSpec};
use crate::config::LabContext;
use crate::errors::{LabError, LabResult};
use crate::provider::AdapterSource;
use crate::registry::{ClusterDescriptor, ClusterRegistry};
use crate::runner::{CommandRunner, ExternalCommand, LogTarget};

pub struct ProductManager {
    registry: ClusterRegistry,
    catalog: Catalog,
    adapters: Arc<dyn AdapterSource>,
    runner: Arc<dyn CommandRunner>,
    log: ActionLog,
}

impl ProductManager {
    pub fn new(
        ctx: &LabContext,
        adapters: Arc<dyn AdapterSource>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            registry: ctx.registry(),
            catalog: ctx.catalog(),
            adapters,
            runner,
            log: ctx.action_log(),
        }
    }

    /// Install a product and record it on the cluster's descriptor.
    pub async fn add(&self, request: ProductRequest) -> LabResult<ClusterDescriptor> {
        let descriptor = self.logged(LogTarget::Generic, self.registry.get(&request.cluster))?;
        let target = LogTarget::Provider(descriptor.provider);
        let product = request.spec.product.as_str();

        if descriptor.products.iter().any(|p| p == product) {
            return self.logged(
                target,
                Err(LabError::ProductInstalled {
                    product: product.to_string(),
                    cluster: descriptor.name.clone(),
                }),
            );
        }

        let result = async {
            self.catalog.prepare(&request.spec)?;
            self.select(&descriptor).await?;
            self.log.info(
                target,
                format!("Installing {} on cluster '{}'", describe(&request.spec), descriptor.name),
            );
            self.run_all(&self.catalog.install_commands(&request.spec), target)
                .await?;
            self.registry
                .update(&descriptor.name, |d| d.products.push(product.to_string()))
        }
        .await;

        let updated = self.logged(target, result)?;
        self.log.info(
            target,
            format!("Product '{}' installed on cluster '{}'", product, updated.name),
        );
        Ok(updated)
    }

    /// Remove a product and drop it from the cluster's descriptor.
    pub async fn delete(&self, request: ProductRequest) -> LabResult<ClusterDescriptor> {
        let descriptor = self.logged(LogTarget::Generic, self.registry.get(&request.cluster))?;
        let target = LogTarget::Provider(descriptor.provider);
        let product = request.spec.product.as_str();

        if !descriptor.products.iter().any(|p| p == product) {
            return self.logged(
                target,
                Err(LabError::ProductNotInstalled {
                    product: product.to_string(),
                    cluster: descriptor.name.clone(),
                }),
            );
        }

        let result = async {
            self.catalog.prepare(&request.spec)?;
            self.select(&descriptor).await?;
            self.log.info(
                target,
                format!("Removing {} from cluster '{}'", describe(&request.spec), descriptor.name),
            );
            self.run_all(&self.catalog.uninstall_commands(&request.spec), target)
                .await?;
            self.registry
                .update(&descriptor.name, |d| d.products.retain(|p| p != product))
        }
        .await;

        let updated = self.logged(target, result)?;
        self.log.info(
            target,
            format!("Product '{}' removed from cluster '{}'", product, updated.name),
        );
        Ok(updated)
    }

    // kubectl acts on the current context, so switch it to this cluster.
    async fn select(&self, descriptor: &ClusterDescriptor) -> LabResult<()> {
        self.adapters
            .adapter(descriptor.provider)
            .update_kubeconfig(&descriptor.name, &descriptor.location)
            .await
    }

    async fn run_all(&self, commands: &[ExternalCommand], target: LogTarget) -> LabResult<()> {
        for command in commands {
            self.runner
                .run(command, target, true)
                .await?
                .into_result(command)?;
        }
        Ok(())
    }

    fn logged<T>(&self, target: LogTarget, result: LabResult<T>) -> LabResult<T> {
        if let Err(err) = &result {
            self.log.error(target, err.detail());
        }
        result
    }
}

fn describe(spec: &ProductSpec) -> String {
    format!("{} {} ({})", spec.product, spec.version(), spec.method)
}
