//! Cluster lifecycle commands - `kubelab create|list|use|destroy cluster`.

use anyhow::Result;
use console::style;
use futures::future::join_all;

use kubelab::config::LabContext;
use kubelab::errors::LabError;
use kubelab::orchestrator::{
    CreateRequest, DestroyOutcome, DestroyRequest, DestroyTarget, UseRequest,
};
use kubelab::provider::Provider;
use kubelab::runner::LogTarget;
use kubelab::ui::icons::{CHECK, CLOUD, LINK, TRASH, WARN};
use kubelab::ui::{ClusterRow, Spinner, cluster_table};

pub async fn cmd_create(ctx: &LabContext, request: CreateRequest) -> Result<()> {
    ctx.ensure_directories()?;
    let orchestrator = super::orchestrator(ctx);
    let log_path = ctx.action_log().path(LogTarget::Provider(request.provider));

    let spinner = request.wait.then(|| {
        Spinner::start(format!(
            "Creating {} cluster '{}'",
            request.provider, request.name
        ))
    });
    let outcome = orchestrator.create(request).await;
    drop(spinner);
    let outcome = outcome?;

    let descriptor = &outcome.descriptor;
    println!();
    if outcome.report.completed {
        println!(
            "{}Cluster '{}' is ready ({}, {})",
            CHECK,
            style(&descriptor.name).bold(),
            descriptor.provider,
            descriptor.location.summary()
        );
        if !outcome.report.outputs.is_empty() {
            println!();
            println!("Outputs:");
            for (key, value) in &outcome.report.outputs {
                match value {
                    serde_json::Value::String(s) => println!("  {} = {}", key, s),
                    other => println!("  {} = {}", key, other),
                }
            }
        }
        println!();
        println!(
            "Run 'kubelab use cluster --name {}' to point kubectl at it.",
            descriptor.name
        );
    } else {
        println!(
            "{}Cluster '{}' is being provisioned in the background ({}, {})",
            CLOUD,
            style(&descriptor.name).bold(),
            descriptor.provider,
            descriptor.location.summary()
        );
        println!("Follow progress in {}", log_path.display());
    }
    println!();
    Ok(())
}

pub async fn cmd_list(
    ctx: &LabContext,
    name_pattern: Option<&str>,
    provider: Option<Provider>,
    live: bool,
) -> Result<()> {
    let orchestrator = super::orchestrator(ctx);
    let clusters = orchestrator.list(name_pattern, provider)?;

    if clusters.is_empty() {
        println!("No clusters registered.");
        return Ok(());
    }

    let rows: Vec<ClusterRow> = if live {
        let _spinner = Spinner::start("Querying providers");
        let inspections =
            join_all(clusters.iter().map(|d| orchestrator.inspect(&d.name))).await;
        clusters
            .iter()
            .zip(inspections)
            .map(|(descriptor, inspection)| match inspection {
                Ok(inspection) => ClusterRow::from(&inspection),
                Err(err) => {
                    tracing::warn!(name = %descriptor.name, error = %err, "live status unavailable");
                    ClusterRow {
                        status: Some("unknown".to_string()),
                        ..ClusterRow::from(descriptor)
                    }
                }
            })
            .collect()
    } else {
        clusters.iter().map(ClusterRow::from).collect()
    };

    print!("{}", cluster_table(&rows));
    Ok(())
}

pub async fn cmd_use(ctx: &LabContext, request: UseRequest) -> Result<()> {
    ctx.ensure_directories()?;
    let orchestrator = super::orchestrator(ctx);
    let outcome = orchestrator.use_cluster(request).await?;

    if outcome.adopted {
        println!(
            "{}Registered '{}' as a user-managed cluster. 'destroy' will only forget it.",
            CHECK, outcome.descriptor.name
        );
    }
    println!(
        "{}kubectl now points at '{}' ({}, {})",
        LINK,
        style(&outcome.descriptor.name).bold(),
        outcome.descriptor.provider,
        outcome.descriptor.location.summary()
    );
    Ok(())
}

pub async fn cmd_destroy(ctx: &LabContext, target: DestroyTarget) -> Result<()> {
    let orchestrator = super::orchestrator(ctx);

    if target == DestroyTarget::Interactive && orchestrator.list(None, None)?.is_empty() {
        println!("No clusters registered; nothing to destroy.");
        return Ok(());
    }

    let name = match &target {
        DestroyTarget::Named { name, .. } => Some(name.clone()),
        DestroyTarget::Interactive => None,
    };
    // Only spin when no confirmation prompt will be drawn.
    let spinner = match (&name, ctx.auto_approve) {
        (Some(name), true) => Some(Spinner::start(format!("Destroying cluster '{}'", name))),
        _ => None,
    };

    let request = DestroyRequest {
        target,
        auto_approve: ctx.auto_approve,
    };
    let outcome = orchestrator.destroy(request).await;
    drop(spinner);

    match outcome {
        Ok(DestroyOutcome::Destroyed(descriptor)) => {
            println!(
                "{}Cluster '{}' destroyed and removed from the registry",
                TRASH,
                style(&descriptor.name).bold()
            );
        }
        Ok(DestroyOutcome::Forgotten(descriptor)) => {
            println!(
                "{}Forgot user-managed cluster '{}'; its cloud resources were left in place",
                CHECK, descriptor.name
            );
        }
        Ok(DestroyOutcome::Cancelled) => {
            println!("Destroy cancelled.");
        }
        Err(LabError::NotManaged { name }) => {
            println!(
                "{}Cluster '{}' is not managed by kubelab; nothing to destroy.",
                WARN, name
            );
        }
        Err(err @ LabError::DestroyStepFailed { .. }) => {
            let hint = name
                .map(|n| format!("kubelab destroy cluster --name {}", n))
                .unwrap_or_else(|| "kubelab destroy cluster -i".to_string());
            return Err(anyhow::Error::new(err).context(format!(
                "Teardown stopped; the cluster is still registered. Fix the cause and re-run '{}'",
                hint
            )));
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
