//! Provider bootstrap - `kubelab init`.

use anyhow::{Context, Result, bail};
use console::style;

use kubelab::config::LabContext;
use kubelab::provider::Provider;
use kubelab::ui::icons::{CHECK, CROSS, SPARKLE};

/// Initialize the given providers, or all of them when none are named.
///
/// Every provider is attempted even after one fails, so a single run
/// reports the full picture.
pub async fn cmd_init(ctx: &LabContext, providers: &[Provider]) -> Result<()> {
    ctx.ensure_directories()
        .with_context(|| format!("Failed to prepare {}", ctx.home.display()))?;

    let providers: Vec<Provider> = if providers.is_empty() {
        Provider::ALL.to_vec()
    } else {
        providers.to_vec()
    };

    let orchestrator = super::orchestrator(ctx);
    let mut failed = Vec::new();

    println!();
    for provider in &providers {
        match orchestrator.init_provider(*provider).await {
            Ok(credential) => {
                println!(
                    "{}{} ready (credentials: {})",
                    CHECK,
                    style(provider).bold(),
                    credential.path.display()
                );
            }
            Err(err) => {
                println!("{}{}: {}", CROSS, style(provider).bold(), err);
                failed.push(*provider);
            }
        }
    }
    println!();

    if !failed.is_empty() {
        let names: Vec<String> = failed.iter().map(|p| p.to_string()).collect();
        bail!(
            "Initialization failed for {}. See the action logs under {}",
            names.join(", "),
            ctx.logs_dir.display()
        );
    }

    println!("{}kubelab home ready at {}", SPARKLE, ctx.home.display());
    Ok(())
}
