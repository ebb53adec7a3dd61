//! Product commands - `kubelab add|delete product`.

use anyhow::Result;
use console::style;

use kubelab::config::LabContext;
use kubelab::orchestrator::ProductRequest;
use kubelab::ui::Spinner;
use kubelab::ui::icons::{CHECK, TRASH};

pub async fn cmd_add_product(ctx: &LabContext, request: ProductRequest) -> Result<()> {
    ctx.ensure_directories()?;
    let manager = super::product_manager(ctx);
    let product = request.spec.product;

    let spinner = Spinner::start(format!(
        "Installing {} on cluster '{}'",
        product, request.cluster
    ));
    let outcome = manager.add(request).await;
    drop(spinner);
    let descriptor = outcome?;

    println!(
        "{}Installed {} on '{}'. Products: {}",
        CHECK,
        style(product).bold(),
        descriptor.name,
        descriptor.products.join(", ")
    );
    Ok(())
}

pub async fn cmd_delete_product(ctx: &LabContext, request: ProductRequest) -> Result<()> {
    ctx.ensure_directories()?;
    let manager = super::product_manager(ctx);
    let product = request.spec.product;

    let spinner = Spinner::start(format!(
        "Removing {} from cluster '{}'",
        product, request.cluster
    ));
    let outcome = manager.delete(request).await;
    drop(spinner);
    let descriptor = outcome?;

    println!(
        "{}Removed {} from '{}'",
        TRASH,
        style(product).bold(),
        descriptor.name
    );
    Ok(())
}
