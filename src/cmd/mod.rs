//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                  |
//! |-----------|---------------------------------------------------|
//! | `init`    | `Init`                                            |
//! | `cluster` | `Create`, `List`, `Use`, `Destroy` (`cluster`)    |
//! | `product` | `Add`, `Delete` (`product`)                       |
//! | `config`  | `Config`                                          |

pub mod cluster;
pub mod config;
pub mod init;
pub mod product;

pub use cluster::{cmd_create, cmd_destroy, cmd_list, cmd_use};
pub use config::cmd_config;
pub use init::cmd_init;
pub use product::{cmd_add_product, cmd_delete_product};

use std::sync::Arc;

use kubelab::config::LabContext;
use kubelab::orchestrator::{Orchestrator, ProductManager, TerminalPrompter};
use kubelab::provider::CloudAdapters;

/// An orchestrator wired to the real provider CLIs and the terminal.
fn orchestrator(ctx: &LabContext) -> Orchestrator {
    Orchestrator::new(
        ctx,
        Arc::new(CloudAdapters::from_context(ctx)),
        Arc::new(TerminalPrompter),
    )
}

/// A product manager sharing one process runner with the provider CLIs.
fn product_manager(ctx: &LabContext) -> ProductManager {
    let adapters = CloudAdapters::from_context(ctx);
    let runner = adapters.runner();
    ProductManager::new(ctx, Arc::new(adapters), runner)
}
