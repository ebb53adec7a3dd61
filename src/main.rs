use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kubelab::catalog::{InstallMethod, Product, ProductSpec};
use kubelab::config::{HOME_ENV, LabContext};
use kubelab::orchestrator::{CreateRequest, DestroyTarget, ProductRequest, UseRequest};
use kubelab::provider::{Location, Provider};

mod cmd;

#[derive(Parser)]
#[command(name = "kubelab")]
#[command(version, about = "Provision, track and tear down managed Kubernetes clusters")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    /// kubelab home directory (default: ~/.kubelab)
    #[arg(long, global = true, env = HOME_ENV)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check provider CLIs, capture credentials and prepare Terraform modules
    Init {
        /// Providers to initialize (default: all)
        providers: Vec<Provider>,
    },
    /// Provision a new resource
    Create {
        #[command(subcommand)]
        resource: CreateResource,
    },
    /// List registered resources
    List {
        #[command(subcommand)]
        resource: ListResource,
    },
    /// Point kubectl at a cluster, registering it if needed
    Use {
        #[command(subcommand)]
        resource: UseResource,
    },
    /// Tear down a resource and remove it from the registry
    Destroy {
        #[command(subcommand)]
        resource: DestroyResource,
    },
    /// Install an add-on product on a registered cluster
    Add {
        #[command(subcommand)]
        resource: AddResource,
    },
    /// Remove an add-on product from a registered cluster
    Delete {
        #[command(subcommand)]
        resource: DeleteResource,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum CreateResource {
    /// Create a managed Kubernetes cluster
    Cluster(CreateClusterArgs),
}

#[derive(Subcommand)]
pub enum ListResource {
    /// List registered clusters
    Cluster(ListClusterArgs),
}

#[derive(Subcommand)]
pub enum UseResource {
    /// Update kubeconfig for a cluster
    Cluster(UseClusterArgs),
}

#[derive(Subcommand)]
pub enum DestroyResource {
    /// Destroy a cluster and its dependent resources
    Cluster(DestroyClusterArgs),
}

#[derive(Subcommand)]
pub enum AddResource {
    /// Deploy a product (nginx) with kubectl or its operator
    Product(ProductArgs),
}

#[derive(Subcommand)]
pub enum DeleteResource {
    /// Undeploy a product and drop it from the cluster record
    Product(ProductArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct LocationArgs {
    /// Cloud region (AWS, GCP; optional for Azure)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Azure resource group
    #[arg(short = 'g', long)]
    pub resource_group: Option<String>,

    /// GCP project id
    #[arg(long)]
    pub project: Option<String>,
}

impl LocationArgs {
    fn location(&self) -> Location {
        Location::new(
            self.region.clone(),
            self.resource_group.clone(),
            self.project.clone(),
        )
    }
}

#[derive(Args)]
pub struct CreateClusterArgs {
    /// Cluster name
    #[arg(short, long)]
    pub name: String,

    /// Cloud provider: aws, azure or gcp
    #[arg(short, long)]
    pub provider: Provider,

    #[command(flatten)]
    pub location: LocationArgs,

    /// Wait for provisioning to finish instead of running it in background
    #[arg(long)]
    pub wait: bool,
}

#[derive(Args)]
pub struct ListClusterArgs {
    /// Only clusters of this provider
    #[arg(short, long)]
    pub provider: Option<Provider>,

    /// Glob on cluster names, e.g. 'dev-*'
    #[arg(short = 'n', long)]
    pub name_pattern: Option<String>,

    /// Query each provider for the live cluster status
    #[arg(long)]
    pub live: bool,
}

#[derive(Args)]
pub struct UseClusterArgs {
    /// Cluster name
    #[arg(short, long)]
    pub name: String,

    /// Provider, required for clusters kubelab does not know yet
    #[arg(short, long)]
    pub provider: Option<Provider>,

    #[command(flatten)]
    pub location: LocationArgs,
}

#[derive(Args)]
pub struct DestroyClusterArgs {
    /// Cluster name
    #[arg(
        short,
        long,
        required_unless_present = "interactive",
        conflicts_with = "interactive"
    )]
    pub name: Option<String>,

    /// Region the cluster was created in; must match the registry
    #[arg(short, long)]
    pub region: Option<String>,

    /// Pick the cluster from a list
    #[arg(short, long)]
    pub interactive: bool,
}

impl DestroyClusterArgs {
    fn target(self) -> DestroyTarget {
        match self.name {
            Some(name) if !self.interactive => DestroyTarget::Named {
                name,
                region: self.region,
            },
            _ => DestroyTarget::Interactive,
        }
    }
}

#[derive(Args)]
pub struct ProductArgs {
    /// Product to manage (nginx)
    pub product: Product,

    /// Registered cluster name
    #[arg(short, long)]
    pub cluster: String,

    /// How to deploy: deployment or operator
    #[arg(short = 't', long = "type", value_name = "TYPE", default_value = "deployment")]
    pub method: InstallMethod,

    /// Image tag for deployments, operator release for operators
    #[arg(long)]
    pub version: Option<String>,
}

impl ProductArgs {
    fn request(self) -> ProductRequest {
        let spec = ProductSpec::new(self.product, self.method);
        ProductRequest {
            cluster: self.cluster,
            spec: match self.version {
                Some(version) => spec.with_version(version),
                None => spec,
            },
        }
    }
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the configuration file and effective values
    Show,
    /// Check the configuration for problems
    Validate,
    /// Write a default kubelab.toml
    Init,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "kubelab=debug" } else { "kubelab=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            kubelab::ui::print_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = LabContext::new(cli.home, cli.yes, cli.verbose)?;

    match cli.command {
        Commands::Init { providers } => cmd::cmd_init(&ctx, &providers).await?,
        Commands::Create {
            resource: CreateResource::Cluster(args),
        } => {
            let request = CreateRequest {
                location: args.location.location(),
                name: args.name,
                provider: args.provider,
                wait: args.wait,
            };
            cmd::cmd_create(&ctx, request).await?;
        }
        Commands::List {
            resource: ListResource::Cluster(args),
        } => {
            cmd::cmd_list(&ctx, args.name_pattern.as_deref(), args.provider, args.live).await?
        }
        Commands::Use {
            resource: UseResource::Cluster(args),
        } => {
            let request = UseRequest {
                location: args.location.location(),
                name: args.name,
                provider: args.provider,
            };
            cmd::cmd_use(&ctx, request).await?;
        }
        Commands::Destroy {
            resource: DestroyResource::Cluster(args),
        } => cmd::cmd_destroy(&ctx, args.target()).await?,
        Commands::Add {
            resource: AddResource::Product(args),
        } => cmd::cmd_add_product(&ctx, args.request()).await?,
        Commands::Delete {
            resource: DeleteResource::Product(args),
        } => cmd::cmd_delete_product(&ctx, args.request()).await?,
        Commands::Config { command } => cmd::cmd_config(&ctx, command)?,
    }

    Ok(())
}
