//! Configuration view and validation commands - `kubelab config`.

use anyhow::{Context, Result};

use kubelab::config::LabContext;
use kubelab::lab_config::{LabToml, POLL_INTERVAL_ENV, TERRAFORM_ENV};
use kubelab::ui::icons::{CHECK, WARN};

use super::super::ConfigCommands;

pub fn cmd_config(ctx: &LabContext, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(ctx),
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !ctx.config_file.exists() {
                println!("No kubelab.toml found. Using defaults.");
            }

            let warnings = ctx.settings.validate(&ctx.home);
            if warnings.is_empty() {
                println!("{}Configuration is valid.", CHECK);
            } else {
                println!("{}Configuration warnings:", WARN);
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
            Ok(())
        }
        Some(ConfigCommands::Init) => {
            if ctx.config_file.exists() {
                println!("kubelab.toml already exists at {}", ctx.config_file.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&ctx.home)
                .with_context(|| format!("Failed to create {}", ctx.home.display()))?;
            LabToml::default().save(&ctx.config_file)?;

            println!("Created kubelab.toml at {}", ctx.config_file.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] poll_interval_secs, convergence_timeout_secs, auto_approve");
            println!("  - [terraform] binary, providers_dir");
            println!();
            Ok(())
        }
    }
}

fn show(ctx: &LabContext) -> Result<()> {
    let settings = &ctx.settings;

    println!();
    println!("kubelab Configuration");
    println!("=====================");
    println!();

    if ctx.config_file.exists() {
        println!("Config file: {}", ctx.config_file.display());
    } else {
        println!("No kubelab.toml found at {}", ctx.config_file.display());
        println!("Using default configuration.");
    }
    println!();

    println!("[defaults]");
    println!("  poll_interval_secs = {}", settings.defaults.poll_interval_secs);
    println!(
        "  convergence_timeout_secs = {}",
        settings.defaults.convergence_timeout_secs
    );
    println!("  auto_approve = {}", settings.defaults.auto_approve);
    println!();

    println!("[terraform]");
    if let Some(binary) = &settings.terraform.binary {
        println!("  binary = \"{}\"", binary);
    }
    if let Some(dir) = &settings.terraform.providers_dir {
        println!("  providers_dir = \"{}\"", dir.display());
    }
    println!();

    // Show effective values (including env overrides)
    println!("Effective values (with env/CLI overrides):");
    println!("  home = \"{}\"", ctx.home.display());
    println!("  terraform = \"{}\"", settings.terraform_binary());
    println!("  providers_dir = \"{}\"", ctx.providers_dir().display());
    println!("  poll_interval = {}s", ctx.poll.interval.as_secs());
    println!("  convergence_timeout = {}s", ctx.poll.timeout.as_secs());
    println!("  auto_approve = {}", ctx.auto_approve);
    println!();
    println!("Environment overrides: {}, {}", TERRAFORM_ENV, POLL_INTERVAL_ENV);

    if !ctx.config_file.exists() {
        println!();
        println!("Run 'kubelab config init' to create a kubelab.toml file.");
    }
    println!();
    Ok(())
}
