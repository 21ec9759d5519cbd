//! One-shot commands
//!
//! Each command opens the staging database with the same wiring as the
//! server, runs once and exits.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::cli::{Commands, ConfigCommands};
use crate::config::{StaticConfig, get_config};
use crate::runtime::lifetime::startup::prepare_context;

/// Run a non-server command
pub async fn run_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Serve => super::server::run_server().await,
        Commands::Transfer => transfer_now().await,
        Commands::Sync => sync_customer().await,
        Commands::Status => status().await,
        Commands::Config {
            action: ConfigCommands::Generate { output_path, force },
        } => config_generate(output_path, force),
    }
}

async fn transfer_now() -> Result<()> {
    let context = prepare_context().await?;
    let report = context.transfer.run_once().await?;

    if report.is_complete() {
        println!(
            "{} {} rows forwarded",
            "Transfer completed:".green(),
            report.succeeded
        );
    } else {
        println!(
            "{} {} succeeded, {} failed, rows kept for the next run",
            "Transfer incomplete:".yellow(),
            report.succeeded,
            report.failed
        );
    }
    Ok(())
}

async fn sync_customer() -> Result<()> {
    let context = prepare_context().await?;
    let config = get_config();
    let customer_name = context.transfer.customer_name().to_string();

    if context.customer.activation_sync(&config, &customer_name).await {
        println!("{} {}", "Customer details sent for".green(), customer_name.blue());
        Ok(())
    } else {
        anyhow::bail!("Customer sync for {} failed, see the log", customer_name)
    }
}

async fn status() -> Result<()> {
    let context = prepare_context().await?;
    let pending = context.store.count().await?;
    println!("{} {}", "Staged rows:".cyan(), pending);
    Ok(())
}

/// Generate example configuration file
fn config_generate(output_path: Option<String>, force: bool) -> Result<()> {
    let path = output_path.unwrap_or_else(|| "config.example.toml".to_string());

    // 非 --force 模式下交互确认
    if !force && Path::new(&path).exists() {
        print!(
            "{} {} {}",
            "File already exists:".yellow(),
            path.blue(),
            "Overwrite? [y/N] ".yellow()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", "Aborted.".red());
            return Ok(());
        }
    }

    StaticConfig::default()
        .save_to_file(&path)
        .map_err(|e| anyhow::anyhow!("Unable to write configuration file: {}", e))?;

    println!(
        "  {} {}",
        "Configuration file generated successfully".green(),
        path.blue()
    );
    Ok(())
}
