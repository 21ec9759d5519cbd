//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

/// visitor-relay - anonymous visitor identification relay
#[derive(Parser)]
#[command(name = "visitor-relay")]
#[command(version)]
#[command(about = "Stages visitor page activity and forwards it to the remote analytics service", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML); missing file means defaults + env
    #[arg(long, short = 'c', global = true, default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Forward every staged row to the remote service once
    Transfer,

    /// Send the customer registration details once
    Sync,

    /// Show how many rows are waiting for transfer
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Configuration management commands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: config.example.toml)
        output_path: Option<String>,

        /// Force overwrite without confirmation
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::parse_from(["visitor-relay"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, "config.toml");
    }

    #[test]
    fn test_config_generate_args() {
        let cli = Cli::parse_from([
            "visitor-relay",
            "-c",
            "custom.toml",
            "config",
            "generate",
            "out.toml",
            "--force",
        ]);
        assert_eq!(cli.config, "custom.toml");
        match cli.command {
            Some(Commands::Config {
                action: ConfigCommands::Generate { output_path, force },
            }) => {
                assert_eq!(output_path.as_deref(), Some("out.toml"));
                assert!(force);
            }
            _ => panic!("expected config generate"),
        }
    }
}
