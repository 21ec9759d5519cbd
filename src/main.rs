use clap::Parser;
use colored::Colorize;

use visitor_relay::cli::{Cli, Commands};
use visitor_relay::config::{get_config, init_config};
use visitor_relay::runtime::modes::{run_command, run_server};
use visitor_relay::system::logging::init_logging;

#[actix_web::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // config 子命令不需要加载配置与日志
    let _log_guard = if matches!(cli.command, Some(Commands::Config { .. })) {
        None
    } else {
        init_config(&cli.config);
        Some(init_logging(&get_config()))
    };

    let result = match cli.command {
        None | Some(Commands::Serve) => run_server().await,
        Some(cmd) => run_command(cmd).await,
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
