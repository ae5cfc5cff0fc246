mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use castlink::{PluginConfig, SettingsStore};
use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "castlink", version, about = "Cast device socket client")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). Defaults to debug when the debug_logging
    /// setting is on, info otherwise.
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    /// Settings file.
    #[arg(long, value_name = "FILE", env = "CASTLINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    };

    let level = cli.log_level.unwrap_or(if config.debug_logging() {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });
    init_logging(cli.log_format, level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, &config, format).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> exit::CliResult<PluginConfig> {
    let store = match path.map(PathBuf::from).or_else(default_config_path) {
        Some(path) => SettingsStore::load(path),
        None => Ok(SettingsStore::in_memory()),
    }
    .map_err(|err| exit::config_error("failed loading settings", err))?;
    PluginConfig::load(store).map_err(|err| exit::config_error("failed loading settings", err))
}

fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("castlink").join("settings.json"))
}
