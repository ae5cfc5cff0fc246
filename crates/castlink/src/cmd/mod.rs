use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use castlink::socket::SocketConfig;
use castlink::transport::{TcpConnector, DEFAULT_CAST_PORT};
use castlink::{PluginConfig, SocketService};
use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod devices;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single framed payload.
    Send(SendArgs),
    /// Connect and print received frames.
    Listen(ListenArgs),
    /// Manage configured devices.
    #[command(subcommand)]
    Devices(DevicesCommand),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, config: &PluginConfig, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, config, format).await,
        Command::Listen(args) => listen::run(args, config, format).await,
        Command::Devices(command) => devices::run(command, config, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Configured device id, or a host name or IP address.
    pub target: String,
    /// Device socket port.
    #[arg(long, default_value_t = DEFAULT_CAST_PORT)]
    pub port: u16,
    /// Give up connecting after this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// UTF-8 string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Wait for one frame from the device and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a frame when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Send a keep-alive frame on this interval (e.g. 5s).
    #[arg(long)]
    pub heartbeat_interval: Option<String>,
    /// Keep-alive payload.
    #[arg(long, default_value = "ping")]
    pub heartbeat_data: String,
    /// Payload to send as soon as the session opens (repeatable).
    #[arg(long)]
    pub handshake_data: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum DevicesCommand {
    /// List configured devices.
    List,
    /// Add or replace a device.
    Add(AddDeviceArgs),
    /// Remove a device.
    Remove(RemoveDeviceArgs),
}

#[derive(Args, Debug)]
pub struct AddDeviceArgs {
    /// Device id.
    pub id: String,
    /// Display name.
    #[arg(long)]
    pub name: Option<String>,
    /// Device IP address.
    #[arg(long)]
    pub ip: Option<IpAddr>,
    /// Last known volume.
    #[arg(long)]
    pub volume: Option<u16>,
}

#[derive(Args, Debug)]
pub struct RemoveDeviceArgs {
    /// Device id.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

impl ConnectArgs {
    /// Host to dial: the address of a configured device, or the target itself.
    pub fn resolve_host(&self, config: &PluginConfig) -> CliResult<String> {
        match config.device(&self.target) {
            Some(device) => device.address.map(|ip| ip.to_string()).ok_or_else(|| {
                CliError::new(
                    USAGE,
                    format!("device '{}' has no IP address configured", self.target),
                )
            }),
            None => Ok(self.target.clone()),
        }
    }

    /// A TCP socket service honoring `--connect-timeout`.
    pub fn service(&self) -> CliResult<SocketService> {
        let timeout = parse_duration(&self.connect_timeout)?;
        Ok(SocketService::with_connector(
            TcpConnector::default(),
            SocketConfig::default().with_connect_timeout(timeout),
        ))
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
