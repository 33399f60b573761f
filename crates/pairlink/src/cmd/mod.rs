use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use pairlink_peer::ManagerConfig;
use pairlink_transport::{PeerDirectory, SharedIdentifier};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod peers;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and print received lines.
    Serve(ServeArgs),
    /// Connect to the peer advertising an identifier and send lines.
    Send(SendArgs),
    /// List peers found under a directory root.
    Peers(PeersArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Peers(args) => peers::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where to find peers and which identifier to speak.
#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Shared directory root holding one sub-directory per peer.
    pub root: PathBuf,
    /// Identifier both peers agree on.
    #[arg(long, short = 'i', env = "PAIRLINK_IDENTIFIER")]
    pub identifier: SharedIdentifier,
    /// Write timeout for the channel (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub write_timeout: Option<String>,
}

impl EndpointArgs {
    pub fn manager_config(&self) -> CliResult<ManagerConfig> {
        let write_timeout = self
            .write_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()?;
        Ok(ManagerConfig::default().with_write_timeout(write_timeout))
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Name this server publishes under.
    #[arg(long, default_value = "server")]
    pub name: String,
    /// Send every received line back to the client.
    #[arg(long)]
    pub echo: bool,
    /// Exit after receiving N lines.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Name of this client; its own entry is never a candidate.
    #[arg(long, default_value = "client")]
    pub name: String,
    /// Text to send, one message per line.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read lines to send from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Maximum time to wait for the channel to open.
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set.
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct PeersArgs {
    /// Shared directory root holding one sub-directory per peer.
    pub root: PathBuf,
    /// Only show peers advertising this identifier.
    #[arg(long, short = 'i')]
    pub identifier: Option<SharedIdentifier>,
    /// Skip the peer with this name.
    #[arg(long)]
    pub exclude: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(unix)]
pub fn open_directory(root: &std::path::Path, name: &str) -> CliResult<Arc<dyn PeerDirectory>> {
    Ok(Arc::new(pairlink_transport::SocketDirectory::new(root, name)))
}

#[cfg(not(unix))]
pub fn open_directory(_root: &std::path::Path, _name: &str) -> CliResult<Arc<dyn PeerDirectory>> {
    Err(CliError::new(
        USAGE,
        "no peer directory is available on this platform",
    ))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
