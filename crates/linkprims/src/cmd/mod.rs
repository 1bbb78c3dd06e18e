use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod udp_send;
pub mod udp_serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send frames over an acknowledged TCP stream.
    Send(SendArgs),
    /// Accept acknowledged TCP streams and print received frames.
    Listen(ListenArgs),
    /// Serve sequenced UDP datagrams and print accepted payloads.
    UdpServe(UdpServeArgs),
    /// Sync with a sequenced UDP server and send one datagram.
    UdpSend(UdpSendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::UdpServe(args) => udp_serve::run(args, format),
        Command::UdpSend(args) => udp_send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// Raw string payload. Each line is sent as its own frame over TCP.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to (host:port).
    pub addr: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// How long to wait for each ack (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub ack_timeout: String,
    /// How long the connection may take to establish.
    #[arg(long, default_value = "250ms")]
    pub connect_timeout: String,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set.
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Print send/receive counters before exiting.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (host:port).
    pub addr: String,
    /// Send each received frame back to the peer.
    #[arg(long)]
    pub echo: bool,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print each connection's counters when it ends.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct UdpServeArgs {
    /// Address to bind (host:port).
    pub addr: String,
    /// Reply to each accepted datagram with its own payload.
    #[arg(long)]
    pub echo: bool,
    /// Exit after accepting N datagrams.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print counters before exiting.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct UdpSendArgs {
    /// Server address (host:port).
    pub addr: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Local address to bind. Default: any address of the server's family.
    #[arg(long)]
    pub bind: Option<String>,
    /// How long to wait for the sync echo.
    #[arg(long, default_value = "1s")]
    pub sync_timeout: String,
    /// Wait for one reply datagram and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a reply when --wait is set.
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Print counters before exiting.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn resolve_payload(args: &PayloadArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

pub fn resolve_addr(input: &str) -> CliResult<SocketAddr> {
    input
        .to_socket_addrs()
        .map_err(|err| CliError::new(USAGE, format!("invalid address {input}: {err}")))?
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("address {input} resolved to nothing")))
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

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
