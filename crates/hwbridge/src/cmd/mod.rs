use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use hwbridge_protocol::{encode_legacy_hex, Message};
use hwbridge_rpc::RpcClient;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::exit::{rpc_error, CliError, CliResult, DATA_INVALID, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod acquire;
pub mod call;
pub mod enumerate;
pub mod listen;
pub mod receive;
pub mod release;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge on the local socket.
    Serve(ServeArgs),
    /// Enumerate devices and print their descriptors.
    Enumerate,
    /// Acquire a device and print the new session.
    Acquire(AcquireArgs),
    /// Release a session.
    Release(ReleaseArgs),
    /// Write a message and wait for the device's response.
    Call(CallArgs),
    /// Write a message without waiting for a response.
    Send(SendArgs),
    /// Wait for one message from the device.
    Receive(ReceiveArgs),
    /// Print descriptor updates as they happen.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, socket: &Path, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, socket).await,
        Command::Enumerate => enumerate::run(socket, format).await,
        Command::Acquire(args) => acquire::run(args, socket, format).await,
        Command::Release(args) => release::run(args, socket, format).await,
        Command::Call(args) => call::run(args, socket, format).await,
        Command::Send(args) => send::run(args, socket, format).await,
        Command::Receive(args) => receive::run(args, socket, format).await,
        Command::Listen(args) => listen::run(args, socket, format).await,
        Command::Version(args) => version::run(args, socket).await,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Usb,
    Udp,
}

#[cfg(feature = "usb")]
const DEFAULT_TRANSPORT: &str = "usb";
#[cfg(not(feature = "usb"))]
const DEFAULT_TRANSPORT: &str = "udp";

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Device transport.
    #[arg(long, value_name = "KIND", default_value = DEFAULT_TRANSPORT)]
    pub transport: TransportKind,
    /// Emulator endpoints probed by the UDP transport (comma-separated).
    #[arg(
        long,
        value_name = "ADDR",
        env = "HWBRIDGE_UDP_ENDPOINTS",
        value_delimiter = ','
    )]
    pub udp_endpoint: Vec<SocketAddr>,
    /// Hot-plug polling interval (e.g. 500ms, 1s).
    #[arg(long, default_value = "500ms")]
    pub poll_interval: String,
    /// Largest message a device may declare, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_message_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct AcquireArgs {
    /// Device path from `enumerate`.
    pub path: String,
    /// Session the caller last saw on this path.
    #[arg(long, value_name = "SESSION")]
    pub previous: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Session to release.
    pub session: String,
}

/// Message to write, either as a ready envelope or as type plus payload.
#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// Hex bridge envelope (type, length and payload).
    #[arg(
        long,
        value_name = "HEX",
        conflicts_with_all = ["message_type", "payload"],
        required_unless_present = "message_type"
    )]
    pub data: Option<String>,
    /// Message type; the envelope is built from --payload.
    #[arg(long, value_name = "TYPE", requires = "payload")]
    pub message_type: Option<u16>,
    /// Hex-encoded message payload.
    #[arg(long, value_name = "HEX", requires = "message_type")]
    pub payload: Option<String>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Session holding the device.
    pub session: String,
    #[command(flatten)]
    pub message: PayloadArgs,
    /// Give up waiting after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Session holding the device.
    pub session: String,
    #[command(flatten)]
    pub message: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Session holding the device.
    pub session: String,
    /// Give up waiting after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Exit after printing N descriptor sets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
    /// Also ask the running bridge for its version.
    #[arg(long)]
    pub bridge: bool,
}

pub(crate) async fn connect(socket: &Path) -> CliResult<RpcClient> {
    RpcClient::connect(socket)
        .await
        .map_err(|err| rpc_error("connect failed", err))
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> CliResult<T> {
    serde_json::from_value(value)
        .map_err(|err| CliError::new(DATA_INVALID, format!("unexpected bridge answer: {err}")))
}

/// Resolve the hex envelope to send.
pub(crate) fn envelope(args: &PayloadArgs) -> CliResult<String> {
    if let Some(data) = &args.data {
        return Ok(data.clone());
    }
    let (Some(message_type), Some(payload)) = (args.message_type, &args.payload) else {
        return Err(CliError::new(USAGE, "either --data or --message-type is required"));
    };
    let payload = hex::decode(payload.trim())
        .map_err(|err| CliError::new(USAGE, format!("invalid --payload: {err}")))?;
    encode_legacy_hex(&Message::new(message_type, payload))
        .map_err(|err| CliError::new(DATA_INVALID, format!("cannot encode message: {err}")))
}

/// Await `fut`, failing with [`TIMEOUT`] once `limit` elapses.
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> CliResult<T>
where
    F: Future<Output = CliResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            CliError::new(TIMEOUT, format!("no answer within {}ms", limit.as_millis()))
        })?,
        None => fut.await,
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
