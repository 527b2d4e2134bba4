mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;
use hwbridge_rpc::default_socket_path;

use crate::cmd::Command;
use crate::exit::INTERNAL;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "hwbridge", version, about = "Hardware wallet bridge")]
struct Cli {
    /// Bridge socket path.
    #[arg(
        long,
        value_name = "PATH",
        env = "HWBRIDGE_SOCKET",
        default_value_os_t = default_socket_path(),
        global = true
    )]
    socket: PathBuf,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        env = "HWBRIDGE_LOG_FORMAT",
        default_value = "text",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "HWBRIDGE_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start async runtime: {err}");
            std::process::exit(INTERNAL);
        }
    };
    let result = runtime.block_on(cmd::run(cli.command, &cli.socket, format));
    // Listeners blocked on a device must not keep the process alive.
    runtime.shutdown_background();

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
