use std::path::Path;

use tracing::info;

use crate::cmd::{connect, ListenArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_descriptors, OutputFormat};

pub async fn run(args: ListenArgs, socket: &Path, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(socket).await?;
    client
        .listen()
        .await
        .map_err(|err| rpc_error("listen failed", err))?;
    info!(socket = %socket.display(), "listening for descriptor updates");

    let mut printed = 0usize;
    loop {
        let descriptors = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = client.next_descriptors() => {
                next.map_err(|err| rpc_error("listen failed", err))?
            }
        };
        print_descriptors(&descriptors, format);
        printed += 1;
        if args.count.is_some_and(|max| printed >= max) {
            break;
        }
    }
    Ok(SUCCESS)
}
