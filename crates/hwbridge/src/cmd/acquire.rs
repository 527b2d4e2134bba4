use std::path::Path;

use hwbridge_rpc::RpcRequest;
use hwbridge_sessions::{Acquired, SessionId};

use crate::cmd::{connect, decode, AcquireArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_acquired, OutputFormat};

pub async fn run(args: AcquireArgs, socket: &Path, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(socket).await?;
    let answer = client
        .call(RpcRequest::Acquire {
            path: args.path,
            previous: args.previous.map(SessionId::from),
        })
        .await
        .map_err(|err| rpc_error("acquire failed", err))?;
    let acquired: Acquired = decode(answer)?;
    print_acquired(&acquired, format);
    Ok(SUCCESS)
}
