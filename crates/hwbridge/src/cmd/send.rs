use std::path::Path;

use hwbridge_rpc::RpcRequest;

use crate::cmd::{connect, envelope, SendArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_done, OutputFormat};

pub async fn run(args: SendArgs, socket: &Path, format: OutputFormat) -> CliResult<i32> {
    let data = envelope(&args.message)?;
    let mut client = connect(socket).await?;
    client
        .call(RpcRequest::Send {
            session: args.session.as_str().into(),
            data,
        })
        .await
        .map_err(|err| rpc_error("send failed", err))?;
    print_done("sent", &args.session, format);
    Ok(SUCCESS)
}
