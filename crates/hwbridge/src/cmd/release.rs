use std::path::Path;

use hwbridge_rpc::RpcRequest;

use crate::cmd::{connect, ReleaseArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_done, OutputFormat};

pub async fn run(args: ReleaseArgs, socket: &Path, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(socket).await?;
    client
        .call(RpcRequest::Release {
            session: args.session.as_str().into(),
        })
        .await
        .map_err(|err| rpc_error("release failed", err))?;
    print_done("released", &args.session, format);
    Ok(SUCCESS)
}
