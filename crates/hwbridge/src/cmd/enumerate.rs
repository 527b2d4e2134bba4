use std::path::Path;

use hwbridge_rpc::RpcRequest;
use hwbridge_sessions::Descriptor;

use crate::cmd::{connect, decode};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_descriptors, OutputFormat};

pub async fn run(socket: &Path, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(socket).await?;
    let answer = client
        .call(RpcRequest::Enumerate)
        .await
        .map_err(|err| rpc_error("enumerate failed", err))?;
    let descriptors: Vec<Descriptor> = decode(answer)?;
    print_descriptors(&descriptors, format);
    Ok(SUCCESS)
}
