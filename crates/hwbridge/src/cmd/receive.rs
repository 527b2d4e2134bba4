use std::path::Path;

use hwbridge_rpc::RpcRequest;

use crate::cmd::{connect, decode, parse_duration, with_timeout, ReceiveArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ReceiveArgs, socket: &Path, format: OutputFormat) -> CliResult<i32> {
    let limit = args.timeout.as_deref().map(parse_duration).transpose()?;

    let message: String = with_timeout(limit, async {
        let mut client = connect(socket).await?;
        let answer = client
            .call(RpcRequest::Receive {
                session: args.session.as_str().into(),
            })
            .await
            .map_err(|err| rpc_error("receive failed", err))?;
        decode::<String>(answer)
    })
    .await?;

    print_message(&args.session, &message, format);
    Ok(SUCCESS)
}
