use std::path::Path;

use hwbridge_rpc::RpcRequest;

use crate::cmd::{connect, decode, envelope, parse_duration, with_timeout, CallArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: CallArgs, socket: &Path, format: OutputFormat) -> CliResult<i32> {
    let limit = args.timeout.as_deref().map(parse_duration).transpose()?;
    let data = envelope(&args.message)?;

    let response: String = with_timeout(limit, async {
        let mut client = connect(socket).await?;
        let answer = client
            .call(RpcRequest::Call {
                session: args.session.as_str().into(),
                data,
            })
            .await
            .map_err(|err| rpc_error("call failed", err))?;
        decode::<String>(answer)
    })
    .await?;

    print_message(&args.session, &response, format);
    Ok(SUCCESS)
}
