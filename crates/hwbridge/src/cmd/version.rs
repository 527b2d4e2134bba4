use std::path::Path;

use hwbridge_rpc::{RpcRequest, VersionInfo};

use crate::cmd::{connect, decode, VersionArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};

pub async fn run(args: VersionArgs, socket: &Path) -> CliResult<i32> {
    if !args.extended {
        println!("hwbridge {}", env!("CARGO_PKG_VERSION"));
    } else {
        println!("name: hwbridge");
        println!("version: {}", env!("CARGO_PKG_VERSION"));
        println!(
            "target: {}",
            option_env!("HWBRIDGE_BUILD_TARGET").unwrap_or("unknown")
        );
        println!("target_os: {}", std::env::consts::OS);
        println!("target_arch: {}", std::env::consts::ARCH);
        println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
        println!("features: usb={}, cli=true", cfg!(feature = "usb"));
    }

    if args.bridge {
        let mut client = connect(socket).await?;
        let answer = client
            .call(RpcRequest::Version)
            .await
            .map_err(|err| rpc_error("version failed", err))?;
        let info: VersionInfo = decode(answer)?;
        println!(
            "bridge: {} {} (transport {})",
            info.name, info.version, info.transport
        );
    }

    Ok(SUCCESS)
}
