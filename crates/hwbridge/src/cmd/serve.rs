use std::path::Path;
use std::sync::Arc;

use hwbridge_core::{Bridge, BridgeConfig};
use hwbridge_device::{create_api, ApiConfig, UdpConfig, UsbConfig};
use hwbridge_rpc::RpcServer;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs, TransportKind};
use crate::exit::{device_error, rpc_error, CliResult, SUCCESS};

pub async fn run(args: ServeArgs, socket: &Path) -> CliResult<i32> {
    let api = create_api(api_config(&args)?).map_err(|err| device_error("serve failed", err))?;

    let mut config = BridgeConfig::default();
    if let Some(max) = args.max_message_size {
        config.max_message_size = max;
    }
    let bridge = Arc::new(Bridge::new(api, config));
    let server = RpcServer::bind(socket, Arc::clone(&bridge))
        .map_err(|err| rpc_error("bind failed", err))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let result = server.run(shutdown).await;
    bridge.dispose();
    result.map_err(|err| rpc_error("server failed", err))?;
    Ok(SUCCESS)
}

fn api_config(args: &ServeArgs) -> CliResult<ApiConfig> {
    let poll_interval = parse_duration(&args.poll_interval)?;
    Ok(match args.transport {
        TransportKind::Usb => ApiConfig::Usb(UsbConfig {
            poll_interval,
            ..UsbConfig::default()
        }),
        TransportKind::Udp => {
            let mut config = UdpConfig {
                poll_interval,
                ..UdpConfig::default()
            };
            if !args.udp_endpoint.is_empty() {
                config.endpoints = args.udp_endpoint.clone();
            }
            ApiConfig::Udp(config)
        }
    })
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "cannot watch SIGTERM");
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
            return;
        }
    };
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(err) = interrupted {
                warn!(error = %err, "cannot watch SIGINT");
                terminate.recv().await;
            }
        }
        _ = terminate.recv() => {}
    }
    info!("shutting down");
    shutdown.cancel();
}
