use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hwbridge_core::{Bridge, BridgeConfig, Outcome};
use hwbridge_device::{DeviceApi, UdpApi, UdpConfig, PING, PONG};
use hwbridge_protocol::{decode_legacy_hex, encode_legacy_hex, Message};
use hwbridge_rpc::{RpcClient, RpcError, RpcRequest, RpcServer, VersionInfo};
use hwbridge_sessions::{Acquired, Descriptor};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

fn unique_socket_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("hwb-{tag}-{}-{nanos}.sock", std::process::id()))
}

/// Emulator stand-in: answers pings, echoes everything else.
async fn spawn_fake_emulator() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let reply: &[u8] = if &buf[..n] == PING { PONG } else { &buf[..n] };
            let _ = socket.send_to(reply, from).await;
        }
    });
    addr
}

struct Harness {
    socket: PathBuf,
    device: String,
    shutdown: CancellationToken,
}

async fn start_bridge(tag: &str) -> Harness {
    let emulator = spawn_fake_emulator().await;
    let api: Arc<dyn DeviceApi> = Arc::new(UdpApi::new(UdpConfig {
        endpoints: vec![emulator],
        ping_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(20),
        ..UdpConfig::default()
    }));
    let bridge = Arc::new(Bridge::new(api, BridgeConfig::default()));

    let socket = unique_socket_path(tag);
    let server = RpcServer::bind(&socket, bridge).unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.run(shutdown.clone()));

    Harness {
        socket,
        device: emulator.to_string(),
        shutdown,
    }
}

#[tokio::test]
async fn enumerate_acquire_call_release() {
    let harness = start_bridge("e2e").await;
    let mut client = RpcClient::connect(&harness.socket).await.unwrap();

    let listed: Vec<Descriptor> =
        serde_json::from_value(client.call(RpcRequest::Enumerate).await.unwrap()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, harness.device);

    let acquired: Acquired = serde_json::from_value(
        client
            .call(RpcRequest::Acquire {
                path: harness.device.clone(),
                previous: None,
            })
            .await
            .unwrap(),
    )
    .unwrap();

    let request = Message::new(55, vec![0x42; 100]);
    let data = encode_legacy_hex(&request).unwrap();
    let response = client
        .call(RpcRequest::Call {
            session: acquired.session.clone(),
            data: data.clone(),
        })
        .await
        .unwrap();
    let response = decode_legacy_hex(response.as_str().unwrap()).unwrap();
    assert_eq!(response, request);

    client
        .call(RpcRequest::Release {
            session: acquired.session.clone(),
        })
        .await
        .unwrap();

    let outcome = client
        .request(RpcRequest::Call {
            session: acquired.session,
            data,
        })
        .await
        .unwrap();
    assert_eq!(outcome.error(), Some("session not found"));

    harness.shutdown.cancel();
}

#[tokio::test]
async fn stale_previous_is_rejected_over_rpc() {
    let harness = start_bridge("lock").await;
    let mut client = RpcClient::connect(&harness.socket).await.unwrap();
    client.call(RpcRequest::Enumerate).await.unwrap();

    let acquire = |previous| RpcRequest::Acquire {
        path: harness.device.clone(),
        previous,
    };
    let first: Acquired = serde_json::from_value(client.call(acquire(None)).await.unwrap()).unwrap();
    client.call(acquire(Some(first.session.clone()))).await.unwrap();

    let err = client.call(acquire(Some(first.session))).await.unwrap_err();
    match err {
        RpcError::Rejected { error, .. } => assert_eq!(error, "wrong previous session"),
        other => panic!("expected rejection, got {other:?}"),
    }
    harness.shutdown.cancel();
}

#[tokio::test]
async fn listen_pushes_descriptors() {
    let harness = start_bridge("listen").await;
    let mut watcher = RpcClient::connect(&harness.socket).await.unwrap();
    watcher.listen().await.unwrap();
    // The current set arrives right after subscribing.
    watcher.next_descriptors().await.unwrap();

    let mut client = RpcClient::connect(&harness.socket).await.unwrap();
    client.call(RpcRequest::Enumerate).await.unwrap();
    client
        .call(RpcRequest::Acquire {
            path: harness.device.clone(),
            previous: None,
        })
        .await
        .unwrap();

    let owned = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let descriptors = watcher.next_descriptors().await.unwrap();
            if descriptors.iter().any(|d| d.session.is_some()) {
                return descriptors;
            }
        }
    })
    .await
    .expect("acquire must be pushed to listeners");
    assert_eq!(owned[0].path, harness.device);
    harness.shutdown.cancel();
}

#[tokio::test]
async fn version_and_invalid_request() {
    let harness = start_bridge("version").await;
    let mut client = RpcClient::connect(&harness.socket).await.unwrap();

    let version: VersionInfo =
        serde_json::from_value(client.call(RpcRequest::Version).await.unwrap()).unwrap();
    assert_eq!(version.name, "hwbridge");
    assert_eq!(version.transport, "udp");

    let bad_hex = |session: &str| RpcRequest::Call {
        session: session.into(),
        data: "xyz".into(),
    };
    // Unknown sessions are reported before the data is looked at.
    let outcome = client.request(bad_hex("1")).await.unwrap();
    assert_eq!(outcome.error(), Some("session not found"));

    client.call(RpcRequest::Enumerate).await.unwrap();
    let acquired: Acquired = serde_json::from_value(
        client
            .call(RpcRequest::Acquire {
                path: harness.device.clone(),
                previous: None,
            })
            .await
            .unwrap(),
    )
    .unwrap();
    let outcome = client.request(bad_hex(acquired.session.as_str())).await.unwrap();
    assert!(matches!(outcome, Outcome::Failure { ref error, .. } if error == "invalid hex data"));
    harness.shutdown.cancel();
}

#[tokio::test]
async fn bind_refuses_regular_file_and_cleans_up() {
    let path = unique_socket_path("file");
    std::fs::write(&path, b"not a socket").unwrap();

    let emulator = spawn_fake_emulator().await;
    let api: Arc<dyn DeviceApi> = Arc::new(UdpApi::new(UdpConfig {
        endpoints: vec![emulator],
        ..UdpConfig::default()
    }));
    let bridge = Arc::new(Bridge::new(api, BridgeConfig::default()));

    let err = RpcServer::bind(&path, Arc::clone(&bridge)).err().expect("bind must fail");
    assert!(matches!(err, RpcError::Bind { .. }));
    std::fs::remove_file(&path).unwrap();

    let server = RpcServer::bind(&path, bridge).unwrap();
    assert!(path.exists());
    drop(server);
    assert!(!path.exists(), "socket file should be cleaned up on drop");
}
