#![cfg(all(unix, feature = "cli"))]

use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use hwbridge::device::{PING, PONG};
use serde_json::Value;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/hwbcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// Emulator stand-in: answers pings, echoes everything else.
fn spawn_fake_emulator() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("emulator socket should bind");
    let addr = socket.local_addr().expect("emulator socket has an address");
    thread::spawn(move || {
        let mut buf = [0u8; 256];
        while let Ok((n, from)) = socket.recv_from(&mut buf) {
            let reply: &[u8] = if &buf[..n] == PING { PONG } else { &buf[..n] };
            let _ = socket.send_to(reply, from);
        }
    });
    addr
}

struct RunningBridge {
    child: Child,
    dir: PathBuf,
    socket: PathBuf,
    device: String,
}

impl Drop for RunningBridge {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn start_bridge(tag: &str) -> RunningBridge {
    let emulator = spawn_fake_emulator();
    let dir = unique_temp_dir(tag);
    let socket = dir.join("bridge.sock");

    let child = Command::new(env!("CARGO_BIN_EXE_hwbridge"))
        .arg("--log-level")
        .arg("error")
        .arg("--socket")
        .arg(&socket)
        .arg("serve")
        .arg("--transport")
        .arg("udp")
        .arg("--udp-endpoint")
        .arg(emulator.to_string())
        .arg("--poll-interval")
        .arg("50ms")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");

    let started = Instant::now();
    while !socket.exists() {
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "bridge socket never appeared"
        );
        thread::sleep(Duration::from_millis(25));
    }

    let bridge = RunningBridge {
        child,
        dir,
        socket,
        device: emulator.to_string(),
    };
    // Acquire needs the emulator in the descriptor set.
    let listed = hwbridge(&bridge.socket, &["enumerate"]);
    assert!(listed.status.success(), "initial enumerate failed");
    bridge
}

fn hwbridge(socket: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hwbridge"))
        .arg("--log-level")
        .arg("error")
        .arg("--socket")
        .arg(socket)
        .arg("--format")
        .arg("json")
        .args(args)
        .output()
        .expect("command should run")
}

fn json_stdout(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn acquire_call_release_through_cli() {
    let bridge = start_bridge("e2e");

    let listed = json_stdout(&hwbridge(&bridge.socket, &["enumerate"]));
    assert_eq!(listed[0]["path"], bridge.device.as_str());
    assert_eq!(listed[0]["kind"], "emulator");
    assert!(listed[0]["session"].is_null());

    let acquired = json_stdout(&hwbridge(&bridge.socket, &["acquire", &bridge.device]));
    let session = acquired["session"].as_str().expect("session id").to_string();

    let answer = json_stdout(&hwbridge(
        &bridge.socket,
        &["call", &session, "--message-type", "55", "--payload", "4242", "--timeout", "5s"],
    ));
    assert_eq!(answer["message_type"], 55);
    assert_eq!(answer["payload"], "4242");

    let released = json_stdout(&hwbridge(&bridge.socket, &["release", &session]));
    assert_eq!(released["action"], "released");

    let output = hwbridge(&bridge.socket, &["call", &session, "--data", "000000000000"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("session not found"));
}

#[test]
fn stale_previous_session_is_refused() {
    let bridge = start_bridge("stale");

    let first = json_stdout(&hwbridge(&bridge.socket, &["acquire", &bridge.device]));
    let first = first["session"].as_str().expect("session id").to_string();
    json_stdout(&hwbridge(
        &bridge.socket,
        &["acquire", &bridge.device, "--previous", &first],
    ));

    let output = hwbridge(
        &bridge.socket,
        &["acquire", &bridge.device, "--previous", &first],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("wrong previous session"));
}

#[test]
fn invalid_hex_is_data_invalid() {
    let bridge = start_bridge("hex");
    let acquired = json_stdout(&hwbridge(&bridge.socket, &["acquire", &bridge.device]));
    let session = acquired["session"].as_str().expect("session id").to_string();

    let output = hwbridge(&bridge.socket, &["send", &session, "--data", "xyz"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn version_reports_running_bridge() {
    let bridge = start_bridge("version");
    let output = hwbridge(&bridge.socket, &["version", "--bridge"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("hwbridge "));
    assert!(stdout.contains("transport udp"));
}

#[test]
fn enumerate_without_bridge_fails() {
    let dir = unique_temp_dir("absent");
    let output = hwbridge(&dir.join("missing.sock"), &["enumerate"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_timeout_is_usage_error() {
    let dir = unique_temp_dir("usage");
    let output = hwbridge(
        &dir.join("missing.sock"),
        &["receive", "1", "--timeout", "soon"],
    );
    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}
