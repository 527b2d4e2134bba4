use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hwbridge_device::DeviceKind;
use hwbridge_protocol::decode_legacy_hex;
use hwbridge_sessions::{Acquired, Descriptor};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn kind_name(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Firmware => "firmware",
        DeviceKind::Bootloader => "bootloader",
        DeviceKind::Emulator => "emulator",
    }
}

fn session_label(descriptor: &Descriptor) -> String {
    descriptor
        .session
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string)
}

pub fn print_descriptors(descriptors: &[Descriptor], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&descriptors),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PATH", "SESSION", "PRODUCT", "KIND"]);
            for descriptor in descriptors {
                table.add_row(vec![
                    descriptor.path.clone(),
                    session_label(descriptor),
                    format!("{:#06x}", descriptor.product),
                    kind_name(descriptor.kind).to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if descriptors.is_empty() {
                println!("no devices");
            }
            for descriptor in descriptors {
                println!(
                    "path={} session={} product={:#06x} kind={}",
                    descriptor.path,
                    session_label(descriptor),
                    descriptor.product,
                    kind_name(descriptor.kind)
                );
            }
        }
    }
}

pub fn print_acquired(acquired: &Acquired, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(acquired),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PATH", "SESSION"]);
            table.add_row(vec![acquired.path.clone(), acquired.session.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("path={} session={}", acquired.path, acquired.session);
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    session: &'a str,
    message_type: Option<u16>,
    payload_size: Option<usize>,
    payload: Option<String>,
    data: &'a str,
}

/// Print a hex bridge envelope returned by the device, decoding it when possible.
pub fn print_message(session: &str, data: &str, format: OutputFormat) {
    let decoded = decode_legacy_hex(data).ok();
    let out = MessageOutput {
        session,
        message_type: decoded.as_ref().map(|m| m.message_type),
        payload_size: decoded.as_ref().map(|m| m.payload.len()),
        payload: decoded.as_ref().map(|m| hex::encode(&m.payload)),
        data,
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["SESSION", "TYPE", "SIZE", "PAYLOAD"]);
            table.add_row(vec![
                session.to_string(),
                out.message_type.map_or_else(|| "?".to_string(), |t| t.to_string()),
                out.payload_size.map_or_else(|| "?".to_string(), |s| s.to_string()),
                out.payload.clone().unwrap_or_else(|| data.to_string()),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match (out.message_type, &out.payload) {
            (Some(message_type), Some(payload)) => println!(
                "session={session} type={message_type} size={} payload={payload}",
                payload.len() / 2
            ),
            _ => println!("session={session} data={data}"),
        },
    }
}

#[derive(Serialize)]
struct DoneOutput<'a> {
    action: &'a str,
    session: &'a str,
}

pub fn print_done(action: &str, session: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DoneOutput { action, session }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ACTION", "SESSION"]);
            table.add_row(vec![action.to_string(), session.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{action} session={session}"),
    }
}
