use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use castlink::CastDevice;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

const PREVIEW_BYTES: usize = 64;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Serialize)]
struct FrameOutput<'a> {
    device: &'a str,
    sequence: u64,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_frame(payload: &[u8], device: &str, sequence: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                device,
                sequence,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "DEVICE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    sequence.to_string(),
                    device.to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "#{sequence} device={device} size={} payload={}",
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

pub fn print_devices(devices: &BTreeMap<String, CastDevice>, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out: Vec<&CastDevice> = devices.values().collect();
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "NAME", "ADDRESS", "VOLUME"]);
            for device in devices.values() {
                table.add_row(vec![
                    device.id.clone(),
                    device.name.clone(),
                    optional(device.address),
                    optional(device.volume),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for device in devices.values() {
                println!(
                    "{} name={:?} address={} volume={}",
                    device.id,
                    device.name,
                    optional(device.address),
                    optional(device.volume)
                );
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

/// Printable text as-is, anything else as a truncated hex dump.
fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(|c| c.is_control() && c != '\n' && c != '\t') => {
            text.to_string()
        }
        _ => {
            let shown = &payload[..payload.len().min(PREVIEW_BYTES)];
            let mut hex: String = shown.iter().map(|byte| format!("{byte:02x}")).collect();
            if payload.len() > PREVIEW_BYTES {
                hex.push_str("..");
            }
            format!("<binary {} bytes> {hex}", payload.len())
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
