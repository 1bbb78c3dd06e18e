use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linkprims_channel::Counters;
use serde::Serialize;

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

/// One message received from a peer.
pub struct Received<'a> {
    pub transport: &'static str,
    pub peer: String,
    pub sequence: Option<i64>,
    pub payload: &'a [u8],
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    transport: &'a str,
    peer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<i64>,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct CountersOutput<'a> {
    transport: &'a str,
    peer: &'a str,
    sent: u64,
    received: u64,
    dropped: u64,
}

pub fn print_message(message: &Received<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                transport: message.transport,
                peer: &message.peer,
                sequence: message.sequence,
                payload_size: message.payload.len(),
                payload: payload_preview(message.payload),
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
                .set_header(vec!["TRANSPORT", "PEER", "SEQ", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    message.transport.to_string(),
                    message.peer.clone(),
                    sequence_label(message.sequence),
                    message.payload.len().to_string(),
                    payload_preview(message.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "transport={} peer={} seq={} size={} payload={}",
                message.transport,
                message.peer,
                sequence_label(message.sequence),
                message.payload.len(),
                payload_preview(message.payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(message.payload);
        }
    }
}

/// Print a channel's counters on exit. Raw output prints nothing.
pub fn print_counters(transport: &str, peer: &str, counters: Counters, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CountersOutput {
                transport,
                peer,
                sent: counters.sent,
                received: counters.received,
                dropped: counters.dropped,
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
                .set_header(vec!["TRANSPORT", "PEER", "SENT", "RECEIVED", "DROPPED"])
                .add_row(vec![
                    transport.to_string(),
                    peer.to_string(),
                    counters.sent.to_string(),
                    counters.received.to_string(),
                    counters.dropped.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "transport={transport} peer={peer} sent={} received={} dropped={}",
                counters.sent, counters.received, counters.dropped
            );
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn sequence_label(sequence: Option<i64>) -> String {
    sequence.map_or_else(|| "-".to_string(), |seq| seq.to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
