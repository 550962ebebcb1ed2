use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use s7link_frame::{encode, Decoded, Message};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Wire form, as the controller would see it.
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
struct MessageOutput<'a> {
    type_id: i32,
    data_id: i32,
    payload: &'a str,
    frame: String,
    timestamp: String,
}

#[derive(Serialize)]
struct DecodedOutput<'a> {
    messages: &'a [Message],
    remainder: &'a str,
}

pub fn print_message(message: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                type_id: message.type_id,
                data_id: message.data_id,
                payload: &message.payload,
                frame: encode(message),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => println!("{}", message_table(std::slice::from_ref(message))),
        OutputFormat::Pretty => println!(
            "type={} data={} payload={}",
            message.type_id, message.data_id, message.payload
        ),
        OutputFormat::Raw => print_raw(encode(message).as_bytes()),
    }
}

pub fn print_decoded(decoded: &Decoded, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DecodedOutput {
                messages: &decoded.messages,
                remainder: &decoded.remainder,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            println!("{}", message_table(&decoded.messages));
            println!("remainder: {:?}", decoded.remainder);
        }
        OutputFormat::Pretty => {
            for message in &decoded.messages {
                print_message(message, format);
            }
            println!("remainder={:?}", decoded.remainder);
        }
        OutputFormat::Raw => {
            for message in &decoded.messages {
                print_message(message, format);
            }
        }
    }
}

/// Print the wire form of one outgoing frame or batch.
pub fn print_encoded(message: &Message, wire: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                type_id: message.type_id,
                data_id: message.data_id,
                payload: &message.payload,
                frame: wire.to_string(),
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
                .set_header(vec!["FRAME", "BYTES"])
                .add_row(vec![wire.to_string(), wire.len().to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{wire}"),
        OutputFormat::Raw => print_raw(wire.as_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn message_table(messages: &[Message]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["TYPE", "DATA", "PAYLOAD"]);
    for message in messages {
        table.add_row(vec![
            message.type_id.to_string(),
            message.data_id.to_string(),
            message.payload.clone(),
        ]);
    }
    table
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
