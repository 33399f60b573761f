use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
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

#[derive(Serialize)]
struct MessageOutput<'a> {
    peer: &'a str,
    size: usize,
    message: &'a str,
    timestamp: String,
}

pub fn print_message(message: &str, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                peer,
                size: message.len(),
                message,
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
                .set_header(vec!["PEER", "SIZE", "MESSAGE"])
                .add_row(vec![
                    peer.to_string(),
                    message.len().to_string(),
                    message.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("peer={} size={} message={}", peer, message.len(), message);
        }
        OutputFormat::Raw => {
            println!("{message}");
        }
    }
}

/// One directory candidate and what it advertises.
#[derive(Debug, Serialize)]
pub struct PeerRow {
    pub name: String,
    pub address: String,
    pub identifiers: Vec<String>,
}

pub fn print_peers(rows: &[PeerRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "ADDRESS", "IDENTIFIERS"]);
            for row in rows {
                table.add_row(vec![
                    row.name.clone(),
                    row.address.clone(),
                    row.identifiers.join("\n"),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "peer={} address={} identifiers={}",
                    row.name,
                    row.address,
                    row.identifiers.join(",")
                );
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                for identifier in &row.identifiers {
                    println!("{}\t{identifier}", row.name);
                }
            }
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
