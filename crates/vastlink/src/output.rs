use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use vastlink_stage::Position;

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
struct ResponseOutput<'a> {
    command: &'a str,
    response: Option<&'a str>,
    timestamp: String,
}

#[derive(Serialize)]
struct PositionOutput {
    #[serde(flatten)]
    position: Position,
    synced: bool,
    timestamp: String,
}

#[derive(Serialize)]
struct StatusOutput {
    busy: bool,
    status: i64,
    timestamp: String,
}

/// Print the response to one raw command.
pub fn print_response(command: &str, response: Option<&str>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ResponseOutput {
            command,
            response,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = table_with_header(vec!["COMMAND", "RESPONSE"]);
            table.add_row(vec![command, response.unwrap_or("")]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let response = response.unwrap_or("<empty>");
            println!("command={command} response={response}");
        }
        OutputFormat::Raw => {
            if let Some(response) = response {
                print_raw(response.as_bytes());
            }
        }
    }
}

/// Print the controller's cached position.
pub fn print_position(position: Position, synced: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PositionOutput {
            position,
            synced,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = table_with_header(vec!["X (µm)", "Y (µm)", "THETA (deg)", "SYNCED"]);
            table.add_row(vec![
                position.x_um.to_string(),
                position.y_um.to_string(),
                position.theta_deg.to_string(),
                synced.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "x={}um y={}um theta={}deg synced={synced}",
                position.x_um, position.y_um, position.theta_deg
            );
        }
        OutputFormat::Raw => {
            let line = format!("{},{},{}", position.x_um, position.y_um, position.theta_deg);
            print_raw(line.as_bytes());
        }
    }
}

/// Print one `busy` status.
pub fn print_status(status: i64, format: OutputFormat) {
    let busy = status != 0;
    match format {
        OutputFormat::Json => print_json(&StatusOutput {
            busy,
            status,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = table_with_header(vec!["BUSY", "STATUS"]);
            table.add_row(vec![busy.to_string(), status.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("busy={busy} status={status}");
        }
        OutputFormat::Raw => print_raw(status.to_string().as_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    println!("{json}");
}

fn table_with_header(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
