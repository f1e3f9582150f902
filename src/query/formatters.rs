use anyhow::{Result, anyhow};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde::Serialize;
use std::io::Write;

use crate::models::{FirstSeenResult, TransferRecord, TransferSet};
use crate::receipt::PositionReceipt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn write_csv<W: Write, const N: usize>(out: W, header: [&str; N], rows: Vec<[String; N]>) -> Result<W> {
    let mut wtr = Writer::from_writer(out);
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(&row)?;
    }
    wtr.into_inner()
        .map_err(|e| anyhow!("failed to flush CSV output: {}", e.error()))
}

fn csv_rows<const N: usize>(header: [&str; N], rows: Vec<[String; N]>) -> Result<String> {
    let bytes = write_csv(Vec::new(), header, rows)?;
    Ok(String::from_utf8(bytes)?)
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

pub fn format_receipt(receipt: &PositionReceipt, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return to_json(receipt);
    }

    let usd = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{v}"));
    let rows: Vec<[String; 2]> = vec![
        ["Address".into(), receipt.address.clone()],
        ["Chain".into(), receipt.chain.to_string()],
        [
            "Token".into(),
            format!("{} ({})", receipt.token.symbol, receipt.token.address),
        ],
        ["Balance".into(), receipt.current_balance.clone()],
        ["Price (USD)".into(), usd(receipt.price_per_token)],
        ["Value (USD)".into(), usd(receipt.current_value_usd)],
        [
            "First Seen".into(),
            or_dash(receipt.first_seen_approx.timestamp.as_deref()),
        ],
        [
            "Confidence".into(),
            receipt.first_seen_approx.confidence.to_string(),
        ],
        [
            "Held (days)".into(),
            receipt
                .holding_duration_days
                .map_or("-".to_string(), |d| d.to_string()),
        ],
        [
            "Flags".into(),
            receipt
                .flags
                .iter()
                .filter_map(|f| serde_json::to_value(f).ok())
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>()
                .join(", "),
        ],
        ["Notes".into(), receipt.notes.join("\n")],
    ];

    match format {
        OutputFormat::Csv => csv_rows(["field", "value"], rows),
        _ => {
            let mut table = new_table(vec!["Field", "Value"]);
            for [field, value] in rows {
                table.add_row(vec![Cell::new(field), Cell::new(value)]);
            }
            Ok(table.to_string())
        }
    }
}

pub fn format_first_seen(result: &FirstSeenResult, format: OutputFormat) -> Result<String> {
    let rows: Vec<[String; 2]> = vec![
        ["Timestamp".into(), or_dash(result.timestamp.as_deref())],
        ["Confidence".into(), result.confidence.to_string()],
        ["Method".into(), result.method.clone()],
        ["Scan Window".into(), result.scan_window.clone()],
        ["RPC Calls".into(), result.stats.rpc_calls.to_string()],
        ["Note".into(), result.note.clone()],
    ];

    match format {
        OutputFormat::Json => to_json(result),
        OutputFormat::Csv => csv_rows(["field", "value"], rows),
        OutputFormat::Table => {
            let mut table = new_table(vec!["Field", "Value"]);
            for [field, value] in rows {
                table.add_row(vec![Cell::new(field), Cell::new(value)]);
            }
            Ok(table.to_string())
        }
    }
}

fn transfer_row(direction: &str, record: &TransferRecord) -> [String; 5] {
    let counterparty = record.from.as_deref().or(record.to.as_deref());
    [
        direction.to_string(),
        or_dash(record.timestamp.as_deref()),
        record.amount.clone(),
        or_dash(counterparty),
        record.tx_hash.clone(),
    ]
}

pub fn format_transfers(set: &TransferSet, format: OutputFormat) -> Result<String> {
    let rows: Vec<[String; 5]> = set
        .inbound
        .iter()
        .map(|r| transfer_row("in", r))
        .chain(set.outbound.iter().map(|r| transfer_row("out", r)))
        .collect();

    match format {
        OutputFormat::Json => to_json(set),
        OutputFormat::Csv => csv_rows(
            ["direction", "timestamp", "amount", "counterparty", "tx_hash"],
            rows,
        ),
        OutputFormat::Table => {
            if rows.is_empty() {
                return Ok("No transfers found.".to_string());
            }
            let mut table = new_table(vec!["Dir", "Time", "Amount", "Counterparty", "Tx Hash"]);
            for [direction, time, amount, counterparty, hash] in rows {
                table.add_row(vec![
                    Cell::new(direction),
                    Cell::new(time),
                    Cell::new(amount),
                    Cell::new(counterparty),
                    Cell::new(format_tx_hash(&hash)),
                ]);
            }
            let mut output = table.to_string();
            if set.truncated {
                output.push_str("\n(truncated: scan budget ran out)");
            }
            Ok(output)
        }
    }
}

fn format_tx_hash(hash: &str) -> String {
    if hash.len() <= 12 || !hash.is_ascii() {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}
