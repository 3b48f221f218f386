// 📤 CSV export of history listings

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::entities::HistoryView;

/// Flat CSV row (csv cannot serialize flattened structs).
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Account")]
    account: &'a str,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Type")]
    entry_type: &'static str,
    #[serde(rename = "Value")]
    value: String,
    #[serde(rename = "End_Value")]
    end_value: String,
    #[serde(rename = "Variation")]
    variation: String,
    #[serde(rename = "Description")]
    description: &'a str,
}

pub fn write_history_csv<W: Write>(writer: W, rows: &[HistoryView]) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);

    for row in rows {
        wtr.serialize(ExportRow {
            id: row.entry.id,
            account: &row.account_name,
            date: row.entry.date.format("%Y-%m-%d").to_string(),
            entry_type: row.entry.entry_type.as_str(),
            value: row.entry.operation_amount.to_string(),
            end_value: row.entry.end_balance.to_string(),
            variation: row.variation.to_string(),
            description: row.entry.description.as_deref().unwrap_or(""),
        })
        .context("Failed to write CSV row")?;
    }

    wtr.flush().context("Failed to flush CSV output")?;
    Ok(rows.len())
}
