//! iFinD responses carry data as column arrays under `tables[0].table`.

use serde::Deserialize;
use serde_json::{Map, Value};

use briefing_core::{Announcement, MarketBar};

use crate::error::{IfindError, IfindResult};

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub errorcode: i64,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableEntry {
    #[serde(default)]
    pub time: Option<Vec<Value>>,
    #[serde(default)]
    pub table: Map<String, Value>,
}

impl Envelope {
    /// Fails on a non-zero `errorcode`, otherwise returns the first table (if any).
    pub fn into_first_table(self) -> IfindResult<Option<TableEntry>> {
        if self.errorcode != 0 {
            return Err(IfindError::Api {
                code: self.errorcode,
                message: self.errmsg.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(self.tables.into_iter().next())
    }
}

/// Transpose a columnar table into rows. Scalars count as one-row columns.
pub(crate) fn rows(table: &Map<String, Value>) -> Vec<Map<String, Value>> {
    let len = table
        .values()
        .map(|v| match v {
            Value::Array(items) => items.len(),
            Value::Null => 0,
            _ => 1,
        })
        .max()
        .unwrap_or(0);

    (0..len)
        .map(|i| {
            table
                .iter()
                .filter_map(|(key, column)| {
                    let cell = match column {
                        Value::Array(items) => items.get(i).cloned(),
                        Value::Null => None,
                        scalar if i == 0 => Some(scalar.clone()),
                        _ => None,
                    };
                    cell.map(|c| (key.clone(), c))
                })
                .collect()
        })
        .collect()
}

/// First value of each column. Used for single-security basic data.
pub(crate) fn first_values(table: &Map<String, Value>) -> Map<String, Value> {
    table
        .iter()
        .map(|(key, column)| {
            let value = match column {
                Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

pub(crate) fn text(row: &Map<String, Value>, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn number(row: &Map<String, Value>, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn announcements(table: &Map<String, Value>) -> Vec<Announcement> {
    // A day without filings comes back with an empty reportDate column.
    let has_dates = table
        .get("reportDate")
        .is_some_and(|v| v.as_array().is_some_and(|a| !a.is_empty()) || v.is_string());
    if !has_dates {
        return Vec::new();
    }

    rows(table)
        .iter()
        .map(|row| Announcement {
            report_date: text(row, "reportDate"),
            title: text(row, "reportTitle"),
            pdf_url: text(row, "pdfURL"),
            sec_name: text(row, "secName"),
            thscode: text(row, "thscode"),
        })
        .collect()
}

pub(crate) fn bars(entry: &TableEntry) -> Vec<MarketBar> {
    let mut table = entry.table.clone();
    if let Some(time) = &entry.time {
        table
            .entry("time".to_string())
            .or_insert_with(|| Value::Array(time.clone()));
    }

    rows(&table)
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let close = number(row, "close")?;
            Some(MarketBar {
                date: text(row, "time").unwrap_or_else(|| format!("#{}", i + 1)),
                open: number(row, "open"),
                high: number(row, "high"),
                low: number(row, "low"),
                close,
                volume: number(row, "volume"),
                pct_chg: number(row, "pct_chg"),
                turnover: number(row, "turn"),
            })
        })
        .collect()
}
