//! Shipment intake from CSV and JSON.
//!
//! Intake never rejects a row for bad numbers: a cell that cannot be read as
//! a number becomes `NaN` and the row is dropped later by the calculator,
//! which logs why.

use std::collections::HashMap;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::calc::ShipmentRow;
use crate::error::{AttestError, Result, ResultExt as _};
use crate::util::MAX_CSV_ROWS;

// ---------------------------------------------------------------------------
// Raw JSON rows
// ---------------------------------------------------------------------------

/// A shipment as supplied over JSON: either positional
/// `[product, quantity, weight, distance, mode]` or labelled.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRow {
    Positional(Vec<Value>),
    Labeled(LabeledRow),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabeledRow {
    #[serde(default)]
    pub product: Value,
    #[serde(default, alias = "qty")]
    pub quantity: Value,
    #[serde(
        default,
        alias = "unitWeightKg",
        alias = "weight",
        alias = "weightKg",
        alias = "weight_kg"
    )]
    pub unit_weight_kg: Value,
    #[serde(default, alias = "distanceKm", alias = "distance")]
    pub distance_km: Value,
    #[serde(default)]
    pub mode: Value,
}

fn number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_number(s),
        _ => f64::NAN,
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn optional_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        other => Some(text(other)).filter(|s| !s.trim().is_empty()),
    }
}

fn parse_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

impl RawRow {
    pub fn normalize(&self) -> ShipmentRow {
        match self {
            RawRow::Positional(cells) => {
                let cell = |i: usize| cells.get(i).unwrap_or(&Value::Null);
                ShipmentRow {
                    product: text(cell(0)),
                    quantity: number(cell(1)),
                    unit_weight_kg: number(cell(2)),
                    distance_km: number(cell(3)),
                    mode: optional_text(cell(4)),
                }
            }
            RawRow::Labeled(row) => ShipmentRow {
                product: text(&row.product),
                quantity: number(&row.quantity),
                unit_weight_kg: number(&row.unit_weight_kg),
                distance_km: number(&row.distance_km),
                mode: optional_text(&row.mode),
            },
        }
    }
}

/// Parse a JSON array of positional or labelled rows.
pub fn parse_rows_json(text: &str) -> Result<Vec<ShipmentRow>> {
    let raw: Vec<RawRow> = serde_json::from_str(text).ctx_intake("parse shipment JSON")?;
    if raw.len() > MAX_CSV_ROWS {
        return Err(AttestError::Intake(format!(
            "too many rows: {} (max {MAX_CSV_ROWS})",
            raw.len()
        )));
    }
    Ok(raw.iter().map(RawRow::normalize).collect())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Product,
    Quantity,
    Weight,
    Distance,
    Mode,
}

impl Column {
    const POSITIONAL: [Column; 5] = [
        Column::Product,
        Column::Quantity,
        Column::Weight,
        Column::Distance,
        Column::Mode,
    ];

    fn from_header(header: &str) -> Option<Self> {
        let h = header.trim().to_ascii_lowercase();
        if h.starts_with("product") {
            Some(Column::Product)
        } else if h.starts_with("quantity") || h == "qty" {
            Some(Column::Quantity)
        } else if h.contains("weight") {
            Some(Column::Weight)
        } else if h.starts_with("distance") {
            Some(Column::Distance)
        } else if h.starts_with("mode") || h.starts_with("transport") {
            Some(Column::Mode)
        } else {
            None
        }
    }
}

/// Map header names to column indices.  Falls back to the positional layout
/// `Product, Quantity, Weight (kg), Distance (km), Mode` unless every column
/// is named.
fn column_map(headers: &csv::StringRecord) -> HashMap<Column, usize> {
    let mut named = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        if let Some(col) = Column::from_header(h) {
            named.entry(col).or_insert(i);
        }
    }
    let required = [
        Column::Product,
        Column::Quantity,
        Column::Weight,
        Column::Distance,
    ];
    if required.iter().all(|c| named.contains_key(c)) {
        return named;
    }
    Column::POSITIONAL
        .iter()
        .enumerate()
        .map(|(i, c)| (*c, i))
        .collect()
}

/// Read shipments from CSV text.  The first line is a header.
pub fn parse_rows_csv<R: std::io::Read>(input: R) -> Result<Vec<ShipmentRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let headers = reader.headers().ctx_intake("read CSV header")?.clone();
    let columns = column_map(&headers);
    debug!(?columns, "CSV column layout");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.ctx_intake("read CSV record")?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        if rows.len() >= MAX_CSV_ROWS {
            return Err(AttestError::Intake(format!(
                "too many rows (max {MAX_CSV_ROWS})"
            )));
        }
        let cell = |c: Column| columns.get(&c).and_then(|&i| record.get(i)).unwrap_or("");
        let mode = cell(Column::Mode);
        rows.push(ShipmentRow {
            product: cell(Column::Product).to_string(),
            quantity: parse_number(cell(Column::Quantity)),
            unit_weight_kg: parse_number(cell(Column::Weight)),
            distance_km: parse_number(cell(Column::Distance)),
            mode: (!mode.is_empty()).then(|| mode.to_string()),
        });
    }
    Ok(rows)
}

pub fn read_rows_csv(path: &Path) -> Result<Vec<ShipmentRow>> {
    let file = std::fs::File::open(path)
        .ctx_intake(&format!("open {}", path.display()))?;
    parse_rows_csv(file)
}

/// Read shipments from a `.json` or CSV file, chosen by extension.
pub fn read_rows(path: &Path) -> Result<Vec<ShipmentRow>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let rows = if is_json {
        let text = std::fs::read_to_string(path)
            .ctx_intake(&format!("read {}", path.display()))?;
        parse_rows_json(&text)?
    } else {
        read_rows_csv(path)?
    };
    info!(path = %path.display(), rows = rows.len(), "shipments loaded");
    Ok(rows)
}
