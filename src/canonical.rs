//! Canonical payload encoding.
//!
//! The canonical payload is the only thing that is ever signed or verified.
//! It is compact UTF-8 JSON whose field order is fixed by the declaration
//! order of the private `*V1` structs below, and whose numbers are all
//! rendered as fixed-precision decimal strings so that no float printer,
//! locale or platform can change a byte.
//!
//! Input amounts below [`crate::calc::MIN_AMOUNT`] are rejected before they
//! get here, so every accepted quantity, weight and distance prints as a
//! non-zero amount.  Emissions are derived values and can still round to
//! `0.000000` tCO2e for very light or very short shipments; the signed
//! inputs and factor are what make such a row auditable.
//!
//! Any change to the structs or precisions is a new format and must bump
//! [`PAYLOAD_SCHEMA`]; previously issued reports stay verifiable because
//! verification only ever looks at the stored bytes.

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, ResultExt as _};
use crate::factors::{FACTOR_TABLE_ID, UNCERTAINTY_PCT, WTT_SHARE};
use crate::report::Report;

pub const PAYLOAD_SCHEMA: &str = "co2attest.payload.v1";

/// Decimal places for quantities, weights, distances and emissions.
pub const AMOUNT_DECIMALS: usize = 6;
/// Decimal places for emission factors.
pub const FACTOR_DECIMALS: usize = 9;

// ---------------------------------------------------------------------------
// Wire structs (v1)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PayloadV1<'a> {
    schema: &'static str,
    report_no: &'a str,
    company: &'a str,
    date: &'a str,
    methodology: MethodologyV1,
    total_tco2e: String,
    rows: Vec<RowV1<'a>>,
}

#[derive(Serialize)]
struct MethodologyV1 {
    factor_table: &'static str,
    unit: &'static str,
    wtt_share: String,
    uncertainty_pct: String,
}

#[derive(Serialize)]
struct RowV1<'a> {
    product: &'a str,
    quantity: String,
    unit_weight_kg: String,
    distance_km: String,
    mode: &'static str,
    fuel: &'static str,
    factor: String,
    wtt_tco2e: String,
    ttw_tco2e: String,
    tco2e: String,
}

/// Render a number with a fixed count of decimals.  Negative zero prints as
/// zero.
pub fn fixed(value: f64, decimals: usize) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value:.decimals$}")
}

fn amount(value: f64) -> String {
    fixed(value, AMOUNT_DECIMALS)
}

// ---------------------------------------------------------------------------
// Canonical payload
// ---------------------------------------------------------------------------

/// Deterministic byte encoding of a [`Report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload {
    report_no: String,
    text: String,
}

impl CanonicalPayload {
    pub fn report_no(&self) -> &str {
        &self.report_no
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Serialize for CanonicalPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

pub fn canonicalize(report: &Report) -> Result<CanonicalPayload> {
    let rows = report
        .rows()
        .iter()
        .map(|r| RowV1 {
            product: r.product(),
            quantity: amount(r.quantity()),
            unit_weight_kg: amount(r.unit_weight_kg()),
            distance_km: amount(r.distance_km()),
            mode: r.mode().as_str(),
            fuel: r.fuel_label(),
            factor: fixed(r.factor(), FACTOR_DECIMALS),
            wtt_tco2e: amount(r.wtt_tco2e()),
            ttw_tco2e: amount(r.ttw_tco2e()),
            tco2e: amount(r.row_emission_tco2e()),
        })
        .collect();

    let payload = PayloadV1 {
        schema: PAYLOAD_SCHEMA,
        report_no: report.report_no(),
        company: report.company(),
        date: report.date(),
        methodology: MethodologyV1 {
            factor_table: FACTOR_TABLE_ID,
            unit: "tCO2e",
            wtt_share: fixed(WTT_SHARE, 2),
            uncertainty_pct: fixed(UNCERTAINTY_PCT, 1),
        },
        total_tco2e: amount(report.total_tco2e()),
        rows,
    };

    let text = serde_json::to_string(&payload).ctx_report("serialize canonical payload")?;
    Ok(CanonicalPayload {
        report_no: report.report_no().to_string(),
        text,
    })
}

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// The identifying fields of a canonical payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayloadHeader {
    pub schema: String,
    pub report_no: String,
}

/// Read `schema` and `report_no` back out of stored payload bytes.
///
/// Returns `None` for anything that is not a canonical payload of a known
/// schema.
pub fn parse_header(bytes: &[u8]) -> Option<PayloadHeader> {
    let header: PayloadHeader = serde_json::from_slice(bytes).ok()?;
    (header.schema == PAYLOAD_SCHEMA).then_some(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{calculate, ShipmentRow};

    fn widget_report() -> Report {
        let calc = calculate(&[ShipmentRow::new("Widget", 2.0, 500.0, 100.0, Some("Air"))]);
        Report::new("R-TEST-1", "ACME GmbH", "2026-10-18", calc).unwrap()
    }

    #[test]
    fn widget_payload_is_byte_exact() {
        let payload = canonicalize(&widget_report()).unwrap();
        let expected = concat!(
            r#"{"schema":"co2attest.payload.v1","report_no":"R-TEST-1","company":"ACME GmbH","#,
            r#""date":"2026-10-18","methodology":{"factor_table":"defra-2025-freight-kgkm-v1","#,
            r#""unit":"tCO2e","wtt_share":"0.20","uncertainty_pct":"5.0"},"total_tco2e":"0.092700","#,
            r#""rows":[{"product":"Widget","quantity":"2.000000","unit_weight_kg":"500.000000","#,
            r#""distance_km":"100.000000","mode":"air","fuel":"Jet A-1","factor":"0.000927000","#,
            r#""wtt_tco2e":"0.018540","ttw_tco2e":"0.074160","tco2e":"0.092700"}]}"#,
        );
        assert_eq!(payload.as_str(), expected);
    }

    #[test]
    fn repeated_canonicalization_is_identical() {
        let a = canonicalize(&widget_report()).unwrap();
        let b = canonicalize(&widget_report()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn strings_are_escaped_once() {
        let calc = calculate(&[ShipmentRow::new("Bolt \"M8\"\n", 1.0, 1.0, 1.0, None)]);
        let report = Report::new("R2", "Müller & Söhne", "2026-01-01", calc).unwrap();
        let payload = canonicalize(&report).unwrap();
        assert!(payload.as_str().contains(r#""product":"Bolt \"M8\"\n""#));
        assert!(payload.as_str().contains("Müller & Söhne"));
    }

    #[test]
    fn fixed_precision_rendering() {
        assert_eq!(fixed(-0.0, 6), "0.000000");
        assert_eq!(fixed(0.0927, 6), "0.092700");
        assert_eq!(fixed(1234567.0, 2), "1234567.00");
    }

    #[test]
    fn smallest_accepted_amount_stays_visible() {
        use crate::calc::{calculate, ShipmentRow, MIN_AMOUNT};

        assert_eq!(fixed(MIN_AMOUNT, AMOUNT_DECIMALS), "0.000001");
        let calc = calculate(&[
            ShipmentRow::new("speck", 1e-7, 1.0, 1.0, Some("road")),
            ShipmentRow::new("pin", MIN_AMOUNT, 1.0, 1.0, Some("road")),
        ]);
        let report = Report::new("R-TINY", "ACME", "2026-10-18", calc).unwrap();
        let payload = canonicalize(&report).unwrap();
        assert!(!payload.as_str().contains("speck"));
        assert!(payload.as_str().contains(r#""quantity":"0.000001""#));
    }

    #[test]
    fn header_round_trips_from_bytes() {
        let payload = canonicalize(&widget_report()).unwrap();
        let header = parse_header(payload.as_bytes()).unwrap();
        assert_eq!(header.report_no, "R-TEST-1");
        assert!(parse_header(b"not json").is_none());
        assert!(parse_header(br#"{"schema":"other","report_no":"x"}"#).is_none());
    }
}
