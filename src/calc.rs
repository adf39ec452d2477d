//! Per-row and aggregate emission calculation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AttestError, Result};
use crate::factors::{TransportMode, KG_PER_TONNE, WTT_SHARE};

/// Smallest accepted quantity, weight or distance.  Anything smaller would
/// print as zero at the canonical payload's six decimals.
pub const MIN_AMOUNT: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One shipment as it arrives from the intake boundary.
///
/// Numeric cells that could not be read as numbers arrive as `NaN` and are
/// rejected by [`calculate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRow {
    pub product: String,
    pub quantity: f64,
    pub unit_weight_kg: f64,
    pub distance_km: f64,
    #[serde(default)]
    pub mode: Option<String>,
}

impl ShipmentRow {
    pub fn new(
        product: impl Into<String>,
        quantity: f64,
        unit_weight_kg: f64,
        distance_km: f64,
        mode: Option<&str>,
    ) -> Self {
        Self {
            product: product.into(),
            quantity,
            unit_weight_kg,
            distance_km,
            mode: mode.map(str::to_string),
        }
    }

    /// Reject rows whose numeric fields are not finite and at least
    /// [`MIN_AMOUNT`].
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("quantity", self.quantity),
            ("unit_weight_kg", self.unit_weight_kg),
            ("distance_km", self.distance_km),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AttestError::Validation(format!(
                    "{label} must be a positive finite number (got {value})"
                )));
            }
            if value < MIN_AMOUNT {
                return Err(AttestError::Validation(format!(
                    "{label} {value} is below the smallest reportable amount {MIN_AMOUNT}"
                )));
            }
        }
        Ok(())
    }
}

/// A validated shipment with its emission figures.  Built only by
/// [`calculate`]; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedRow {
    product: String,
    quantity: f64,
    unit_weight_kg: f64,
    distance_km: f64,
    mode: TransportMode,
    fuel_label: &'static str,
    factor: f64,
    wtt_tco2e: f64,
    ttw_tco2e: f64,
    row_emission_tco2e: f64,
}

impl ProcessedRow {
    fn from_valid(row: &ShipmentRow) -> Self {
        let mode = TransportMode::normalize(row.mode.as_deref());
        let factor = mode.factor();
        let total_weight_kg = row.quantity * row.unit_weight_kg;
        let row_emission_tco2e = total_weight_kg * row.distance_km * factor / KG_PER_TONNE;
        let wtt_tco2e = row_emission_tco2e * WTT_SHARE;
        Self {
            product: row.product.clone(),
            quantity: row.quantity,
            unit_weight_kg: row.unit_weight_kg,
            distance_km: row.distance_km,
            mode,
            fuel_label: mode.fuel_label(),
            factor,
            wtt_tco2e,
            ttw_tco2e: row_emission_tco2e - wtt_tco2e,
            row_emission_tco2e,
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }
    pub fn quantity(&self) -> f64 {
        self.quantity
    }
    pub fn unit_weight_kg(&self) -> f64 {
        self.unit_weight_kg
    }
    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }
    pub fn mode(&self) -> TransportMode {
        self.mode
    }
    pub fn fuel_label(&self) -> &'static str {
        self.fuel_label
    }
    pub fn factor(&self) -> f64 {
        self.factor
    }
    pub fn wtt_tco2e(&self) -> f64 {
        self.wtt_tco2e
    }
    pub fn ttw_tco2e(&self) -> f64 {
        self.ttw_tco2e
    }
    pub fn row_emission_tco2e(&self) -> f64 {
        self.row_emission_tco2e
    }
}

/// A shipment row excluded from the calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    /// Zero-based position in the input sequence.
    pub index: usize,
    pub product: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calculation {
    pub rows: Vec<ProcessedRow>,
    pub total_tco2e: f64,
    pub rejected: Vec<RejectedRow>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Compute per-row emissions and the in-order total.
///
/// Invalid rows are dropped and reported in [`Calculation::rejected`]; they
/// never contribute to the total.  A row whose emission figures, or whose
/// addition to the running total, would not be finite is rejected the same
/// way.
pub fn calculate(rows: &[ShipmentRow]) -> Calculation {
    let mut processed = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    let mut total_tco2e = 0.0_f64;

    for (index, row) in rows.iter().enumerate() {
        let checked = row.validate().and_then(|()| {
            let p = ProcessedRow::from_valid(row);
            let figures = [p.row_emission_tco2e, p.wtt_tco2e, p.ttw_tco2e];
            if figures.iter().any(|v| !v.is_finite()) {
                return Err(AttestError::Validation("emission overflows".into()));
            }
            if !(total_tco2e + p.row_emission_tco2e).is_finite() {
                return Err(AttestError::Validation("report total overflows".into()));
            }
            Ok(p)
        });
        match checked {
            Ok(p) => {
                total_tco2e += p.row_emission_tco2e;
                processed.push(p);
            }
            Err(e) => {
                warn!(index, product = %row.product, error = %e, "shipment row excluded");
                rejected.push(RejectedRow {
                    index,
                    product: row.product.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    debug!(
        accepted = processed.len(),
        rejected = rejected.len(),
        total_tco2e,
        "calculation complete"
    );

    Calculation {
        rows: processed,
        total_tco2e,
        rejected,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
