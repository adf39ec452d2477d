//! Transport-mode emission factor table.
//!
//! Unit convention: shipment weights are in kilograms, factors are in
//! kg CO2e per kg·km, and emissions are reported in metric tonnes CO2e
//! (divide by [`KG_PER_TONNE`]).  There is exactly one factor table; its
//! identifier is embedded in every canonical payload so that a future table
//! revision cannot be confused with this one.

use serde::{Deserialize, Serialize};

/// Identifier of the factor table below.  Bump it whenever a factor changes.
pub const FACTOR_TABLE_ID: &str = "defra-2025-freight-kgkm-v1";

/// kg CO2e → t CO2e.
pub const KG_PER_TONNE: f64 = 1000.0;

/// Share of a row's emissions attributed to Well-to-Tank (fuel production);
/// the remainder is Tank-to-Wheel (combustion).
pub const WTT_SHARE: f64 = 0.2;

/// Stated uncertainty of the default factors, in percent.
pub const UNCERTAINTY_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Road,
    Rail,
    Sea,
    Air,
}

impl TransportMode {
    pub const ALL: [TransportMode; 4] = [Self::Road, Self::Rail, Self::Sea, Self::Air];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Road => "road",
            Self::Rail => "rail",
            Self::Sea => "sea",
            Self::Air => "air",
        }
    }

    /// Emission factor in kg CO2e per kg·km.
    pub fn factor(&self) -> f64 {
        match self {
            Self::Road => 0.000105,
            Self::Rail => 0.000028,
            Self::Sea => 0.000016,
            Self::Air => 0.000927,
        }
    }

    pub fn fuel_label(&self) -> &'static str {
        match self {
            Self::Air => "Jet A-1",
            Self::Sea => "Heavy fuel oil",
            Self::Road | Self::Rail => "Diesel",
        }
    }

    /// Map a free-form mode cell onto a known mode.
    ///
    /// Matching is case-insensitive and whitespace-trimmed: exact key, then
    /// alias, then the first word of the cell that is a key or alias.
    /// Anything else (including empty and absent cells) is road.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Road;
        };
        let cell = raw.trim().to_lowercase();
        if cell.is_empty() {
            return Self::Road;
        }
        if let Some(mode) = Self::from_word(&cell) {
            return mode;
        }
        cell.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .find_map(Self::from_word)
            .unwrap_or(Self::Road)
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "road" | "truck" | "lorry" | "hgv" | "van" => Some(Self::Road),
            "rail" | "train" | "railway" => Some(Self::Rail),
            "sea" | "ship" | "ocean" | "vessel" | "maritime" => Some(Self::Sea),
            "air" | "plane" | "aircraft" | "airfreight" | "aviation" => Some(Self::Air),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
