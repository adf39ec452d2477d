//! co2attest: freight CO2e reports with detached signatures.
//!
//! This crate provides:
//! - Per-shipment and aggregate tCO2e calculation over a fixed factor table
//! - A deterministic canonical payload for every report
//! - RSA PKCS#1 v1.5 / SHA-256 signing and verification
//! - A write-once SQLite report store with per-account usage counters
//! - Report bundles for downstream rendering, and an HTTP API
//!
//! The CLI wrapper lives in `src/main.rs`.

#![deny(unsafe_code)]

pub mod error;
pub mod config;

pub mod bundle;
pub mod calc;
pub mod canonical;
pub mod factors;
pub mod intake;
pub mod issue;
pub mod report;
pub mod server;
pub mod signing;
pub mod store;
pub mod util;
pub mod verify;
