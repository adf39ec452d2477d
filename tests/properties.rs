//! Property tests for calculation, canonicalization and signatures.

mod common;

use proptest::prelude::*;

use co2attest_core::{
    calc::{self, ShipmentRow},
    canonical,
    factors::TransportMode,
    report::Report,
    signing,
    verify::{self, VerificationStatus},
};

fn mode_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("Air".to_string())),
        Just(Some("rail".to_string())),
        Just(Some("SEA".to_string())),
        "[a-z ]{0,12}".prop_map(Some),
    ]
}

fn row_strategy() -> impl Strategy<Value = ShipmentRow> {
    (
        "[A-Za-z0-9 ]{1,16}",
        -5.0f64..1_000.0,
        0.0f64..5_000.0,
        -10.0f64..20_000.0,
        mode_strategy(),
    )
        .prop_map(|(product, quantity, unit_weight_kg, distance_km, mode)| ShipmentRow {
            product,
            quantity,
            unit_weight_kg,
            distance_km,
            mode,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sign_then_verify_is_valid(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let sig = signing::sign_hex(&*common::SIGNER, &payload).unwrap();
        let verdict = verify::verify_signature(&payload, &sig, &common::public_key());
        prop_assert_eq!(verdict.status, VerificationStatus::Valid);
    }

    #[test]
    fn single_byte_tamper_is_invalid(
        payload in proptest::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let sig = signing::sign_hex(&*common::SIGNER, &payload).unwrap();
        let mut tampered = payload.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= flip;
        let verdict = verify::verify_signature(&tampered, &sig, &common::public_key());
        prop_assert_eq!(verdict.status, VerificationStatus::Invalid);
    }

    #[test]
    fn total_is_in_order_sum_of_accepted_rows(rows in proptest::collection::vec(row_strategy(), 0..20)) {
        let c = calc::calculate(&rows);
        prop_assert_eq!(c.rows.len() + c.rejected.len(), rows.len());
        let sum = c.rows.iter().fold(0.0, |acc, r| acc + r.row_emission_tco2e());
        prop_assert_eq!(c.total_tco2e, sum);
        for r in &c.rows {
            prop_assert!(r.quantity() > 0.0 && r.unit_weight_kg() > 0.0 && r.distance_km() > 0.0);
            let split = r.wtt_tco2e() + r.ttw_tco2e();
            prop_assert!((split - r.row_emission_tco2e()).abs() <= 1e-12 * r.row_emission_tco2e());
        }
    }

    #[test]
    fn canonical_bytes_are_deterministic(rows in proptest::collection::vec(row_strategy(), 0..10)) {
        let a = Report::new("R-PROP", "ACME", "2026-10-18", calc::calculate(&rows)).unwrap();
        let b = Report::new("R-PROP", "ACME", "2026-10-18", calc::calculate(&rows)).unwrap();
        let pa = canonical::canonicalize(&a).unwrap();
        let pb = canonical::canonicalize(&b).unwrap();
        prop_assert_eq!(pa.as_bytes(), pb.as_bytes());
        let header = canonical::parse_header(pa.as_bytes()).unwrap();
        prop_assert_eq!(header.report_no, "R-PROP");
    }

    #[test]
    fn mode_normalization_is_case_and_space_insensitive(word in "(road|rail|sea|air)", pad in " {0,3}") {
        let lower = TransportMode::normalize(Some(&word));
        let shouted = TransportMode::normalize(Some(&format!("{pad}{}{pad}", word.to_uppercase())));
        prop_assert_eq!(lower, shouted);
        prop_assert_eq!(lower.as_str(), word.as_str());
    }
}
