#![allow(dead_code)]

use std::path::Path;
use std::sync::LazyLock;

use co2attest_core::calc::ShipmentRow;
use co2attest_core::issue::IssueRequest;
use co2attest_core::signing::{self, PublicKeyMaterial, RsaPemSigner};

/// One key pair per test binary; RSA generation is slow.
pub static SIGNER: LazyLock<RsaPemSigner> = LazyLock::new(|| {
    let (private_pem, _) = signing::generate_rsa_pem(signing::MIN_RSA_BITS).unwrap();
    RsaPemSigner::from_pem(&private_pem).unwrap()
});

pub fn public_key() -> PublicKeyMaterial {
    SIGNER.public_key().unwrap()
}

pub fn widget_request(report_no: &str) -> IssueRequest {
    IssueRequest {
        company: "ACME GmbH".into(),
        report_no: Some(report_no.into()),
        date: Some("2026-10-18".into()),
        account: Some("acme".into()),
        signer_name: Some("Dana Weber".into()),
        signer_position: None,
        rows: vec![
            ShipmentRow::new("Widget", 2.0, 500.0, 100.0, Some("Air")),
            ShipmentRow::new("Pallet", 10.0, 25.0, 300.0, Some("road")),
            ShipmentRow::new("Container", 1.0, 12_000.0, 8_000.0, Some("Sea freight")),
        ],
    }
}

pub const SHIPMENTS_CSV: &str = "\
Product,Quantity,Weight (kg),Distance (km),Mode
Widget,2,500,100,Air
Pallet,10,25,300,Road
Empty crate,0,5,10,rail
Mystery,1,abc,10,
";

pub fn write_csv(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("shipments.csv");
    std::fs::write(&path, SHIPMENTS_CSV).unwrap();
    path
}
