//! Report persistence.
//!
//! [`ReportStore`] is the only place reports are kept between issuing and
//! verification.  Records are write-once: a second `put` for the same report
//! number fails with [`AttestError::DuplicateReport`] and the SQLite schema
//! rejects UPDATE/DELETE on stored reports.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension as _, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AttestError, Result, ResultExt as _};
use crate::report::SignedReport;
use crate::util;

pub const STORE_SCHEMA_VERSION: i64 = 1;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One persisted report: the exact canonical payload and its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub report_no: String,
    pub payload: String,
    pub signature_hex: String,
    pub created_at_utc: String,
}

/// Persistence contract shared by the SQLite store and the in-memory fake.
pub trait ReportStore: Send + Sync {
    /// Insert a new record.  Fails with [`AttestError::DuplicateReport`] if
    /// `report_no` is already present.
    fn put(&self, report_no: &str, payload: &str, signature_hex: &str) -> Result<StoredReport>;

    fn get(&self, report_no: &str) -> Result<Option<StoredReport>>;

    /// Atomically add one to the account's report counter and return the new
    /// value.
    fn increment_usage(&self, account: &str) -> Result<u64>;

    fn put_signed(&self, signed: &SignedReport) -> Result<StoredReport> {
        self.put(
            signed.report_no(),
            signed.payload().as_str(),
            signed.signature_hex(),
        )
    }

    /// Like [`get`](Self::get) but an unknown number is an
    /// [`AttestError::NotFound`].
    fn fetch(&self, report_no: &str) -> Result<StoredReport> {
        self.get(report_no)?
            .ok_or_else(|| AttestError::NotFound(format!("report {report_no}")))
    }
}

fn normalize_account(account: &str) -> Result<String> {
    let account = account.trim().to_lowercase();
    if account.is_empty() {
        return Err(AttestError::Validation("account must not be empty".into()));
    }
    Ok(account)
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

pub struct SqliteReportStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteReportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteReportStore").finish_non_exhaustive()
    }
}

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS meta(
      k TEXT PRIMARY KEY,
      v TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS reports(
      report_no TEXT PRIMARY KEY,
      payload TEXT NOT NULL,
      signature_hex TEXT NOT NULL,
      created_at_utc TEXT NOT NULL
    );

    CREATE TRIGGER IF NOT EXISTS reports_no_update BEFORE UPDATE ON reports
    BEGIN
      SELECT RAISE(ABORT, 'reports are write-once');
    END;

    CREATE TRIGGER IF NOT EXISTS reports_no_delete BEFORE DELETE ON reports
    BEGIN
      SELECT RAISE(ABORT, 'reports are write-once');
    END;

    CREATE TABLE IF NOT EXISTS usage(
      account TEXT PRIMARY KEY,
      report_count INTEGER NOT NULL
    );
"#;

impl SqliteReportStore {
    /// Open the store at `db_path`, creating the file and schema if needed.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AttestError::Persistence(format!(
                        "create db parent dir {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        let conn = Connection::open(db_path).map_err(|e| {
            AttestError::Persistence(format!("open db {}: {e}", db_path.display()))
        })?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            "#,
        )
        .ctx_persistence("set pragmas")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().ctx_persistence("open in-memory db")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .ctx_persistence("create tables")?;

        let stored: Option<String> = conn
            .query_row("SELECT v FROM meta WHERE k='schema_version'", [], |row| row.get(0))
            .optional()?;
        match stored {
            None => {
                conn.execute(
                    "INSERT INTO meta(k,v) VALUES (?1,?2)",
                    params!["schema_version", STORE_SCHEMA_VERSION.to_string()],
                )?;
                conn.execute(
                    "INSERT INTO meta(k,v) VALUES (?1,?2)",
                    params!["created_at_utc", util::now_utc_rfc3339()],
                )?;
                info!(schema_version = STORE_SCHEMA_VERSION, "report store initialized");
            }
            Some(v) => {
                let version: i64 = v.parse().ctx_persistence("parse schema_version")?;
                if version != STORE_SCHEMA_VERSION {
                    return Err(AttestError::Persistence(format!(
                        "unsupported schema_version {version} (expected {STORE_SCHEMA_VERSION})"
                    )));
                }
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn report_count(&self) -> Result<i64> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))
            .ctx_persistence("count reports")
    }

    /// All stored reports, ordered by report number.
    pub fn iter_reports(&self) -> Result<Vec<StoredReport>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT report_no, payload, signature_hex, created_at_utc
                FROM reports
                ORDER BY report_no ASC
                "#,
            )
            .ctx_persistence("prepare select reports")?;

        let mut rows = stmt.query([]).ctx_persistence("query reports")?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().ctx_persistence("next row")? {
            out.push(StoredReport {
                report_no: row.get(0)?,
                payload: row.get(1)?,
                signature_hex: row.get(2)?,
                created_at_utc: row.get(3)?,
            });
        }
        Ok(out)
    }
}

impl ReportStore for SqliteReportStore {
    fn put(&self, report_no: &str, payload: &str, signature_hex: &str) -> Result<StoredReport> {
        util::validate_report_no(report_no)?;
        let record = StoredReport {
            report_no: report_no.to_string(),
            payload: payload.to_string(),
            signature_hex: signature_hex.to_string(),
            created_at_utc: util::now_utc_rfc3339(),
        };

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .ctx_persistence("begin tx")?;
        let inserted = tx
            .execute(
                r#"
                INSERT INTO reports(report_no, payload, signature_hex, created_at_utc)
                VALUES (?1,?2,?3,?4)
                ON CONFLICT(report_no) DO NOTHING
                "#,
                params![
                    record.report_no,
                    record.payload,
                    record.signature_hex,
                    record.created_at_utc,
                ],
            )
            .ctx_persistence("insert report")?;
        if inserted == 0 {
            return Err(AttestError::DuplicateReport(report_no.to_string()));
        }
        tx.commit().ctx_persistence("commit tx")?;

        info!(report_no, "report stored");
        Ok(record)
    }

    fn get(&self, report_no: &str) -> Result<Option<StoredReport>> {
        self.conn
            .lock()
            .query_row(
                r#"
                SELECT report_no, payload, signature_hex, created_at_utc
                FROM reports WHERE report_no = ?1
                "#,
                params![report_no],
                |row| {
                    Ok(StoredReport {
                        report_no: row.get(0)?,
                        payload: row.get(1)?,
                        signature_hex: row.get(2)?,
                        created_at_utc: row.get(3)?,
                    })
                },
            )
            .optional()
            .ctx_persistence("select report")
    }

    fn increment_usage(&self, account: &str) -> Result<u64> {
        let account = normalize_account(account)?;
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                r#"
                INSERT INTO usage(account, report_count) VALUES (?1, 1)
                ON CONFLICT(account) DO UPDATE SET report_count = report_count + 1
                RETURNING report_count
                "#,
                params![account],
                |row| row.get(0),
            )
            .ctx_persistence("increment usage")?;
        u64::try_from(count).ctx_persistence("usage counter out of range")
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: Mutex<HashMap<String, StoredReport>>,
    usage: Mutex<HashMap<String, u64>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ReportStore for MemoryReportStore {
    fn put(&self, report_no: &str, payload: &str, signature_hex: &str) -> Result<StoredReport> {
        util::validate_report_no(report_no)?;
        let mut reports = self.reports.lock();
        if reports.contains_key(report_no) {
            return Err(AttestError::DuplicateReport(report_no.to_string()));
        }
        let record = StoredReport {
            report_no: report_no.to_string(),
            payload: payload.to_string(),
            signature_hex: signature_hex.to_string(),
            created_at_utc: util::now_utc_rfc3339(),
        };
        reports.insert(report_no.to_string(), record.clone());
        Ok(record)
    }

    fn get(&self, report_no: &str) -> Result<Option<StoredReport>> {
        Ok(self.reports.lock().get(report_no).cloned())
    }

    fn increment_usage(&self, account: &str) -> Result<u64> {
        let account = normalize_account(account)?;
        let mut usage = self.usage.lock();
        let count = usage.entry(account).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

/// Export every stored report to a JSON file for backup.
pub fn export_reports_json(store: &SqliteReportStore, out_path: &Path) -> Result<usize> {
    let reports = store.iter_reports()?;
    let export = serde_json::json!({
        "format": "co2attest-store-export-v1",
        "exported_at_utc": util::now_utc_rfc3339(),
        "schema_version": STORE_SCHEMA_VERSION,
        "reports": reports,
    });
    let json = serde_json::to_vec_pretty(&export).ctx_persistence("serialize export")?;
    std::fs::write(out_path, json)
        .map_err(|e| AttestError::Persistence(format!("write {}: {e}", out_path.display())))?;
    Ok(reports.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> Vec<Box<dyn ReportStore>> {
        vec![
            Box::new(SqliteReportStore::open_in_memory().unwrap()),
            Box::new(MemoryReportStore::new()),
        ]
    }

    #[test]
    fn put_then_get() {
        for store in stores() {
            store.put("R1", "{\"a\":1}", "abcd").unwrap();
            let got = store.get("R1").unwrap().unwrap();
            assert_eq!(got.payload, "{\"a\":1}");
            assert_eq!(got.signature_hex, "abcd");
            assert!(store.get("R2").unwrap().is_none());
        }
    }

    #[test]
    fn duplicate_put_fails_distinctly() {
        for store in stores() {
            store.put("R1", "first", "aa").unwrap();
            let err = store.put("R1", "second", "bb").unwrap_err();
            assert!(matches!(err, AttestError::DuplicateReport(ref n) if n == "R1"));
            assert_eq!(store.get("R1").unwrap().unwrap().payload, "first");
        }
    }

    #[test]
    fn fetch_unknown_is_not_found() {
        for store in stores() {
            let err = store.fetch("missing").unwrap_err();
            assert!(matches!(err, AttestError::NotFound(_)));
        }
    }

    #[test]
    fn usage_counter_increments_per_account() {
        for store in stores() {
            assert_eq!(store.increment_usage("Ops@Example.com ").unwrap(), 1);
            assert_eq!(store.increment_usage("ops@example.com").unwrap(), 2);
            assert_eq!(store.increment_usage("other@example.com").unwrap(), 1);
            assert!(store.increment_usage("  ").is_err());
        }
    }

    #[test]
    fn sqlite_rows_are_write_once() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        store.put("R1", "payload", "aa").unwrap();
        let conn = store.conn.lock();
        assert!(conn
            .execute("UPDATE reports SET payload='tampered' WHERE report_no='R1'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM reports", []).is_err());
    }
}
