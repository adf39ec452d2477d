//! Structured error types for the co2attest library.
//!
//! Every public library function returns [`Result<T>`] which carries a
//! domain-specific [`AttestError`].  The HTTP boundary maps these onto status
//! codes via [`AttestError::kind`].

use thiserror::Error;

// ---------------------------------------------------------------------------
// Primary error enum
// ---------------------------------------------------------------------------

/// Domain-specific error type for the co2attest library.
#[derive(Error, Debug)]
pub enum AttestError {
    /// Input failed a structural or range check.
    #[error("validation: {0}")]
    Validation(String),

    /// Missing or malformed key material, or a failed signing operation.
    #[error("crypto: {0}")]
    Crypto(String),

    /// No report is stored under the requested identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// A report with the same identifier has already been stored.
    #[error("duplicate report: {0}")]
    DuplicateReport(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("intake: {0}")]
    Intake(String),

    #[error("report: {0}")]
    Report(String),

    #[error("config: {0}")]
    Config(String),

    /// Direct database errors (auto-converted via `?` in the store module).
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    /// Catch-all for errors that do not fit a specific domain.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, AttestError>;

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// Coarse error category used by callers that only need to branch on the
/// failure class (HTTP status mapping, CLI exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Crypto,
    NotFound,
    Conflict,
    Storage,
    Internal,
}

impl AttestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Intake(_) => ErrorKind::InvalidInput,
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateReport(_) => ErrorKind::Conflict,
            Self::Persistence(_) | Self::Database(_) => ErrorKind::Storage,
            Self::Report(_) | Self::Config(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

// ---------------------------------------------------------------------------
// Context extension trait
// ---------------------------------------------------------------------------

/// Extension trait that adds domain-specific context to any `Result<T, E>`.
///
/// Usage mirrors `anyhow::Context` but tags the error with the originating
/// subsystem so that callers (and the HTTP boundary) can categorise failures.
///
/// ```ignore
/// RsaPrivateKey::from_pkcs8_pem(pem).ctx_crypto("parse RSA private key")?;
/// ```
pub trait ResultExt<T> {
    fn ctx_crypto(self, msg: &str) -> Result<T>;
    fn ctx_persistence(self, msg: &str) -> Result<T>;
    fn ctx_intake(self, msg: &str) -> Result<T>;
    fn ctx_report(self, msg: &str) -> Result<T>;
    fn ctx_config(self, msg: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn ctx_crypto(self, msg: &str) -> Result<T> {
        self.map_err(|e| AttestError::Crypto(format!("{msg}: {e}")))
    }
    fn ctx_persistence(self, msg: &str) -> Result<T> {
        self.map_err(|e| AttestError::Persistence(format!("{msg}: {e}")))
    }
    fn ctx_intake(self, msg: &str) -> Result<T> {
        self.map_err(|e| AttestError::Intake(format!("{msg}: {e}")))
    }
    fn ctx_report(self, msg: &str) -> Result<T> {
        self.map_err(|e| AttestError::Report(format!("{msg}: {e}")))
    }
    fn ctx_config(self, msg: &str) -> Result<T> {
        self.map_err(|e| AttestError::Config(format!("{msg}: {e}")))
    }
}

/// Same as [`ResultExt`] but for `Option<T>` (converts `None` into an error).
pub trait OptionExt<T> {
    fn required_crypto(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required_crypto(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AttestError::Crypto(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tags_subsystem() {
        let r: std::result::Result<(), &str> = Err("boom");
        let err = r.ctx_crypto("load key").unwrap_err();
        assert!(matches!(err, AttestError::Crypto(_)));
        assert_eq!(err.to_string(), "crypto: load key: boom");
    }

    #[test]
    fn none_becomes_crypto_error() {
        let err = None::<u8>.required_crypto("no signing key configured").unwrap_err();
        assert!(matches!(err, AttestError::Crypto(_)));
        assert_eq!(err.kind(), ErrorKind::Crypto);
    }

    #[test]
    fn kinds_separate_not_found_from_conflict() {
        assert_eq!(AttestError::NotFound("R1".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            AttestError::DuplicateReport("R1".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(AttestError::Crypto("x".into()).kind(), ErrorKind::Crypto);
    }
}
