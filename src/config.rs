//! TOML configuration file support.
//!
//! Loads from (in order):
//! 1. An explicit `--config` path
//! 2. `co2attest.toml` next to the executable
//! 3. `~/.config/co2attest/config.toml`
//! 4. Built-in defaults
//!
//! Environment variables (e.g. `CO2ATTEST_DB`) override file values, and CLI
//! arguments override both.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{AttestError, OptionExt as _, Result, ResultExt as _};
use crate::signing::{PublicKeyMaterial, RsaPemSigner};

/// Inline private key PEM; takes precedence over `keys.private_key_pem`.
pub const ENV_PRIVATE_PEM: &str = "CO2ATTEST_PRIVATE_PEM";
/// Inline public key PEM; takes precedence over `keys.public_key_pem`.
pub const ENV_PUBLIC_PEM: &str = "CO2ATTEST_PUBLIC_PEM";

// ---------------------------------------------------------------------------
// Config structs (map 1-to-1 with the TOML sections)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttestConfig {
    pub paths: PathsConfig,
    pub keys: KeysConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub db: PathBuf,
    pub bundle_out_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub private_key_pem: Option<PathBuf>,
    pub public_key_pem: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Base of the public verification URL printed into report bundles.
    pub verify_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Path to a JSON-lines log file.  Empty string means no file logging.
    pub json_log_file: String,
    /// Whether to also output JSON to stdout (for container pipelines).
    pub json_stdout: bool,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from("co2attest.db"),
            bundle_out_dir: PathBuf::from("co2attest-reports"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            verify_base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_log_file: String::new(),
            json_stdout: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AttestConfig {
    /// Try to load from a specific path.  Returns `Ok(default)` if the file
    /// does not exist; returns `Err` if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .ctx_config(&format!("read config file {}", path.display()))?;
        toml::from_str(&text).ctx_config("parse config TOML")
    }

    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from(p);
        }

        if let Ok(exe) = std::env::current_exe() {
            let candidate = exe.with_file_name("co2attest.toml");
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        if let Some(home) = std::env::var_os("HOME") {
            let candidate = PathBuf::from(home)
                .join(".config")
                .join("co2attest")
                .join("config.toml");
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(db) = var("CO2ATTEST_DB") {
            self.paths.db = PathBuf::from(db);
        }
        if let Some(level) = var("CO2ATTEST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(listen) = var("CO2ATTEST_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(url) = var("CO2ATTEST_VERIFY_BASE_URL") {
            self.server.verify_base_url = url;
        }
    }
}

// ---------------------------------------------------------------------------
// Key loading
// ---------------------------------------------------------------------------

impl KeysConfig {
    /// Load the signing key from `CO2ATTEST_PRIVATE_PEM` or the configured
    /// PEM file.
    pub fn load_signer(&self) -> Result<RsaPemSigner> {
        if let Ok(pem) = std::env::var(ENV_PRIVATE_PEM) {
            return RsaPemSigner::from_pem(&SecretString::new(pem.into()));
        }
        let path = self.private_key_pem.as_deref().required_crypto(&format!(
            "no signing key configured (set {ENV_PRIVATE_PEM} or keys.private_key_pem)"
        ))?;
        RsaPemSigner::from_key_pem_path(path)
    }

    /// Load the verification key from `CO2ATTEST_PUBLIC_PEM`, the configured
    /// PEM file, or by deriving it from the signing key.
    pub fn load_public_key(&self) -> Result<PublicKeyMaterial> {
        if let Ok(pem) = std::env::var(ENV_PUBLIC_PEM) {
            return PublicKeyMaterial::from_pem(&pem);
        }
        if let Some(path) = &self.public_key_pem {
            return PublicKeyMaterial::from_pem_path(path);
        }
        self.load_signer()
            .and_then(|s| s.public_key())
            .map_err(|e| AttestError::Crypto(format!("no verification key available: {e}")))
    }
}
