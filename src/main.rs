use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use co2attest_core::{
    bundle, calc,
    config::{AttestConfig, KeysConfig, LoggingConfig},
    intake,
    issue::{self, IssueRequest, StorageStatus},
    server::{self, AppState},
    signing::{self, PublicKeyMaterial, RsaPemSigner, Signer as _},
    store::{self, ReportStore as _, SqliteReportStore},
    util,
    verify::{self, Verdict},
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "co2attest",
    version = util::VERSION,
    about = "Freight CO2e calculation with signed, verifiable reports"
)]
struct Cli {
    /// Path to the report store (SQLite).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Signing key PEM (overrides `keys.private_key_pem`).
    #[arg(long, global = true)]
    private_key: Option<PathBuf>,

    /// Verification key PEM (overrides `keys.public_key_pem`).
    #[arg(long, global = true)]
    public_key: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new, empty report store.
    InitStore,

    /// Generate an RSA signing key pair (dev/POC).
    Keygen {
        #[arg(long, default_value = "co2attest-keys")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 2048)]
        bits: usize,
    },

    /// Calculate emissions for a CSV or JSON shipment file and print them.
    Calculate {
        #[arg(long)]
        input: PathBuf,
    },

    /// Calculate, sign and store a report, then write its bundle.
    Issue {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        company: String,
        #[arg(long)]
        report_no: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        account: Option<String>,
        /// Name of the person attesting the report.
        #[arg(long)]
        signer_name: Option<String>,
        /// Defaults to "Environmental Manager".
        #[arg(long)]
        signer_position: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Sign a payload file (or stdin) and print the hex signature.
    Sign {
        #[arg(long)]
        payload: Option<PathBuf>,
    },

    /// Store a payload and detached signature under a report number.
    Store {
        #[arg(long)]
        report_no: String,
        #[arg(long)]
        payload: PathBuf,
        #[arg(long)]
        signature: PathBuf,
    },

    /// Verify a stored report.  Exits with status 1 unless valid.
    Verify {
        #[arg(long)]
        report_no: String,
    },

    /// Verify a payload file against a detached hex signature file.
    VerifyFile {
        #[arg(long)]
        payload: PathBuf,
        #[arg(long)]
        signature: PathBuf,
        /// Also require the payload to belong to this report number.
        #[arg(long)]
        report_no: Option<String>,
    },

    /// Export all stored reports to a JSON backup file.
    ExportStore {
        #[arg(long)]
        out: PathBuf,
    },

    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        listen: Option<String>,
    },

    /// Print version information.
    Version,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = AttestConfig::load(cli.config.as_deref()).context("load config")?;
    cfg.apply_env();
    if let Some(p) = cli.private_key {
        cfg.keys.private_key_pem = Some(p);
    }
    if let Some(p) = cli.public_key {
        cfg.keys.public_key_pem = Some(p);
    }

    init_logging(&cfg.logging)?;

    let db_path = cli.db.unwrap_or(cfg.paths.db.clone());
    util::validate_path(&db_path, "db")?;

    match cli.cmd {
        Commands::InitStore => {
            let store = SqliteReportStore::open(&db_path).context("open report store")?;
            info!(db = %db_path.display(), reports = store.report_count()?, "report store ready");
        }

        Commands::Keygen { out_dir, bits } => {
            signing::keygen_rsa(&out_dir, bits).context("keygen")?;
            info!(out_dir = %out_dir.display(), "generated signing_key.pem and signing_pub.pem");
        }

        Commands::Calculate { input } => {
            let rows = load_rows(&input)?;
            let calculation = calc::calculate(&rows);
            let json =
                serde_json::to_string_pretty(&calculation).context("serialize calculation")?;
            println!("{json}");
        }

        Commands::Issue {
            input,
            company,
            report_no,
            date,
            account,
            signer_name,
            signer_position,
            out_dir,
        } => {
            let rows = load_rows(&input)?;
            let signer = load_signer(&cfg.keys)?;
            let store = SqliteReportStore::open(&db_path).context("open report store")?;

            let issued = issue::issue_report(
                IssueRequest {
                    company,
                    report_no,
                    date,
                    account,
                    signer_name,
                    signer_position,
                    rows,
                },
                &signer,
                &store,
            )
            .context("issue report")?;

            let out = out_dir.unwrap_or(cfg.paths.bundle_out_dir.clone());
            let dir = bundle::write_report_bundle(&out, &issued, &cfg.server.verify_base_url)
                .context("write report bundle")?;
            println!("{}", issued.signed.report_no());

            if let StorageStatus::Failed(reason) = &issued.storage {
                anyhow::bail!(
                    "report {} was signed (bundle in {}) but not stored: {reason}",
                    issued.signed.report_no(),
                    dir.display()
                );
            }
            info!(bundle = %dir.display(), "report bundle written");
        }

        Commands::Sign { payload } => {
            let bytes = match payload {
                Some(path) => {
                    std::fs::read(&path).with_context(|| format!("read {}", path.display()))?
                }
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut buf)
                        .context("read payload from stdin")?;
                    buf
                }
            };
            let signer = load_signer(&cfg.keys)?;
            println!("{}", signing::sign_hex(&signer, &bytes)?);
        }

        Commands::Store {
            report_no,
            payload,
            signature,
        } => {
            util::validate_report_no(&report_no)?;
            let payload = std::fs::read_to_string(&payload)
                .with_context(|| format!("read {}", payload.display()))?;
            let signature_hex = read_signature(&signature)?;
            let store = SqliteReportStore::open(&db_path).context("open report store")?;
            store
                .put(&report_no, &payload, &signature_hex)
                .context("store report")?;
            println!("OK");
        }

        Commands::Verify { report_no } => {
            let key = load_public_key(&cfg.keys)?;
            let store = SqliteReportStore::open(&db_path).context("open report store")?;
            let verdict = verify::verify_stored(&store, &report_no, &key)
                .context("verify stored report")?;
            exit_with_verdict(&verdict)?;
        }

        Commands::VerifyFile {
            payload,
            signature,
            report_no,
        } => {
            let key = load_public_key(&cfg.keys)?;
            let bytes =
                std::fs::read(&payload).with_context(|| format!("read {}", payload.display()))?;
            let signature_hex = read_signature(&signature)?;
            let verdict = match report_no {
                Some(id) => verify::verify(&id, &bytes, &signature_hex, &key),
                None => verify::verify_signature(&bytes, &signature_hex, &key),
            };
            exit_with_verdict(&verdict)?;
        }

        Commands::ExportStore { out } => {
            let store = SqliteReportStore::open(&db_path).context("open report store")?;
            let n = store::export_reports_json(&store, &out).context("export store")?;
            info!(out = %out.display(), reports = n, "report store exported");
        }

        Commands::Serve { listen } => {
            let listen = listen.unwrap_or(cfg.server.listen.clone());
            let signer = load_signer(&cfg.keys)?;
            let public_key = load_public_key(&cfg.keys)?;
            anyhow::ensure!(
                public_key.key_id() == signer.descriptor().key_id,
                "configured public key does not match the signing key"
            );
            let store = SqliteReportStore::open(&db_path).context("open report store")?;
            let state = AppState {
                signer: Arc::new(signer),
                public_key: Arc::new(public_key),
                store: Arc::new(store),
                verify_base_url: cfg.server.verify_base_url.clone(),
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("start async runtime")?;
            runtime
                .block_on(server::serve(&listen, state))
                .context("serve HTTP API")?;
        }

        Commands::Version => {
            println!("{}", util::version_string());
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_rows(input: &Path) -> Result<Vec<calc::ShipmentRow>> {
    util::validate_path(input, "input")?;
    let input = util::canonicalize_if_exists(input, "input")?;
    intake::read_rows(&input).with_context(|| format!("read shipments from {}", input.display()))
}

fn load_signer(keys: &KeysConfig) -> Result<RsaPemSigner> {
    let signer = keys.load_signer().context("load signing key")?;
    info!(key_id = %signer.descriptor().key_id, bits = signer.descriptor().bits, "signing key loaded");
    Ok(signer)
}

fn load_public_key(keys: &KeysConfig) -> Result<PublicKeyMaterial> {
    keys.load_public_key().context("load verification key")
}

fn read_signature(path: &Path) -> Result<String> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(text.trim().to_string())
}

fn exit_with_verdict(verdict: &Verdict) -> Result<()> {
    let json = serde_json::to_string_pretty(verdict).context("serialize verdict")?;
    println!("{json}");
    if !verdict.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));

    let registry = tracing_subscriber::registry().with(filter);

    if cfg.json_stdout {
        // JSON output to stdout for container pipelines.
        let json_layer = tracing_subscriber::fmt::layer().json();
        registry.with(json_layer).init();
    } else if !cfg.json_log_file.is_empty() {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.json_log_file)
            .with_context(|| format!("open json log file {}", cfg.json_log_file))?;
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::sync::Mutex::new(log_file));
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(file_layer).with(console_layer).init();
    } else {
        // Default: human-readable output to stderr; stdout carries command output.
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(console_layer).init();
    }
    Ok(())
}
