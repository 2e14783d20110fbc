//! fvault: chunked file-encryption CLI
//!
//! Commands:
//!   keygen                               - print a fresh key in config form
//!   encrypt <src> [<dst>] [--copy]       - src → src.enc (or dst)
//!   decrypt <src> [<dst>] [--copy]       - src.enc → src (or dst)
//!   cat <src>                            - decrypt src to stdout
//!   config show                          - display current configuration
//!
//! Names are relative to the vault root (`--root` or `[vault] root`).
//! The default key comes from FVAULT_KEY or `[vault] key`; `--key` on a
//! single command overrides it for that command only.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fvault_core::config::FvaultConfig;
use fvault_crypto::{generate_key, ProgressFn, VaultKey};
use fvault_storage::OperatorStorage;
use fvault_vault::{FileVault, OperationReport, VaultOptions};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "fvault",
    version,
    about = "Chunked streaming file encryption",
    long_about = "fvault: encrypt and decrypt files in a vault directory, chunk by chunk"
)]
struct Cli {
    /// Path to fvault.toml configuration file
    #[arg(long, short = 'c', env = "FVAULT_CONFIG", default_value = "fvault.toml")]
    config: PathBuf,

    /// Vault root directory (overrides config)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log level / filter (overrides config; RUST_LOG takes precedence)
    #[arg(long, env = "FVAULT_LOG", global = true)]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a random key and print it as `base64:<key>`
    Keygen,

    /// Encrypt a file (the plaintext is removed unless --copy)
    Encrypt {
        /// Source name, relative to the vault root
        source: String,
        /// Destination name (default: source + extension)
        destination: Option<String>,
        /// Keep the source file
        #[arg(long)]
        copy: bool,
        /// Key for this command only (same forms as FVAULT_KEY)
        #[arg(long)]
        key: Option<String>,
    },

    /// Decrypt a file (the encrypted file is removed unless --copy)
    Decrypt {
        /// Source name, relative to the vault root
        source: String,
        /// Destination name (default: source without extension)
        destination: Option<String>,
        /// Keep the source file
        #[arg(long)]
        copy: bool,
        /// Key for this command only (same forms as FVAULT_KEY)
        #[arg(long)]
        key: Option<String>,
    },

    /// Decrypt a file to stdout; the source is always kept
    Cat {
        source: String,
        #[arg(long)]
        key: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = FvaultConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    if let Some(root) = &cli.root {
        config.vault.root = root.clone();
    }

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    match cli.command {
        Commands::Keygen => cmd_keygen(),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
        Commands::Encrypt {
            source,
            destination,
            copy,
            key,
        } => cmd_encrypt(&config, &source, destination.as_deref(), copy, key),
        Commands::Decrypt {
            source,
            destination,
            copy,
            key,
        } => cmd_decrypt(&config, &source, destination.as_deref(), copy, key),
        Commands::Cat { source, key } => cmd_cat(&config, &source, key),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so `fvault cat` output stays clean
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Vault construction ────────────────────────────────────────────────────────

/// Default key: FVAULT_KEY > config `[vault] key`
fn default_key(config: &FvaultConfig) -> Result<VaultKey> {
    let encoded: SecretString = match std::env::var("FVAULT_KEY") {
        Ok(value) => SecretString::from(value),
        Err(_) => config.vault.key.clone().map(SecretString::from).context(
            "no key configured\n\
             Set FVAULT_KEY or [vault] key in the config file.\n\
             Generate one with:\n\
             \tfvault keygen",
        )?,
    };
    VaultKey::from_config_value(encoded.expose_secret()).context("decoding default key")
}

fn override_key(key: Option<String>) -> Result<Option<VaultKey>> {
    key.map(|value| {
        let encoded = SecretString::from(value);
        VaultKey::from_config_value(encoded.expose_secret()).context("decoding --key")
    })
    .transpose()
}

fn open_vault(config: &FvaultConfig) -> Result<FileVault> {
    let storage = OperatorStorage::local(&config.vault.root).context("opening vault root")?;
    let key = default_key(config)?;
    tracing::debug!(
        root = %config.vault.root.display(),
        cipher = %config.cipher.algorithm,
        chunk_size = config.cipher.chunk_size,
        "vault opened"
    );
    Ok(FileVault::with_options(
        Arc::new(storage),
        key,
        VaultOptions::from_config(config),
    ))
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn spinner_progress(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done: u64, msg: &str| pb.set_message(format!("{msg} {}", fmt_bytes(done))))
}

// ── `fvault keygen` ───────────────────────────────────────────────────────────

fn cmd_keygen() -> Result<()> {
    println!("{}", generate_key().to_config_value());
    Ok(())
}

// ── `fvault encrypt` / `fvault decrypt` ───────────────────────────────────────

fn cmd_encrypt(
    config: &FvaultConfig,
    source: &str,
    destination: Option<&str>,
    copy: bool,
    key: Option<String>,
) -> Result<()> {
    let per_call = override_key(key)?;
    let pb = make_spinner("encrypt");
    let vault = open_vault(config)?.with_progress(spinner_progress(&pb));

    let result = match (&per_call, copy) {
        (Some(k), true) => vault.key(k.clone()).encrypt_copy(source, destination),
        (Some(k), false) => vault.key(k.clone()).encrypt(source, destination),
        (None, true) => vault.encrypt_copy(source, destination),
        (None, false) => vault.encrypt(source, destination),
    };
    let report = finish(&pb, result).with_context(|| format!("encrypting {source}"))?;
    print_report(&report);
    Ok(())
}

fn cmd_decrypt(
    config: &FvaultConfig,
    source: &str,
    destination: Option<&str>,
    copy: bool,
    key: Option<String>,
) -> Result<()> {
    let per_call = override_key(key)?;
    let pb = make_spinner("decrypt");
    let vault = open_vault(config)?.with_progress(spinner_progress(&pb));

    let result = match (&per_call, copy) {
        (Some(k), true) => vault.key(k.clone()).decrypt_copy(source, destination),
        (Some(k), false) => vault.key(k.clone()).decrypt(source, destination),
        (None, true) => vault.decrypt_copy(source, destination),
        (None, false) => vault.decrypt(source, destination),
    };
    let report = finish(&pb, result).with_context(|| format!("decrypting {source}"))?;
    print_report(&report);
    Ok(())
}

fn finish<T>(pb: &ProgressBar, result: fvault_core::FvaultResult<T>) -> Result<T> {
    match result {
        Ok(value) => {
            pb.finish_with_message("done");
            Ok(value)
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            Err(e.into())
        }
    }
}

fn print_report(report: &OperationReport) {
    println!("  source:      {}", report.source);
    if let Some(dest) = &report.destination {
        println!("  destination: {dest}");
    }
    println!("  chunks:      {}", report.stats.chunks);
    println!("  plaintext:   {}", fmt_bytes(report.stats.plaintext_bytes));
    println!("  encrypted:   {}", fmt_bytes(report.stats.encrypted_bytes));
    if report.source_removed {
        println!("  source removed");
    }
}

// ── `fvault cat` ──────────────────────────────────────────────────────────────

fn cmd_cat(config: &FvaultConfig, source: &str, key: Option<String>) -> Result<()> {
    let per_call = override_key(key)?;
    let vault = open_vault(config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match per_call {
        Some(k) => vault.key(k).stream_decrypt(source, &mut out),
        None => vault.stream_decrypt(source, &mut out),
    }
    .with_context(|| format!("decrypting {source}"))?;
    out.flush().context("flushing stdout")?;
    Ok(())
}

// ── `fvault config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &FvaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
