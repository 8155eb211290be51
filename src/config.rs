use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub export_dir: String,
    pub url_secret: String,
    /// Bound on concurrent export fetches; unlimited when unset.
    pub fetch_concurrency: Option<usize>,
}

/// What the process should do after configuration is parsed.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Run the HTTP service.
    Serve,
    /// Apply migrations and exit.
    Migrate,
    /// Run one bulk export and exit.
    Export { ids: Vec<Uuid>, label: String },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Photo asset lifecycle service")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_VAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_VAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides PHOTO_VAULT_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PHOTO_VAULT_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory export archives are written to (overrides PHOTO_VAULT_EXPORT_DIR)
    #[arg(long)]
    pub export_dir: Option<String>,

    /// Secret used to sign read URLs (overrides PHOTO_VAULT_URL_SECRET)
    #[arg(long)]
    pub url_secret: Option<String>,

    /// Maximum concurrent export fetches (overrides PHOTO_VAULT_FETCH_CONCURRENCY)
    #[arg(long)]
    pub fetch_concurrency: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Export the given comma-separated asset ids and exit
    #[arg(long)]
    pub export: Option<String>,

    /// Label for the export archive (used with --export)
    #[arg(long, default_value = "export")]
    pub label: String,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and a run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("PHOTO_VAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("PHOTO_VAULT_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PHOTO_VAULT_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading PHOTO_VAULT_PORT"),
        };
        let env_storage =
            env::var("PHOTO_VAULT_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("PHOTO_VAULT_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/photo_vault.db".into());
        let env_export =
            env::var("PHOTO_VAULT_EXPORT_DIR").unwrap_or_else(|_| "./data/exports".into());
        let env_secret =
            env::var("PHOTO_VAULT_URL_SECRET").unwrap_or_else(|_| "dev-only-secret".into());
        let env_concurrency = match env::var("PHOTO_VAULT_FETCH_CONCURRENCY") {
            Ok(value) => Some(value.parse::<usize>().with_context(|| {
                format!("parsing PHOTO_VAULT_FETCH_CONCURRENCY value `{}`", value)
            })?),
            Err(env::VarError::NotPresent) => None,
            Err(err) => return Err(err).context("reading PHOTO_VAULT_FETCH_CONCURRENCY"),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            export_dir: args.export_dir.unwrap_or(env_export),
            url_secret: args.url_secret.unwrap_or(env_secret),
            fetch_concurrency: args.fetch_concurrency.or(env_concurrency),
        };

        let mode = if args.migrate {
            RunMode::Migrate
        } else if let Some(raw) = args.export {
            let ids = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Uuid::parse_str(s).with_context(|| format!("parsing asset id `{}`", s)))
                .collect::<Result<Vec<_>>>()?;
            anyhow::ensure!(!ids.is_empty(), "--export requires at least one asset id");
            RunMode::Export {
                ids,
                label: args.label,
            }
        } else {
            RunMode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
