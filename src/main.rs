use anyhow::Result;
use axum::Router;
use photo_vault::config::{AppConfig, RunMode};
use photo_vault::services::delivery::{DeliveryOutcome, DeliveryService};
use photo_vault::services::export::ExportService;
use photo_vault::services::metadata_store::MetadataStore;
use photo_vault::services::object_store::{DiskObjectStore, UrlSigner};
use photo_vault::services::retrieval::{
    ProgressCounter, RetrievalConfig, RetrievalCoordinator, StoreSource,
};
use photo_vault::state::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting photo-vault with config: {:?}", cfg);

    // --- Ensure storage directories exist ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }
    if !Path::new(&cfg.export_dir).exists() {
        fs::create_dir_all(&cfg.export_dir)?;
        tracing::info!("Created export directory at {}", cfg.export_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // Create parent directory if needed
    let db_path_obj = Path::new(db_path);
    if let Some(parent) = db_path_obj.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // Try opening manually before SQLx
    match fs::OpenOptions::new().create(true).write(true).open(db_path) {
        Ok(_) => tracing::debug!("Database file can be created/opened."),
        Err(e) => tracing::warn!("Failed to open database file manually: {}", e),
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // --- Handle migration mode ---
    if matches!(mode, RunMode::Migrate) {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let signer = UrlSigner::new(&cfg.url_secret);
    let objects = Arc::new(DiskObjectStore::new(&cfg.storage_dir, signer.clone()));

    // --- Handle one-shot export mode ---
    if let RunMode::Export { ids, label } = mode {
        return run_export(&cfg, db, objects, &ids, &label).await;
    }

    // --- Build router ---
    let state = AppState::new(db, objects, signer);
    let app: Router = photo_vault::routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run a single bulk export from the command line and exit.
///
/// Ctrl-C cancels the run; in-flight fetches stop and no archive is written.
async fn run_export(
    cfg: &AppConfig,
    db: Arc<sqlx::Pool<sqlx::Sqlite>>,
    objects: Arc<DiskObjectStore>,
    ids: &[Uuid],
    label: &str,
) -> Result<()> {
    let catalog = MetadataStore::new(db);
    let retrieval = RetrievalCoordinator::new(
        Arc::new(StoreSource::new(objects)),
        RetrievalConfig {
            max_concurrent: cfg.fetch_concurrency,
            ..RetrievalConfig::default()
        },
    );
    let delivery = DeliveryService::new(None, &cfg.export_dir);
    let exporter = ExportService::new(catalog, retrieval, delivery);

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling export...");
            ctrl_c_cancel.cancel();
        }
    });

    let progress = Arc::new(ProgressCounter::new(ids.len()));
    let reporter = progress.clone();
    let report_task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let done = reporter.completed();
            tracing::info!("export progress: {}/{}", done, reporter.total());
            if done >= reporter.total() {
                break;
            }
        }
    });

    let report = exporter.export(ids, label, cancel, progress).await?;
    report_task.abort();

    match report.outcome {
        DeliveryOutcome::Archived { path, size_bytes } => {
            tracing::info!(
                "Exported {} asset(s) to {} ({} bytes)",
                report.count,
                path.display(),
                size_bytes
            );
        }
        DeliveryOutcome::HandedOff => {
            tracing::info!("Exported {} asset(s) via hand-off", report.count);
        }
        DeliveryOutcome::Dismissed => {
            tracing::info!("Export dismissed by the user");
        }
    }

    Ok(())
}

/// Run SQLite migrations manually from the embedded SQL file.
async fn run_migrations(db: &Arc<sqlx::Pool<sqlx::Sqlite>>) -> Result<()> {
    let path = "migrations/0001_init.sql";

    if !Path::new(path).exists() {
        anyhow::bail!("Migration file not found: {}", path);
    }

    let sql = fs::read_to_string(path)?;
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(&**db).await?;
    }

    Ok(())
}
