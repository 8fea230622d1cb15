use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod config;
mod errors;
mod ingest;
mod models;
mod report;
mod store;

use chrono::Utc;
use report::analyzer::analyze;
use report::filter::{parse_time_bound, ReportFilter};
use store::postgres::PgStore;
use store::RecordStore;

/// Shared application state passed to handlers.
pub struct AppState {
    pub db: PgStore,
    pub config: config::Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "loglens=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Ingest { file }) => run_ingest(cfg, file).await,
        Some(cli::Commands::Report {
            format,
            from,
            to,
            db,
            out,
        }) => run_report(cfg, format, from, to, db, out).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let max_upload_bytes = cfg.max_upload_bytes;
    let state = Arc::new(AppState { db, config: cfg });

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .nest("/api/v1", api::api_router())
        .with_state(state)
        .layer(axum::extract::DefaultBodyLimit::max(max_upload_bytes))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("loglens listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_ingest(cfg: config::Config, path: PathBuf) -> anyhow::Result<()> {
    let db = PgStore::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let file = tokio::fs::File::open(&path).await?;
    let reader = tokio::io::BufReader::new(file);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let mut entries = Vec::new();
    let summary = ingest::ingest_lines(
        reader,
        cfg.max_line_bytes,
        &cancel,
        |rec| entries.push(rec),
        |err| tracing::warn!("sql log parse error: {}", err),
    )
    .await?;

    let inserted = if entries.is_empty() {
        0
    } else {
        db.insert_batch(&entries).await?
    };
    tracing::info!(
        "ingested {}: {} lines, {} inserted, {} skipped",
        path.display(),
        summary.total_lines,
        inserted,
        summary.rejected
    );
    Ok(())
}

async fn run_report(
    cfg: config::Config,
    format: cli::ReportFormat,
    from: Option<String>,
    to: Option<String>,
    db: Option<String>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let store = PgStore::connect(&cfg.database_url).await?;

    let filter = ReportFilter {
        from: from
            .as_deref()
            .map(|s| parse_time_bound(s, false).map_err(anyhow::Error::msg))
            .transpose()?,
        to: to
            .as_deref()
            .map(|s| parse_time_bound(s, true).map_err(anyhow::Error::msg))
            .transpose()?,
        database: db,
        ..Default::default()
    };

    let report = analyze(&store, &filter, Utc::now(), cfg.report_timezone).await?;
    let bytes = match format {
        cli::ReportFormat::Json => report.to_json()?,
        cli::ReportFormat::Csv => report.to_csv()?,
        cli::ReportFormat::Pdf => report.to_pdf()?,
    };

    match out {
        Some(path) => {
            tokio::fs::write(&path, &bytes).await?;
            tracing::info!("report written to {}", path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&bytes)?;
        }
    }
    Ok(())
}
