use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;

/// Build the SQL-log API router.
/// All routes are relative — the caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sql-logs", get(handlers::list_by_database))
        .route("/sql-logs/upload", post(handlers::upload_sql_logs))
        .route("/sql-logs/databases", get(handlers::list_databases))
        .route("/sql-logs/scan", get(handlers::scan_abnormal))
        .route("/sql-logs/report", get(handlers::report_json))
        .route("/sql-logs/report.csv", get(handlers::report_csv))
        .route("/sql-logs/report.pdf", get(handlers::report_pdf))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
