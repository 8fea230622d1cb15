use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::errors::AppError;
use crate::ingest::ingest_lines;
use crate::report::analyzer::analyze;
use crate::report::filter::{parse_time_bound, ReportFilter};
use crate::report::Report;
use crate::store::{RecordStore, ABNORMAL_EXEC_COUNT, ABNORMAL_EXEC_TIME_MS};
use crate::AppState;

/// Bound on parse errors echoed back in the upload response.
const MAX_REPORTED_ERRORS: usize = 20;

// Strict DB name allowlist: 1-128 chars, letters/digits/underscore/dot/hyphen.
static DB_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,128}$").expect("db name regex"));

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub total_lines: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

#[derive(Deserialize)]
pub struct ListByDbParams {
    pub db: Option<String>,
}

#[derive(Serialize)]
pub struct ListDatabasesResponse {
    pub databases: Vec<String>,
}

#[derive(Serialize)]
pub struct LogItem {
    pub sql_query: String,
    pub exec_time_ms: i64,
    pub exec_count: i64,
}

#[derive(Serialize)]
pub struct ListByDbResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub items: Vec<LogItem>,
}

#[derive(Deserialize)]
pub struct ScanParams {
    pub limit: Option<String>,
    #[serde(rename = "dbName")]
    pub db_name: Option<String>,
    pub exec_time_ms: Option<String>,
    pub exec_count: Option<String>,
}

#[derive(Serialize)]
pub struct ScanItem {
    pub db_name: String,
    pub sql_query: String,
    pub exec_time_ms: i64,
    pub exec_count: i64,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub message: String,
    pub total: i64,
    pub items: Vec<ScanItem>,
}

/// Raw report query parameters. Number-typed knobs are kept as strings so
/// an unparsable value falls back to the default instead of failing the
/// whole request; only `from`/`to` reject bad input.
#[derive(Deserialize, Default)]
pub struct ReportParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub db: Option<String>,
    pub limit: Option<String>,
    pub cap: Option<String>,
    pub slow_ms: Option<String>,
    pub freq_slow_ms: Option<String>,
    pub freq_count: Option<String>,
    /// Comma-separated percentile fractions in [0..1].
    pub pcts: Option<String>,
    /// Patterns to return per scope.
    pub top: Option<String>,
}

impl ReportParams {
    pub fn into_filter(self) -> Result<ReportFilter, AppError> {
        let from = match self.from.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(
                parse_time_bound(s, false)
                    .map_err(|e| AppError::InvalidParameter(format!("invalid 'from': {e}")))?,
            ),
            None => None,
        };
        let to = match self.to.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(
                parse_time_bound(s, true)
                    .map_err(|e| AppError::InvalidParameter(format!("invalid 'to': {e}")))?,
            ),
            None => None,
        };

        let fractions = self
            .pcts
            .as_deref()
            .map(|s| {
                s.split(',')
                    .filter_map(|part| part.trim().parse::<f64>().ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ReportFilter {
            from,
            to,
            database: self.db,
            limit: parse_lenient(self.limit.as_deref()),
            limit_cap: parse_lenient(self.cap.as_deref()),
            slow_ms: parse_lenient(self.slow_ms.as_deref()),
            freq_slow_ms: parse_lenient(self.freq_slow_ms.as_deref()),
            freq_count: parse_lenient(self.freq_count.as_deref()),
            fractions,
            top_patterns: parse_lenient(self.top.as_deref()),
        })
    }
}

fn parse_lenient<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|s| s.trim().parse().ok())
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/v1/sql-logs/upload — parse a line-oriented log body and store
/// the valid records. Malformed lines are reported, not fatal.
pub async fn upload_sql_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, AppError> {
    if let Some(ct) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        let ct = ct.to_ascii_lowercase();
        if !(ct.starts_with("text/plain") || ct.starts_with("application/octet-stream")) {
            return Err(AppError::InvalidParameter(format!(
                "unsupported content-type: {ct}"
            )));
        }
    }

    let reader = StreamReader::new(
        body.into_data_stream()
            .map_err(|e| std::io::Error::other(e)),
    );

    let mut entries = Vec::new();
    let mut errors = Vec::new();
    let summary = ingest_lines(
        reader,
        state.config.max_line_bytes,
        &CancellationToken::new(),
        |rec| entries.push(rec),
        |err| {
            if errors.len() < MAX_REPORTED_ERRORS {
                errors.push(err.to_string());
            }
            tracing::warn!("sql log parse error: {}", err);
        },
    )
    .await?;

    let inserted = if entries.is_empty() {
        0
    } else {
        state.db.insert_batch(&entries).await?
    };

    let message = if inserted == 0 {
        "no valid records found; nothing inserted".to_string()
    } else {
        "upload processed".to_string()
    };
    Ok(Json(UploadResponse {
        message,
        total_lines: summary.total_lines,
        inserted,
        skipped: summary.rejected,
        errors,
    }))
}

/// GET /api/v1/sql-logs/databases — distinct database names with logs.
pub async fn list_databases(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListDatabasesResponse>, AppError> {
    let names = state.db.list_databases().await?;
    // Filter unsafe names to avoid propagating HTML/script-like values.
    let databases = names
        .into_iter()
        .filter_map(|n| {
            let trimmed = n.trim().to_string();
            if DB_NAME_RE.is_match(&trimmed) {
                Some(trimmed)
            } else {
                tracing::warn!("dropping unsafe db name: {:?}", n);
                None
            }
        })
        .collect();
    Ok(Json(ListDatabasesResponse { databases }))
}

/// GET /api/v1/sql-logs?db=<name> — queries for one database, newest first.
pub async fn list_by_database(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListByDbParams>,
) -> Result<Json<ListByDbResponse>, AppError> {
    let db = params
        .db
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidParameter("missing db parameter".into()))?;
    if !DB_NAME_RE.is_match(db) {
        return Err(AppError::InvalidParameter(
            "invalid db parameter; allowed [A-Za-z0-9_.-], max length 128".into(),
        ));
    }

    let rows = state.db.list_by_database(db).await?;
    let message = if rows.is_empty() {
        Some("no queries found for this database".to_string())
    } else {
        None
    };
    let items = rows
        .into_iter()
        .map(|r| LogItem {
            sql_query: r.sql_query,
            exec_time_ms: r.exec_time_ms,
            exec_count: r.exec_count,
        })
        .collect();
    Ok(Json(ListByDbResponse { message, items }))
}

/// GET /api/v1/sql-logs/scan — threshold scan for abnormal queries:
/// `exec_time_ms >= t AND exec_count >= c` (defaults: 500 ms, 100).
pub async fn scan_abnormal(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScanParams>,
) -> Result<Json<ScanResponse>, AppError> {
    let limit = match params.limit.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse::<i64>()
            .map_err(|_| AppError::InvalidParameter("invalid limit".into()))?
            .clamp(1, 1000),
        None => 100,
    };
    let min_exec_time_ms = parse_threshold(params.exec_time_ms.as_deref(), "exec_time_ms")?
        .unwrap_or(ABNORMAL_EXEC_TIME_MS);
    let min_exec_count = parse_threshold(params.exec_count.as_deref(), "exec_count")?
        .unwrap_or(ABNORMAL_EXEC_COUNT);
    let db_name = params
        .db_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let total = state
        .db
        .count_abnormal(db_name, min_exec_time_ms, min_exec_count)
        .await?;
    if total == 0 {
        return Ok(Json(ScanResponse {
            message: "No abnormal queries detected".into(),
            total: 0,
            items: vec![],
        }));
    }

    let rows = state
        .db
        .list_abnormal(db_name, min_exec_time_ms, min_exec_count, limit)
        .await?;
    let items = rows
        .into_iter()
        .map(|r| ScanItem {
            db_name: r.db_name,
            sql_query: r.sql_query,
            exec_time_ms: r.exec_time_ms,
            exec_count: r.exec_count,
            status: "abnormal",
        })
        .collect();
    Ok(Json(ScanResponse {
        message: "scan complete".into(),
        total,
        items,
    }))
}

fn parse_threshold(value: Option<&str>, name: &str) -> Result<Option<i64>, AppError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => match s.parse::<i64>() {
            Ok(n) if n >= 0 => Ok(Some(n)),
            _ => Err(AppError::InvalidParameter(format!("invalid {name}"))),
        },
        None => Ok(None),
    }
}

async fn build_report(state: &AppState, params: ReportParams) -> Result<Report, AppError> {
    let filter = params.into_filter()?;
    let report = analyze(&state.db, &filter, Utc::now(), state.config.report_timezone).await?;
    Ok(report)
}

/// GET /api/v1/sql-logs/report — aggregated anomalies and metrics within a
/// time range. Defaults: last 7 days.
pub async fn report_json(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<Json<Report>, AppError> {
    let report = build_report(&state, params).await?;
    Ok(Json(report))
}

/// GET /api/v1/sql-logs/report.csv — download the report as CSV.
pub async fn report_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let report = build_report(&state, params).await?;
    let bytes = report.to_csv()?;
    let name = download_filename(&state, "csv");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        bytes,
    ))
}

/// GET /api/v1/sql-logs/report.pdf — download the report as PDF.
pub async fn report_pdf(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let report = build_report(&state, params).await?;
    let bytes = report.to_pdf()?;
    let name = download_filename(&state, "pdf");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        bytes,
    ))
}

fn download_filename(state: &AppState, ext: &str) -> String {
    let stamp = Utc::now()
        .with_timezone(&state.config.report_timezone)
        .format("%Y%m%d-%H%M");
    format!("sql-report-{stamp}.{ext}")
}
