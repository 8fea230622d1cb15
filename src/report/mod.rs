//! Report payload assembly and export.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod analyzer;
pub mod csv;
pub mod filter;
pub mod pdf;
pub mod stats;

use analyzer::{Reason, Suggestion};
use stats::{PatternStat, Percentiles};

/// High-level metrics for one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub total_queries: i64,
    /// Full count of matching anomalies, independent of the list cap.
    pub anomaly_count: i64,
    /// How many returned anomalies carry at least one suggestion.
    pub suggestion_count: i64,
    pub by_db: BTreeMap<String, i64>,
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
}

/// One anomalous query with the codes explaining the classification.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyDetail {
    pub db_name: String,
    pub sql_query: String,
    pub exec_time_ms: i64,
    pub exec_count: i64,
    pub reasons: Vec<Reason>,
    pub suggestions: Vec<Suggestion>,
}

/// The complete report payload behind the JSON/CSV/PDF exports.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<FixedOffset>,
    pub timezone: String,
    pub summary: ReportSummary,
    pub anomalies: Vec<AnomalyDetail>,
    pub percentiles_overall: Percentiles,
    pub percentiles_by_db: BTreeMap<String, Percentiles>,
    pub top_patterns_overall: Vec<PatternStat>,
    pub top_patterns_by_db: BTreeMap<String, Vec<PatternStat>>,
}

/// Serialization failures, distinct from analysis failures so callers can
/// tell "could not compute" from "could not render".
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv write: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("csv write: {0}")]
    Io(#[from] std::io::Error),
    #[error("pdf render: {0}")]
    Pdf(String),
    #[error("json encode: {0}")]
    Json(#[from] serde_json::Error),
}

impl Report {
    pub fn to_json(&self) -> Result<Vec<u8>, ExportError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, ExportError> {
        csv::render(self)
    }

    pub fn to_pdf(&self) -> Result<Vec<u8>, ExportError> {
        pdf::render(self)
    }
}
