//! Anomaly classification and report orchestration.
//!
//! Thresholds (confirmed with stakeholder):
//! - anomalous when `exec_time_ms >= slow_ms` OR
//!   (`exec_time_ms >= freq_slow_ms` AND `exec_count >= freq_count`)
//! - `avoid_select_star` when the query contains SELECT * (case-insensitive)
//! - `add_index_on_where_columns` when slow or frequent+slow
//! - `consider_caching` when `exec_count >= freq_count`

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::filter::ReportFilter;
use super::stats;
use super::{AnomalyDetail, Report, ReportSummary};
use crate::models::LogRecord;
use crate::store::{RecordSelector, RecordStore, StoreError, Thresholds};

/// Why a record was flagged anomalous. Evaluation order is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    SlowQuery,
    FrequentAndSlow,
    SelectStar,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::SlowQuery => "slow_query",
            Reason::FrequentAndSlow => "frequent_and_slow",
            Reason::SelectStar => "select_star",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended remediation, derived from reasons and raw thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Suggestion {
    AvoidSelectStar,
    AddIndexOnWhereColumns,
    ConsiderCaching,
}

impl Suggestion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suggestion::AvoidSelectStar => "avoid_select_star",
            Suggestion::AddIndexOnWhereColumns => "add_index_on_where_columns",
            Suggestion::ConsiderCaching => "consider_caching",
        }
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A store failure wrapped with the phase that hit it. Partial results are
/// discarded; the caller only ever sees a whole report or one failure.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("count total: {0}")]
    CountTotal(#[source] StoreError),
    #[error("count by database: {0}")]
    CountByDb(#[source] StoreError),
    #[error("list anomalies: {0}")]
    ListAnomalies(#[source] StoreError),
    #[error("count anomalies: {0}")]
    CountAnomalies(#[source] StoreError),
    #[error("load statistics window: {0}")]
    LoadWindow(#[source] StoreError),
}

/// Assigns reason and suggestion codes for one anomalous record. Each code
/// appears at most once, in a fixed order.
pub fn derive_reasons_and_suggestions(
    rec: &LogRecord,
    t: &Thresholds,
) -> (Vec<Reason>, Vec<Suggestion>) {
    let mut reasons = Vec::new();
    let mut suggestions = Vec::new();

    if rec.exec_time_ms >= t.slow_ms {
        reasons.push(Reason::SlowQuery);
    }
    if rec.exec_time_ms >= t.freq_slow_ms && rec.exec_count >= t.freq_count {
        reasons.push(Reason::FrequentAndSlow);
    }
    if rec.sql_query.to_lowercase().contains("select *") {
        reasons.push(Reason::SelectStar);
        suggestions.push(Suggestion::AvoidSelectStar);
    }

    if reasons.contains(&Reason::SlowQuery) || reasons.contains(&Reason::FrequentAndSlow) {
        suggestions.push(Suggestion::AddIndexOnWhereColumns);
    }
    if rec.exec_count >= t.freq_count {
        suggestions.push(Suggestion::ConsiderCaching);
    }

    (reasons, suggestions)
}

/// Runs one full analysis pass over the store and assembles the report.
///
/// The anomaly *list* is capped at the filter's limit while the anomaly
/// *count* covers the full matching set, so callers can detect truncation.
pub async fn analyze<S>(
    store: &S,
    filter: &ReportFilter,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<Report, AnalysisError>
where
    S: RecordStore + ?Sized,
{
    let f = filter.resolve(now);
    let base = RecordSelector {
        window: f.window,
        database: f.database.clone(),
        anomalous: None,
    };
    let anomalous = RecordSelector {
        anomalous: Some(f.thresholds),
        ..base.clone()
    };

    let total_queries = store
        .count_matching(&base)
        .await
        .map_err(AnalysisError::CountTotal)?;

    let by_db: BTreeMap<String, i64> = store
        .count_by_database(&base)
        .await
        .map_err(AnalysisError::CountByDb)?
        .into_iter()
        .collect();

    let sources = store
        .list_matching(&anomalous, f.limit)
        .await
        .map_err(AnalysisError::ListAnomalies)?;
    let anomaly_count = store
        .count_matching(&anomalous)
        .await
        .map_err(AnalysisError::CountAnomalies)?;

    let mut suggestion_count = 0i64;
    let anomalies: Vec<AnomalyDetail> = sources
        .iter()
        .map(|rec| {
            let (reasons, suggestions) = derive_reasons_and_suggestions(rec, &f.thresholds);
            if !suggestions.is_empty() {
                suggestion_count += 1;
            }
            AnomalyDetail {
                db_name: rec.db_name.clone(),
                sql_query: rec.sql_query.clone(),
                exec_time_ms: rec.exec_time_ms,
                exec_count: rec.exec_count,
                reasons,
                suggestions,
            }
        })
        .collect();

    // Percentiles and patterns share one window fetch; they only depend on
    // the same filtered record set, not on each other.
    let window_records = store
        .list_window(&base)
        .await
        .map_err(AnalysisError::LoadWindow)?;
    let all_refs: Vec<&LogRecord> = window_records.iter().collect();

    let percentiles_overall = stats::metric_percentiles(&all_refs, &f.fractions);
    let top_patterns_overall = stats::top_patterns(
        window_records.iter().map(|r| r.sql_query.as_str()),
        f.top_patterns,
    );

    let mut percentiles_by_db = BTreeMap::new();
    let mut top_patterns_by_db = BTreeMap::new();
    for (db, records) in stats::group_by_database(&window_records) {
        percentiles_by_db.insert(
            db.to_string(),
            stats::metric_percentiles(&records, &f.fractions),
        );
        top_patterns_by_db.insert(
            db.to_string(),
            stats::top_patterns(records.iter().map(|r| r.sql_query.as_str()), f.top_patterns),
        );
    }

    Ok(Report {
        generated_at: now.with_timezone(&tz).fixed_offset(),
        timezone: tz.name().to_string(),
        summary: ReportSummary {
            total_queries,
            anomaly_count,
            suggestion_count,
            by_db,
            from: f.window.from.with_timezone(&tz).fixed_offset(),
            to: f.window.to.with_timezone(&tz).fixed_offset(),
        },
        anomalies,
        percentiles_overall,
        percentiles_by_db,
        top_patterns_overall,
        top_patterns_by_db,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(sql: &str, exec_time_ms: i64, exec_count: i64) -> LogRecord {
        LogRecord {
            id: 1,
            db_name: "sales".into(),
            sql_query: sql.into(),
            exec_time_ms,
            exec_count,
            created_at: Utc::now(),
        }
    }

    fn defaults() -> Thresholds {
        Thresholds {
            slow_ms: 1000,
            freq_slow_ms: 500,
            freq_count: 100,
        }
    }

    #[test]
    fn test_slow_select_star_query() {
        let rec = record("SELECT * FROM orders", 1200, 5);
        let (reasons, suggestions) = derive_reasons_and_suggestions(&rec, &defaults());
        assert_eq!(reasons, vec![Reason::SlowQuery, Reason::SelectStar]);
        assert_eq!(
            suggestions,
            vec![
                Suggestion::AvoidSelectStar,
                Suggestion::AddIndexOnWhereColumns
            ]
        );
    }

    #[test]
    fn test_frequent_and_slow_gets_caching_suggestion() {
        let rec = record("SELECT id FROM t WHERE x = 1", 600, 150);
        let (reasons, suggestions) = derive_reasons_and_suggestions(&rec, &defaults());
        assert_eq!(reasons, vec![Reason::FrequentAndSlow]);
        assert_eq!(
            suggestions,
            vec![
                Suggestion::AddIndexOnWhereColumns,
                Suggestion::ConsiderCaching
            ]
        );
    }

    #[test]
    fn test_all_codes_at_most_once() {
        // Crosses every threshold at once; nothing may repeat.
        let rec = record("select * from t", 5000, 500);
        let (reasons, suggestions) = derive_reasons_and_suggestions(&rec, &defaults());
        assert_eq!(
            reasons,
            vec![
                Reason::SlowQuery,
                Reason::FrequentAndSlow,
                Reason::SelectStar
            ]
        );
        assert_eq!(
            suggestions,
            vec![
                Suggestion::AvoidSelectStar,
                Suggestion::AddIndexOnWhereColumns,
                Suggestion::ConsiderCaching
            ]
        );
    }

    #[test]
    fn test_classification_matches_or_rule() {
        let t = defaults();
        let cases = [
            (1200, 5, true),
            (999, 99, false),
            (500, 100, true),
            (499, 10_000, false),
            (1000, 0, true),
        ];
        for (time, count, expected) in cases {
            assert_eq!(
                t.matches(time, count),
                expected,
                "exec_time_ms={time} exec_count={count}"
            );
        }
    }

    #[test]
    fn test_reason_codes_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value([Reason::SlowQuery, Reason::SelectStar]).unwrap(),
            serde_json::json!(["slow_query", "select_star"])
        );
        assert_eq!(
            serde_json::to_value(Suggestion::AddIndexOnWhereColumns).unwrap(),
            serde_json::json!("add_index_on_where_columns")
        );
    }
}
