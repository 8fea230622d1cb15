//! Record persistence boundary.
//!
//! The analyzer and statistics engine only ever talk to [`RecordStore`];
//! what engine executes the queries is an implementation detail of the
//! store. The production implementation is [`postgres::PgStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{LogRecord, NewLogRecord};

pub mod postgres;

/// Scan defaults: minimum exec_time_ms / exec_count for a query to be
/// flagged abnormal by the threshold scan.
pub const ABNORMAL_EXEC_TIME_MS: i64 = 500;
pub const ABNORMAL_EXEC_COUNT: i64 = 100;

/// Inclusive time range bounding a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// The anomaly rule thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub slow_ms: i64,
    pub freq_slow_ms: i64,
    pub freq_count: i64,
}

impl Thresholds {
    /// `exec_time_ms >= slow_ms OR (exec_time_ms >= freq_slow_ms AND
    /// exec_count >= freq_count)`
    pub fn matches(&self, exec_time_ms: i64, exec_count: i64) -> bool {
        exec_time_ms >= self.slow_ms
            || (exec_time_ms >= self.freq_slow_ms && exec_count >= self.freq_count)
    }
}

/// Predicate bounding a read query: time window, optional exact-match
/// database filter, and optionally the anomaly rule.
#[derive(Debug, Clone)]
pub struct RecordSelector {
    pub window: TimeWindow,
    pub database: Option<String>,
    pub anomalous: Option<Thresholds>,
}

impl RecordSelector {
    pub fn matches(&self, rec: &LogRecord) -> bool {
        if rec.created_at < self.window.from || rec.created_at > self.window.to {
            return false;
        }
        if let Some(db) = &self.database {
            if &rec.db_name != db {
                return false;
            }
        }
        match &self.anomalous {
            Some(t) => t.matches(rec.exec_time_ms, rec.exec_count),
            None => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A record failed the pre-insert guard. The parser should never
    /// produce such a record; the whole batch is rejected.
    #[error("record {index} is missing required fields")]
    InvalidRecord { index: usize },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Rejects the batch if any record has an empty required field. Called by
/// every implementation before touching the backing store.
pub fn validate_batch(records: &[NewLogRecord]) -> Result<(), StoreError> {
    for (index, rec) in records.iter().enumerate() {
        if rec.db_name.is_empty() || rec.sql_query.is_empty() {
            return Err(StoreError::InvalidRecord { index });
        }
    }
    Ok(())
}

/// Narrow query surface over persisted [`LogRecord`]s.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts all records or none. Returns the number inserted.
    async fn insert_batch(&self, records: &[NewLogRecord]) -> Result<u64, StoreError>;

    /// Records for one database, newest first.
    async fn list_by_database(&self, db_name: &str) -> Result<Vec<LogRecord>, StoreError>;

    /// Distinct database names, ascending.
    async fn list_databases(&self) -> Result<Vec<String>, StoreError>;

    async fn count_matching(&self, sel: &RecordSelector) -> Result<i64, StoreError>;

    /// Matching records ordered by `exec_time_ms DESC, exec_count DESC`,
    /// capped at `limit`.
    async fn list_matching(
        &self,
        sel: &RecordSelector,
        limit: i64,
    ) -> Result<Vec<LogRecord>, StoreError>;

    /// Per-database record counts within the selector, name ascending.
    async fn count_by_database(
        &self,
        sel: &RecordSelector,
    ) -> Result<Vec<(String, i64)>, StoreError>;

    /// Every record in the selector's window, insertion order. Feeds the
    /// percentile and pattern computations.
    async fn list_window(&self, sel: &RecordSelector) -> Result<Vec<LogRecord>, StoreError>;

    /// Count of records with `exec_time_ms >= min_exec_time_ms AND
    /// exec_count >= min_exec_count`, optionally scoped to one database.
    async fn count_abnormal(
        &self,
        db_name: Option<&str>,
        min_exec_time_ms: i64,
        min_exec_count: i64,
    ) -> Result<i64, StoreError>;

    /// The abnormal records themselves, severity order, capped at `limit`.
    async fn list_abnormal(
        &self,
        db_name: Option<&str>,
        min_exec_time_ms: i64,
        min_exec_count: i64,
        limit: i64,
    ) -> Result<Vec<LogRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_or_rule() {
        let t = Thresholds {
            slow_ms: 1000,
            freq_slow_ms: 500,
            freq_count: 100,
        };
        assert!(t.matches(1000, 0));
        assert!(t.matches(1500, 1));
        assert!(t.matches(500, 100));
        assert!(!t.matches(500, 99));
        assert!(!t.matches(499, 100_000));
        assert!(!t.matches(999, 99));
    }

    #[test]
    fn test_validate_batch_rejects_empty_fields() {
        let good = NewLogRecord {
            db_name: "a".into(),
            sql_query: "SELECT 1".into(),
            exec_time_ms: 1,
            exec_count: 1,
        };
        let bad = NewLogRecord {
            db_name: String::new(),
            sql_query: "SELECT 1".into(),
            exec_time_ms: 1,
            exec_count: 1,
        };
        assert!(validate_batch(&[good.clone()]).is_ok());
        let err = validate_batch(&[good, bad]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { index: 1 }));
    }
}
