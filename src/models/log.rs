use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted SQL execution event.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogRecord {
    pub id: i64,
    pub db_name: String,
    pub sql_query: String,
    pub exec_time_ms: i64,
    pub exec_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A parsed record that has not been inserted yet. `id` and `created_at`
/// are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogRecord {
    pub db_name: String,
    pub sql_query: String,
    pub exec_time_ms: i64,
    pub exec_count: i64,
}
