//! PostgreSQL implementation of [`RecordStore`].

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{validate_batch, RecordSelector, RecordStore, StoreError};
use crate::models::{LogRecord, NewLogRecord};

/// Rows per INSERT statement when writing a batch.
const INSERT_CHUNK: usize = 500;

const SELECT_COLS: &str =
    "SELECT id, db_name, sql_query, exec_time_ms, exec_count, created_at FROM sql_logs";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Appends the time-window predicate plus the optional database and
/// anomaly-rule predicates.
fn push_selector<'qb>(qb: &mut QueryBuilder<'qb, Postgres>, sel: &'qb RecordSelector) {
    qb.push(" WHERE created_at >= ");
    qb.push_bind(sel.window.from);
    qb.push(" AND created_at <= ");
    qb.push_bind(sel.window.to);
    if let Some(db) = &sel.database {
        qb.push(" AND db_name = ");
        qb.push_bind(db.as_str());
    }
    if let Some(t) = &sel.anomalous {
        qb.push(" AND (exec_time_ms >= ");
        qb.push_bind(t.slow_ms);
        qb.push(" OR (exec_time_ms >= ");
        qb.push_bind(t.freq_slow_ms);
        qb.push(" AND exec_count >= ");
        qb.push_bind(t.freq_count);
        qb.push("))");
    }
}

fn push_abnormal<'qb>(
    qb: &mut QueryBuilder<'qb, Postgres>,
    db_name: Option<&'qb str>,
    min_exec_time_ms: i64,
    min_exec_count: i64,
) {
    qb.push(" WHERE exec_time_ms >= ");
    qb.push_bind(min_exec_time_ms);
    qb.push(" AND exec_count >= ");
    qb.push_bind(min_exec_count);
    if let Some(db) = db_name {
        qb.push(" AND db_name = ");
        qb.push_bind(db);
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert_batch(&self, records: &[NewLogRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        validate_batch(records)?;

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for chunk in records.chunks(INSERT_CHUNK) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO sql_logs (db_name, sql_query, exec_time_ms, exec_count) ",
            );
            qb.push_values(chunk, |mut row, rec| {
                row.push_bind(rec.db_name.as_str())
                    .push_bind(rec.sql_query.as_str())
                    .push_bind(rec.exec_time_ms)
                    .push_bind(rec.exec_count);
            });
            let result = qb.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_by_database(&self, db_name: &str) -> Result<Vec<LogRecord>, StoreError> {
        let rows = sqlx::query_as::<_, LogRecord>(
            "SELECT id, db_name, sql_query, exec_time_ms, exec_count, created_at \
             FROM sql_logs WHERE db_name = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(db_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_databases(&self) -> Result<Vec<String>, StoreError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT db_name FROM sql_logs ORDER BY db_name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn count_matching(&self, sel: &RecordSelector) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sql_logs");
        push_selector(&mut qb, sel);
        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_matching(
        &self,
        sel: &RecordSelector,
        limit: i64,
    ) -> Result<Vec<LogRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLS);
        push_selector(&mut qb, sel);
        qb.push(" ORDER BY exec_time_ms DESC, exec_count DESC LIMIT ");
        qb.push_bind(limit);
        let rows = qb
            .build_query_as::<LogRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_by_database(
        &self,
        sel: &RecordSelector,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT db_name, COUNT(*) FROM sql_logs");
        push_selector(&mut qb, sel);
        qb.push(" GROUP BY db_name ORDER BY db_name ASC");
        let rows = qb
            .build_query_as::<(String, i64)>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_window(&self, sel: &RecordSelector) -> Result<Vec<LogRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLS);
        push_selector(&mut qb, sel);
        qb.push(" ORDER BY id ASC");
        let rows = qb
            .build_query_as::<LogRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_abnormal(
        &self,
        db_name: Option<&str>,
        min_exec_time_ms: i64,
        min_exec_count: i64,
    ) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sql_logs");
        push_abnormal(&mut qb, db_name, min_exec_time_ms, min_exec_count);
        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_abnormal(
        &self,
        db_name: Option<&str>,
        min_exec_time_ms: i64,
        min_exec_count: i64,
        limit: i64,
    ) -> Result<Vec<LogRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_COLS);
        push_abnormal(&mut qb, db_name, min_exec_time_ms, min_exec_count);
        qb.push(" ORDER BY exec_time_ms DESC, exec_count DESC LIMIT ");
        qb.push_bind(limit);
        let rows = qb
            .build_query_as::<LogRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
