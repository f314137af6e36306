//! PostgreSQL-backed task source and outcome store.
//!
//! The collaborator traits are blocking, so every call is driven to
//! completion on the runtime captured at construction time. Call them from
//! plain OS threads (the worker pool), never from inside the runtime.

use std::future::Future;

use chrono::{DateTime, Utc};
use harvest_core::config::PostgresConfig;
use harvest_core::{
    CloneOutcome, CloneRecord, OutcomeStore, RepoMetrics, SourceError, StoreError, TaskSource,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Never-attempted links, failures past their backoff, then stale successes.
/// A link in several classes keeps its lowest rank. The exponent is clamped
/// so very old rows cannot underflow.
const RANKED_LINKS_SQL: &str = "
SELECT git_link FROM (
    SELECT git_link, 0::float8 AS nice FROM (
        SELECT git_link FROM all_gitlinks
        EXCEPT SELECT git_link FROM git_files
    ) fresh
    UNION ALL
    SELECT git_link,
           (1 + EXP(GREATEST(EXTRACT(EPOCH FROM (update_time - now())) / 3600, -600)))::float8 AS nice
    FROM git_files
    WHERE success = false
      AND update_time < now() - LEAST(POW(2, failed_times), 60) * INTERVAL '1 day'
    UNION ALL
    SELECT git_link,
           (2 + EXP(GREATEST(EXTRACT(EPOCH FROM (update_time - now())) / 86400, -600)))::float8 AS nice
    FROM git_files
    WHERE update_time < now() - INTERVAL '30 days'
) ranked
GROUP BY git_link
ORDER BY MIN(nice), git_link
LIMIT $1";

const UPSERT_SUCCESS_SQL: &str = "
INSERT INTO git_files (git_link, file_path, success, message, update_time, failed_times, last_success, take_time_ms, take_storage)
VALUES ($1, $2, true, $3, $4, 0, $4, $5, $6)
ON CONFLICT (git_link) DO UPDATE SET
    file_path = $2, success = true, message = $3, update_time = $4,
    failed_times = 0, last_success = $4, take_time_ms = $5,
    take_storage = COALESCE($6, git_files.take_storage)";

const UPSERT_FAILURE_SQL: &str = "
INSERT INTO git_files (git_link, file_path, success, message, update_time, failed_times, last_success, take_time_ms)
VALUES ($1, $2, false, $3, $4, 1, NULL, $5)
ON CONFLICT (git_link) DO UPDATE SET
    file_path = $2, success = false, message = $3, update_time = $4,
    failed_times = git_files.failed_times + 1, take_time_ms = $5";

#[derive(Debug, sqlx::FromRow)]
struct GitFileRow {
    git_link: String,
    file_path: Option<String>,
    success: bool,
    message: Option<String>,
    update_time: Option<DateTime<Utc>>,
    failed_times: i32,
    last_success: Option<DateTime<Utc>>,
    take_time_ms: Option<i64>,
    take_storage: Option<i64>,
}

impl From<GitFileRow> for CloneRecord {
    fn from(row: GitFileRow) -> Self {
        CloneRecord {
            link: row.git_link,
            file_path: row.file_path,
            success: row.success,
            message: row.message,
            update_time: row.update_time,
            failed_times: row.failed_times,
            last_success: row.last_success,
            take_time_ms: row.take_time_ms,
            take_storage: row.take_storage,
        }
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Store over a `PgPool`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    handle: Handle,
}

impl PgStore {
    /// Connect using `config`. Must be called inside a tokio runtime; that
    /// runtime then drives all blocking calls.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await
            .map_err(db_error)?;
        info!(host = %config.host, database = %config.database, "PostgreSQL connected");
        Ok(Self::from_pool(pool, Handle::current()))
    }

    pub fn from_pool(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        info!("database migrations applied");
        Ok(())
    }

    /// Register links as candidates; existing links are left untouched.
    pub async fn add_links(&self, links: &[String]) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO all_gitlinks (git_link)
             SELECT * FROM UNNEST($1::text[])
             ON CONFLICT (git_link) DO NOTHING",
        )
        .bind(links)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    pub async fn ranked_links(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let links = sqlx::query_scalar::<_, String>(RANKED_LINKS_SQL)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        debug!(returned = links.len(), "ranked links fetched");
        Ok(links)
    }

    pub async fn get_clone_record(&self, link: &str) -> Result<Option<CloneRecord>, StoreError> {
        let row = sqlx::query_as::<_, GitFileRow>(
            "SELECT git_link, file_path, success, message, update_time, failed_times,
                    last_success, take_time_ms, take_storage
             FROM git_files WHERE git_link = $1",
        )
        .bind(link)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(CloneRecord::from))
    }

    pub async fn upsert_clone(&self, outcome: &CloneOutcome) -> Result<(), StoreError> {
        let query = if outcome.success {
            sqlx::query(UPSERT_SUCCESS_SQL)
                .bind(&outcome.link)
                .bind(&outcome.file_path)
                .bind(&outcome.message)
                .bind(outcome.update_time)
                .bind(outcome.take_time_ms)
                .bind(outcome.take_storage)
        } else {
            sqlx::query(UPSERT_FAILURE_SQL)
                .bind(&outcome.link)
                .bind(&outcome.file_path)
                .bind(&outcome.message)
                .bind(outcome.update_time)
                .bind(outcome.take_time_ms)
        };
        query.execute(&self.pool).await.map_err(db_error)?;
        Ok(())
    }

    pub async fn insert_metrics(&self, metrics: &RepoMetrics) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO git_metrics (git_link, created_since, updated_since, contributor_count,
                                      commit_frequency, org_count, language, clone_valid, update_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7, true, now())",
        )
        .bind(&metrics.link)
        .bind(metrics.created_since)
        .bind(metrics.updated_since)
        .bind(metrics.contributor_count)
        .bind(metrics.commit_frequency)
        .bind(metrics.org_count)
        .bind(&metrics.languages)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }
}

impl TaskSource for PgStore {
    fn query(&self, limit: usize) -> Result<Vec<String>, SourceError> {
        self.block_on(self.ranked_links(limit))
            .map_err(|e| SourceError::Query(e.to_string()))
    }
}

impl OutcomeStore for PgStore {
    fn clone_record(&self, link: &str) -> Result<Option<CloneRecord>, StoreError> {
        self.block_on(self.get_clone_record(link))
    }

    fn record_clone(&self, outcome: &CloneOutcome) -> Result<(), StoreError> {
        self.block_on(self.upsert_clone(outcome))
    }

    fn record_metrics(&self, metrics: &RepoMetrics) -> Result<(), StoreError> {
        self.block_on(self.insert_metrics(metrics))
    }
}
