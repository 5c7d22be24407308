use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Statement,
};

use crate::entities::rate_limit_counters;

/// Counter after a hit: how many hits the current window has seen and when it opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRow {
    pub count: i64,
    pub window_start: i64,
}

const HIT_SQL: &str = "INSERT INTO rate_limit_counters (key, count, window_start) VALUES (?1, 1, ?2) \
     ON CONFLICT(key) DO UPDATE SET \
     count = CASE WHEN rate_limit_counters.window_start + ?3 <= ?2 THEN 1 ELSE rate_limit_counters.count + 1 END, \
     window_start = CASE WHEN rate_limit_counters.window_start + ?3 <= ?2 THEN ?2 ELSE rate_limit_counters.window_start END \
     RETURNING count, window_start";

pub struct RateLimitRepository {
    conn: DatabaseConnection,
}

impl RateLimitRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Increments the counter for `key`, rolling the window over first when it has
    /// elapsed. Runs as one upsert statement so concurrent hits serialize in SQLite.
    pub async fn hit(&self, key: &str, now: i64, window_seconds: i64) -> Result<CounterRow> {
        let backend = self.conn.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            HIT_SQL,
            [key.into(), now.into(), window_seconds.into()],
        );

        let row = self
            .conn
            .query_one(stmt)
            .await
            .context("Failed to record rate limit hit")?
            .ok_or_else(|| anyhow::anyhow!("Rate limit upsert returned no row"))?;

        Ok(CounterRow {
            count: row.try_get("", "count")?,
            window_start: row.try_get("", "window_start")?,
        })
    }

    pub async fn reset(&self, key: &str) -> Result<()> {
        rate_limit_counters::Entity::delete_by_id(key.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to reset rate limit counter")?;
        Ok(())
    }

    /// Removes counters under `prefix` whose window opened before `cutoff`.
    pub async fn purge_before(&self, prefix: &str, cutoff: i64) -> Result<u64> {
        let result = rate_limit_counters::Entity::delete_many()
            .filter(rate_limit_counters::Column::Key.starts_with(prefix))
            .filter(rate_limit_counters::Column::WindowStart.lt(cutoff))
            .exec(&self.conn)
            .await
            .context("Failed to purge rate limit counters")?;
        Ok(result.rows_affected)
    }
}
