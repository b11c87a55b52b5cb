use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{CacheStore, RepoError},
    domain::entries::{CacheEntry, EntryLocator},
};

use super::{PostgresCacheStore, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct LocatorRow {
    identifier: String,
    url: String,
}

impl From<LocatorRow> for EntryLocator {
    fn from(row: LocatorRow) -> Self {
        Self {
            identifier: row.identifier,
            url: row.url,
        }
    }
}

#[async_trait]
impl CacheStore for PostgresCacheStore {
    async fn get(
        &self,
        identifier: &str,
        now: OffsetDateTime,
    ) -> Result<Option<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            "SELECT url FROM cache_entries WHERE identifier = $1 AND expires_at >= $2",
        )
        .bind(identifier)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn set(&self, entry: &CacheEntry) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO cache_entries (identifier, url, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (identifier) DO UPDATE \
             SET url = EXCLUDED.url, expires_at = EXCLUDED.expires_at",
        )
        .bind(&entry.identifier)
        .bind(&entry.locator)
        .bind(entry.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM cache_tags WHERE identifier = $1")
            .bind(&entry.identifier)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if !entry.tags.is_empty() {
            let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO cache_tags (identifier, tag) ");
            qb.push_values(entry.tags.iter(), |mut row, tag| {
                row.push_bind(&entry.identifier).push_bind(tag);
            });
            // A concurrent render of the same page may have written the row.
            qb.push(" ON CONFLICT (identifier, tag) DO NOTHING");
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn remove(&self, identifier: &str) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE identifier = $1")
            .bind(identifier)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn flush_all(&self) -> Result<(), RepoError> {
        sqlx::query("TRUNCATE cache_tags, cache_entries")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn flush_by_tag(&self, tag: &str, identifiers: &[String]) -> Result<u64, RepoError> {
        if identifiers.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM cache_entries \
             WHERE identifier = ANY($2) \
               AND identifier IN (SELECT identifier FROM cache_tags WHERE tag = $1)",
        )
        .bind(tag)
        .bind(identifiers)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn flush_by_tags(
        &self,
        tags: &[String],
        identifiers: &[String],
    ) -> Result<u64, RepoError> {
        if tags.is_empty() || identifiers.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM cache_entries \
             WHERE identifier = ANY($2) \
               AND identifier IN (SELECT identifier FROM cache_tags WHERE tag = ANY($1))",
        )
        .bind(tags)
        .bind(identifiers)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn find_by_tags(
        &self,
        tags: &[String],
        now: OffsetDateTime,
    ) -> Result<Vec<EntryLocator>, RepoError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, LocatorRow>(
            "SELECT e.identifier, e.url \
             FROM cache_entries e \
             INNER JOIN cache_tags t ON t.identifier = e.identifier \
             WHERE t.tag = ANY($1) AND e.expires_at >= $2 \
             GROUP BY e.identifier, e.url \
             ORDER BY e.identifier",
        )
        .bind(tags)
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EntryLocator::from).collect())
    }

    async fn collect_garbage(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at < $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
