//! Persistence seam for the local page cache.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entries::{CacheEntry, EntryLocator};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Local half of the page cache: cache rows plus a tag index.
///
/// Implementations only store and delete. Deciding *when* a row may be
/// deleted is the invalidation coordinator's job.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Remote locator of a non-expired entry, or `None`.
    async fn get(&self, identifier: &str, now: OffsetDateTime)
    -> Result<Option<String>, RepoError>;

    /// Insert or replace an entry together with its tags.
    async fn set(&self, entry: &CacheEntry) -> Result<(), RepoError>;

    /// Delete one entry. Returns whether a row was removed.
    async fn remove(&self, identifier: &str) -> Result<bool, RepoError>;

    async fn flush_all(&self) -> Result<(), RepoError>;

    /// Delete those of `identifiers` that still carry `tag`, in one
    /// statement. Returns how many went.
    async fn flush_by_tag(&self, tag: &str, identifiers: &[String]) -> Result<u64, RepoError>;

    /// Delete those of `identifiers` that still carry any of `tags`.
    async fn flush_by_tags(
        &self,
        tags: &[String],
        identifiers: &[String],
    ) -> Result<u64, RepoError>;

    /// Non-expired entries carrying any of `tags`, one row per identifier.
    async fn find_by_tags(
        &self,
        tags: &[String],
        now: OffsetDateTime,
    ) -> Result<Vec<EntryLocator>, RepoError>;

    /// Delete entries that expired before `now`. Returns how many went.
    async fn collect_garbage(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}
