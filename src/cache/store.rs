//! In-memory local store.
//!
//! Holds entries and their tag index behind a single lock so that a tag
//! lookup never observes an entry without its tags or the reverse.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CacheStore, RepoError};
use crate::domain::entries::{CacheEntry, EntryLocator};

use super::lock::{rw_read, rw_write};
use super::registry::TagIndex;

const SOURCE: &str = "cache::store";

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    tags: TagIndex,
}

impl Inner {
    fn remove(&mut self, identifier: &str) -> bool {
        self.tags.unregister(identifier);
        self.entries.remove(identifier).is_some()
    }

    fn remove_tagged(&mut self, tags: &[String], identifiers: &[String]) -> u64 {
        let tagged = self.tags.identifiers_for_tags(tags);
        identifiers
            .iter()
            .filter(|identifier| tagged.contains(identifier.as_str()))
            .filter(|identifier| self.remove(identifier))
            .count() as u64
    }
}

/// [`CacheStore`] kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, identifier: &str) -> bool {
        rw_read(&self.inner, SOURCE, "contains")
            .entries
            .contains_key(identifier)
    }

    /// All stored identifiers, expired ones included, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = rw_read(&self.inner, SOURCE, "identifiers")
            .entries
            .keys()
            .cloned()
            .collect();
        identifiers.sort();
        identifiers
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(
        &self,
        identifier: &str,
        now: OffsetDateTime,
    ) -> Result<Option<String>, RepoError> {
        let inner = rw_read(&self.inner, SOURCE, "get");
        Ok(inner
            .entries
            .get(identifier)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.locator.clone()))
    }

    async fn set(&self, entry: &CacheEntry) -> Result<(), RepoError> {
        let mut inner = rw_write(&self.inner, SOURCE, "set");
        inner.tags.register(&entry.identifier, &entry.tags);
        inner
            .entries
            .insert(entry.identifier.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, identifier: &str) -> Result<bool, RepoError> {
        Ok(rw_write(&self.inner, SOURCE, "remove").remove(identifier))
    }

    async fn flush_all(&self) -> Result<(), RepoError> {
        let mut inner = rw_write(&self.inner, SOURCE, "flush_all");
        inner.entries.clear();
        inner.tags.clear();
        Ok(())
    }

    async fn flush_by_tag(&self, tag: &str, identifiers: &[String]) -> Result<u64, RepoError> {
        Ok(rw_write(&self.inner, SOURCE, "flush_by_tag")
            .remove_tagged(&[tag.to_string()], identifiers))
    }

    async fn flush_by_tags(
        &self,
        tags: &[String],
        identifiers: &[String],
    ) -> Result<u64, RepoError> {
        Ok(rw_write(&self.inner, SOURCE, "flush_by_tags").remove_tagged(tags, identifiers))
    }

    async fn find_by_tags(
        &self,
        tags: &[String],
        now: OffsetDateTime,
    ) -> Result<Vec<EntryLocator>, RepoError> {
        let inner = rw_read(&self.inner, SOURCE, "find_by_tags");
        Ok(inner
            .tags
            .identifiers_for_tags(tags)
            .iter()
            .filter_map(|identifier| inner.entries.get(identifier))
            .filter(|entry| !entry.is_expired(now))
            .map(CacheEntry::locator)
            .collect())
    }

    async fn collect_garbage(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut inner = rw_write(&self.inner, SOURCE, "collect_garbage");
        let expired: Vec<String> = inner
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.identifier.clone())
            .collect();
        for identifier in &expired {
            inner.remove(identifier);
        }
        Ok(expired.len() as u64)
    }
}
