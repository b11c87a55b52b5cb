#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use purgelink::application::repos::{CacheStore, RepoError};
use purgelink::cache::{
    InvalidationCoordinator, MemoryStore, PurgeClient, PurgeConfig, PurgeDispatcher, PurgeError,
    classify_status,
};
use purgelink::domain::entries::{CacheEntry, EntryLocator};
use time::OffsetDateTime;
use time::macros::datetime;

pub const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);
pub const FAR_FUTURE: OffsetDateTime = datetime!(2030-01-01 0:00 UTC);

/// Purge client answering each URL with a scripted status (200 otherwise)
/// and recording every URL it was asked to purge.
#[derive(Default)]
pub struct ScriptedClient {
    statuses: HashMap<String, u16>,
    purged: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.purged.lock().expect("purge log lock").clone()
    }
}

#[async_trait]
impl PurgeClient for ScriptedClient {
    async fn purge(&self, url: &str) -> Result<(), PurgeError> {
        self.purged.lock().expect("purge log lock").push(url.to_string());
        classify_status(self.statuses.get(url).copied().unwrap_or(200))
    }
}

/// Wraps a [`MemoryStore`] and counts the mutating calls made against it.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub removes: AtomicUsize,
    pub flush_all_calls: AtomicUsize,
    pub flush_by_tag_calls: AtomicUsize,
    pub flush_by_tags_calls: Mutex<Vec<Vec<String>>>,
    pub find_by_tags_calls: Mutex<Vec<usize>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, identifier: &str, url: &str, tags: &[&str]) {
        let entry = CacheEntry::new(
            identifier,
            url,
            tags.iter().map(|tag| tag.to_string()),
            FAR_FUTURE,
        )
        .expect("valid entry");
        self.inner.set(&entry).await.expect("seed entry");
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn flush_all_calls(&self) -> usize {
        self.flush_all_calls.load(Ordering::SeqCst)
    }

    pub fn flush_by_tag_calls(&self) -> usize {
        self.flush_by_tag_calls.load(Ordering::SeqCst)
    }

    pub fn flush_by_tags_calls(&self) -> Vec<Vec<String>> {
        self.flush_by_tags_calls.lock().expect("call log lock").clone()
    }

    pub fn find_by_tags_calls(&self) -> Vec<usize> {
        self.find_by_tags_calls.lock().expect("call log lock").clone()
    }

    pub fn bulk_deletes(&self) -> usize {
        self.flush_by_tag_calls() + self.flush_by_tags_calls().len()
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn get(
        &self,
        identifier: &str,
        now: OffsetDateTime,
    ) -> Result<Option<String>, RepoError> {
        self.inner.get(identifier, now).await
    }

    async fn set(&self, entry: &CacheEntry) -> Result<(), RepoError> {
        self.inner.set(entry).await
    }

    async fn remove(&self, identifier: &str) -> Result<bool, RepoError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(identifier).await
    }

    async fn flush_all(&self) -> Result<(), RepoError> {
        self.flush_all_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.flush_all().await
    }

    async fn flush_by_tag(&self, tag: &str, identifiers: &[String]) -> Result<u64, RepoError> {
        self.flush_by_tag_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.flush_by_tag(tag, identifiers).await
    }

    async fn flush_by_tags(
        &self,
        tags: &[String],
        identifiers: &[String],
    ) -> Result<u64, RepoError> {
        self.flush_by_tags_calls
            .lock()
            .expect("call log lock")
            .push(tags.to_vec());
        self.inner.flush_by_tags(tags, identifiers).await
    }

    async fn find_by_tags(
        &self,
        tags: &[String],
        now: OffsetDateTime,
    ) -> Result<Vec<EntryLocator>, RepoError> {
        self.find_by_tags_calls
            .lock()
            .expect("call log lock")
            .push(tags.len());
        self.inner.find_by_tags(tags, now).await
    }

    async fn collect_garbage(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        self.inner.collect_garbage(now).await
    }
}

/// Store whose every call fails, for error propagation tests.
pub struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _: &str, _: OffsetDateTime) -> Result<Option<String>, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn set(&self, _: &CacheEntry) -> Result<(), RepoError> {
        Err(RepoError::Timeout)
    }

    async fn remove(&self, _: &str) -> Result<bool, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn flush_all(&self) -> Result<(), RepoError> {
        Err(RepoError::Timeout)
    }

    async fn flush_by_tag(&self, _: &str, _: &[String]) -> Result<u64, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn flush_by_tags(&self, _: &[String], _: &[String]) -> Result<u64, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn find_by_tags(
        &self,
        _: &[String],
        _: OffsetDateTime,
    ) -> Result<Vec<EntryLocator>, RepoError> {
        Err(RepoError::from_persistence("connection reset"))
    }

    async fn collect_garbage(&self, _: OffsetDateTime) -> Result<u64, RepoError> {
        Err(RepoError::Timeout)
    }
}

pub fn coordinator(
    store: Arc<dyn CacheStore>,
    client: Arc<ScriptedClient>,
    config: PurgeConfig,
) -> InvalidationCoordinator {
    let dispatcher = PurgeDispatcher::new(
        client,
        NonZeroUsize::new(10).expect("non-zero"),
        Duration::from_secs(5),
    );
    InvalidationCoordinator::new(store, dispatcher, config)
}

/// Memory store whose tag lookups start failing from the `fail_from`-th call
/// (1-based). Everything else goes straight to the inner store.
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_from: usize,
    finds: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_from(fail_from: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_from,
            finds: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(
        &self,
        identifier: &str,
        now: OffsetDateTime,
    ) -> Result<Option<String>, RepoError> {
        self.inner.get(identifier, now).await
    }

    async fn set(&self, entry: &CacheEntry) -> Result<(), RepoError> {
        self.inner.set(entry).await
    }

    async fn remove(&self, identifier: &str) -> Result<bool, RepoError> {
        self.inner.remove(identifier).await
    }

    async fn flush_all(&self) -> Result<(), RepoError> {
        self.inner.flush_all().await
    }

    async fn flush_by_tag(&self, tag: &str, identifiers: &[String]) -> Result<u64, RepoError> {
        self.inner.flush_by_tag(tag, identifiers).await
    }

    async fn flush_by_tags(
        &self,
        tags: &[String],
        identifiers: &[String],
    ) -> Result<u64, RepoError> {
        self.inner.flush_by_tags(tags, identifiers).await
    }

    async fn find_by_tags(
        &self,
        tags: &[String],
        now: OffsetDateTime,
    ) -> Result<Vec<EntryLocator>, RepoError> {
        let call = self.finds.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_from {
            return Err(RepoError::Timeout);
        }
        self.inner.find_by_tags(tags, now).await
    }

    async fn collect_garbage(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        self.inner.collect_garbage(now).await
    }
}
