//! Cache trigger service.
//!
//! Entry point the host CMS calls on cache writes and content changes. Every
//! call is a logged no-op while the integration is disabled.

use std::time::Duration;

use time::OffsetDateTime;
use tracing::debug;

use crate::domain::entries::{CacheEntry, page_tag};

use super::coordinator::{
    FlushOutcome, InvalidationCoordinator, InvalidationError, RemoveOutcome, TagFlushReport,
};
use super::origin::RequestOrigin;

/// Cache trigger for page cache writes and invalidations.
///
/// # Usage
///
/// ```ignore
/// // After a page was rendered and cached:
/// trigger.page_cached(&request_url, tags, lifetime).await?;
///
/// // After page 42 was edited:
/// trigger.page_changed(42).await?;
/// ```
pub struct CacheTrigger {
    coordinator: InvalidationCoordinator,
}

impl CacheTrigger {
    pub fn new(coordinator: InvalidationCoordinator) -> Self {
        Self { coordinator }
    }

    fn enabled(&self, operation: &'static str) -> bool {
        let enabled = self.coordinator.config().is_enabled();
        if !enabled {
            debug!(operation, "Cache trigger skipped: purge integration disabled");
        }
        enabled
    }

    /// Record a freshly rendered page under a digest of its request URL.
    pub async fn page_cached(
        &self,
        request_url: &str,
        tags: Vec<String>,
        lifetime: Duration,
    ) -> Result<Option<CacheEntry>, InvalidationError> {
        if !self.enabled("page_cached") {
            return Ok(None);
        }

        let entry = CacheEntry::for_page(request_url, tags, lifetime, OffsetDateTime::now_utc())?;
        self.coordinator.set(&entry).await?;
        Ok(Some(entry))
    }

    pub async fn remove(
        &self,
        identifier: &str,
    ) -> Result<Option<RemoveOutcome>, InvalidationError> {
        if !self.enabled("remove") {
            return Ok(None);
        }
        self.coordinator
            .remove(identifier, OffsetDateTime::now_utc())
            .await
            .map(Some)
    }

    pub async fn flush(
        &self,
        origin: Option<&RequestOrigin>,
    ) -> Result<Option<FlushOutcome>, InvalidationError> {
        if !self.enabled("flush") {
            return Ok(None);
        }
        self.coordinator.flush(origin).await.map(Some)
    }

    pub async fn flush_by_tag(
        &self,
        tag: &str,
    ) -> Result<Option<TagFlushReport>, InvalidationError> {
        if !self.enabled("flush_by_tag") {
            return Ok(None);
        }
        self.coordinator
            .flush_by_tag(tag, OffsetDateTime::now_utc())
            .await
            .map(Some)
    }

    pub async fn flush_by_tags(
        &self,
        tags: &[String],
    ) -> Result<Option<TagFlushReport>, InvalidationError> {
        if !self.enabled("flush_by_tags") {
            return Ok(None);
        }
        self.coordinator
            .flush_by_tags(tags, OffsetDateTime::now_utc())
            .await
            .map(Some)
    }

    /// Invalidate every cached page rendered from page `page_id`.
    pub async fn page_changed(
        &self,
        page_id: u64,
    ) -> Result<Option<TagFlushReport>, InvalidationError> {
        self.flush_by_tag(&page_tag(page_id)).await
    }

    /// Housekeeping runs even while purging is disabled: expired rows are
    /// dead locally either way.
    pub async fn collect_garbage(&self) -> Result<u64, InvalidationError> {
        self.coordinator
            .collect_garbage(OffsetDateTime::now_utc())
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::super::client::{PurgeClient, PurgeError};
    use super::super::config::PurgeConfig;
    use super::super::dispatcher::PurgeDispatcher;
    use super::super::store::MemoryStore;
    use super::*;
    use crate::domain::entries::page_identifier;

    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PurgeClient for CountingClient {
        async fn purge(&self, _url: &str) -> Result<(), PurgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn trigger(
        store: Arc<MemoryStore>,
        client: Arc<CountingClient>,
        config: PurgeConfig,
    ) -> CacheTrigger {
        let dispatcher = PurgeDispatcher::new(
            client,
            NonZeroUsize::new(10).expect("non-zero"),
            Duration::from_secs(1),
        );
        CacheTrigger::new(InvalidationCoordinator::new(store, dispatcher, config))
    }

    #[tokio::test]
    async fn page_cached_then_page_changed() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(CountingClient::default());
        let trigger = trigger(Arc::clone(&store), Arc::clone(&client), PurgeConfig::default());

        let entry = trigger
            .page_cached(
                "https://example.com/about",
                vec![page_tag(42)],
                Duration::from_secs(3600),
            )
            .await
            .expect("cache page")
            .expect("enabled");
        assert_eq!(entry.identifier, page_identifier("https://example.com/about"));
        assert!(store.contains(&entry.identifier));

        let report = trigger
            .page_changed(42)
            .await
            .expect("flush")
            .expect("enabled");
        assert_eq!(report.bulk_deletions, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn disabled_integration_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(CountingClient::default());
        let config = PurgeConfig {
            enabled: false,
            base_url: Some(url::Url::parse("https://example.com").expect("url")),
            ..Default::default()
        };
        let trigger = trigger(Arc::clone(&store), Arc::clone(&client), config);

        assert!(
            trigger
                .page_cached("https://example.com/", Vec::new(), Duration::from_secs(60))
                .await
                .expect("page cached")
                .is_none()
        );
        assert!(trigger.remove("abc").await.expect("remove").is_none());
        assert!(trigger.flush(None).await.expect("flush").is_none());
        assert!(trigger.flush_by_tag("x").await.expect("tag").is_none());
        assert!(
            trigger
                .flush_by_tags(&["x".to_string()])
                .await
                .expect("tags")
                .is_none()
        );
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }
}
