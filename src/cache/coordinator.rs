//! Dual-store invalidation.
//!
//! Every operation first purges the proxy and only then touches the local
//! store, and only for entries whose purge was confirmed. An entry whose
//! purge failed keeps its local record so the next invalidation retries it.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{CacheStore, RepoError};
use crate::domain::entries::{CacheEntry, EntryLocator};
use crate::domain::error::DomainError;

use super::batch::{PurgeBatch, PurgeOutcome, PurgeSummary};
use super::config::PurgeConfig;
use super::dispatcher::PurgeDispatcher;
use super::origin::{RequestOrigin, resolve_base_url};

pub(crate) const METRIC_LOCAL_DELETIONS_TOTAL: &str = "purgelink_local_deletions_total";
pub(crate) const METRIC_ENTRIES_RETAINED_TOTAL: &str = "purgelink_entries_retained_total";

#[derive(Debug, Error)]
pub enum InvalidationError {
    #[error(transparent)]
    Store(#[from] RepoError),
    #[error(transparent)]
    Invalid(#[from] DomainError),
    /// A later chunk of a tag flush failed. `completed` describes what the
    /// earlier chunks already purged and deleted.
    #[error("tag flush stopped in chunk {}: {source}", .completed.chunks)]
    TagFlushInterrupted {
        completed: Box<TagFlushReport>,
        source: Box<InvalidationError>,
    },
}

/// Result of removing a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoveOutcome {
    /// No live entry under the identifier; nothing was purged.
    NothingRemoved,
    Removed { url: String },
    /// The proxy rejected the purge; the local record was kept.
    PurgeFailed { url: String, error: String },
}

/// Result of a site-wide flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// No base URL could be resolved; neither store was touched.
    Skipped,
    Flushed { url: String },
    PurgeFailed { url: String, error: String },
}

/// Aggregate result of a tag flush across all of its chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagFlushReport {
    pub chunks: usize,
    pub matched: usize,
    pub removed: usize,
    pub bulk_deletions: usize,
    pub retained: Vec<String>,
    pub purges: Vec<PurgeSummary>,
}

impl TagFlushReport {
    pub fn is_complete(&self) -> bool {
        self.retained.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum TagScope<'a> {
    Single(&'a str),
    Many(&'a [String]),
}

impl TagScope<'_> {
    fn tags(&self) -> Vec<String> {
        match self {
            Self::Single(tag) => vec![(*tag).to_string()],
            Self::Many(tags) => tags.to_vec(),
        }
    }
}

/// Coordinates proxy purges with local store mutations.
///
/// Holds no state between calls: each operation collects candidates,
/// dispatches one batch per chunk, and reconciles that batch before
/// returning.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    store: Arc<dyn CacheStore>,
    dispatcher: PurgeDispatcher,
    config: PurgeConfig,
}

impl InvalidationCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, dispatcher: PurgeDispatcher, config: PurgeConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }

    /// Write path: store an entry as-is. No purge is involved.
    #[instrument(skip_all, fields(identifier = %entry.identifier))]
    pub async fn set(&self, entry: &CacheEntry) -> Result<(), InvalidationError> {
        self.store.set(entry).await?;
        debug!(tags = entry.tags.len(), "Cache entry stored");
        Ok(())
    }

    /// Purge the proxy copy of one entry and drop the local record if that
    /// worked.
    #[instrument(skip(self, now))]
    pub async fn remove(
        &self,
        identifier: &str,
        now: OffsetDateTime,
    ) -> Result<RemoveOutcome, InvalidationError> {
        let Some(url) = self.store.get(identifier, now).await? else {
            debug!("No live entry; nothing to remove");
            return Ok(RemoveOutcome::NothingRemoved);
        };

        let batch = PurgeBatch::from_locators([EntryLocator {
            identifier: identifier.to_string(),
            url: url.clone(),
        }]);
        let report = self.dispatcher.dispatch(batch).await;
        let outcome = report.outcomes().next().cloned();

        match outcome {
            Some(PurgeOutcome::Purged) => {
                self.store.remove(identifier).await?;
                counter!(METRIC_LOCAL_DELETIONS_TOTAL, "mode" => "entry").increment(1);
                info!(url = %url, "Cache entry removed");
                Ok(RemoveOutcome::Removed { url })
            }
            Some(PurgeOutcome::Failed(err)) => {
                counter!(METRIC_ENTRIES_RETAINED_TOTAL).increment(1);
                warn!(url = %url, "Purge failed; keeping local entry");
                Ok(RemoveOutcome::PurgeFailed {
                    url,
                    error: err.to_string(),
                })
            }
            _ => {
                counter!(METRIC_ENTRIES_RETAINED_TOTAL).increment(1);
                Ok(RemoveOutcome::PurgeFailed {
                    url,
                    error: "purge did not complete".to_string(),
                })
            }
        }
    }

    /// Purge `<base>/*` at the proxy and empty the local store if that
    /// worked.
    ///
    /// Without a resolvable base URL the flush is skipped on both sides.
    #[instrument(skip_all)]
    pub async fn flush(
        &self,
        origin: Option<&RequestOrigin>,
    ) -> Result<FlushOutcome, InvalidationError> {
        let Some(base_url) = resolve_base_url(self.config.configured_base_url(), origin) else {
            debug!("No base url resolved; skipping flush");
            return Ok(FlushOutcome::Skipped);
        };

        let batch = PurgeBatch::wildcard(&base_url);
        let report = self.dispatcher.dispatch(batch).await;
        let Some(request) = report.requests.first() else {
            return Ok(FlushOutcome::Skipped);
        };
        let url = request.url.clone();

        match &request.outcome {
            PurgeOutcome::Purged => {
                self.store.flush_all().await?;
                counter!(METRIC_LOCAL_DELETIONS_TOTAL, "mode" => "flush").increment(1);
                info!(url = %url, "Cache flushed");
                Ok(FlushOutcome::Flushed { url })
            }
            PurgeOutcome::Failed(err) => {
                warn!(url = %url, "Wildcard purge failed; keeping local cache");
                Ok(FlushOutcome::PurgeFailed {
                    url,
                    error: err.to_string(),
                })
            }
            PurgeOutcome::Pending => Ok(FlushOutcome::PurgeFailed {
                url,
                error: "purge did not complete".to_string(),
            }),
        }
    }

    /// Invalidate every live entry carrying `tag`.
    #[instrument(skip(self, now))]
    pub async fn flush_by_tag(
        &self,
        tag: &str,
        now: OffsetDateTime,
    ) -> Result<TagFlushReport, InvalidationError> {
        let mut report = TagFlushReport::default();
        if tag.is_empty() {
            debug!("Empty tag; nothing to flush");
            return Ok(report);
        }

        self.flush_tag_chunk(TagScope::Single(tag), now, &mut report)
            .await?;
        Ok(report)
    }

    /// Invalidate every live entry carrying any of `tags`.
    ///
    /// Tags are processed in chunks of the configured size, one after the
    /// other. A failure in one chunk does not affect the others.
    #[instrument(skip_all, fields(tag_count = tags.len()))]
    pub async fn flush_by_tags(
        &self,
        tags: &[String],
        now: OffsetDateTime,
    ) -> Result<TagFlushReport, InvalidationError> {
        let mut report = TagFlushReport::default();
        if tags.is_empty() {
            debug!("No tags; nothing to flush");
            return Ok(report);
        }

        for chunk in tags.chunks(self.config.chunk_size.get()) {
            if let Err(err) = self
                .flush_tag_chunk(TagScope::Many(chunk), now, &mut report)
                .await
            {
                if report.chunks == 1 {
                    return Err(err);
                }
                warn!(
                    chunk = report.chunks,
                    removed = report.removed,
                    retained = report.retained.len(),
                    error = %err,
                    "Tag flush stopped; earlier chunks already applied"
                );
                return Err(InvalidationError::TagFlushInterrupted {
                    completed: Box::new(report),
                    source: Box::new(err),
                });
            }
        }

        info!(
            chunks = report.chunks,
            matched = report.matched,
            removed = report.removed,
            retained = report.retained.len(),
            "Tag flush complete"
        );
        Ok(report)
    }

    /// Drop entries that expired before `now`. The proxy is not contacted:
    /// its copies expire on the same lifetime.
    #[instrument(skip(self))]
    pub async fn collect_garbage(&self, now: OffsetDateTime) -> Result<u64, InvalidationError> {
        let removed = self.store.collect_garbage(now).await?;
        info!(removed, "Expired cache entries collected");
        Ok(removed)
    }

    async fn flush_tag_chunk(
        &self,
        scope: TagScope<'_>,
        now: OffsetDateTime,
        report: &mut TagFlushReport,
    ) -> Result<(), InvalidationError> {
        let tags = scope.tags();
        report.chunks += 1;

        debug!(phase = "collecting", tags = tags.len(), "Resolving tagged entries");
        let locators = self.store.find_by_tags(&tags, now).await?;
        if locators.is_empty() {
            debug!(phase = "done", "No live entries for tags");
            return Ok(());
        }
        report.matched += locators.len();

        let batch = PurgeBatch::from_locators(locators);
        debug!(phase = "dispatched", batch_id = %batch.id(), size = batch.len(), "Purging tagged entries");
        let outcome = self.dispatcher.dispatch(batch).await;
        report
            .purges
            .extend(outcome.requests.iter().map(PurgeSummary::from));

        debug!(phase = "reconciling", batch_id = %outcome.batch_id, "Reconciling purge outcomes");
        if outcome.all_purged() {
            // Entries tagged after the lookup were never purged, so the bulk
            // delete is bounded to this batch.
            let purged: Vec<String> = outcome
                .purged_identifiers()
                .into_iter()
                .map(str::to_string)
                .collect();
            let deleted = match scope {
                TagScope::Single(tag) => self.store.flush_by_tag(tag, &purged).await?,
                TagScope::Many(tags) => self.store.flush_by_tags(tags, &purged).await?,
            };
            report.bulk_deletions += 1;
            report.removed += deleted as usize;
            counter!(METRIC_LOCAL_DELETIONS_TOTAL, "mode" => "bulk").increment(deleted);
        } else {
            for identifier in outcome.purged_identifiers() {
                if self.store.remove(identifier).await? {
                    report.removed += 1;
                    counter!(METRIC_LOCAL_DELETIONS_TOTAL, "mode" => "entry").increment(1);
                }
            }

            let retained = outcome.failed_identifiers();
            counter!(METRIC_ENTRIES_RETAINED_TOTAL).increment(retained.len() as u64);
            warn!(
                batch_id = %outcome.batch_id,
                retained = retained.len(),
                "Some purges failed; keeping their local entries"
            );
            report
                .retained
                .extend(retained.into_iter().map(str::to_string));
        }

        debug!(phase = "done", batch_id = %outcome.batch_id, "Tag chunk reconciled");
        Ok(())
    }
}
