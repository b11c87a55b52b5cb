//! Bounded-concurrency purge dispatch.
//!
//! Every request of a batch is issued, at most `concurrency` at a time, and
//! each completion is written back into the slot of the request it answers.
//! One failure never cancels its siblings.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use tracing::{debug, error, info, instrument};

use super::batch::{BatchReport, PurgeBatch, PurgeOutcome};
use super::client::{PurgeClient, PurgeError};

pub(crate) const METRIC_PURGE_REQUESTS_TOTAL: &str = "purgelink_purge_requests_total";
pub(crate) const METRIC_PURGE_BATCH_MS: &str = "purgelink_purge_batch_ms";

/// Fans a purge batch out to the proxy.
#[derive(Clone)]
pub struct PurgeDispatcher {
    client: Arc<dyn PurgeClient>,
    concurrency: NonZeroUsize,
    request_timeout: Duration,
}

impl PurgeDispatcher {
    pub fn new(
        client: Arc<dyn PurgeClient>,
        concurrency: NonZeroUsize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            concurrency,
            request_timeout,
        }
    }

    /// Issue every request in `batch` and wait for all of them.
    ///
    /// The report lists requests in input order. A request that exceeds the
    /// per-request timeout is recorded as failed.
    #[instrument(skip_all, fields(batch_id = %batch.id(), size = batch.len()))]
    pub async fn dispatch(&self, batch: PurgeBatch) -> BatchReport {
        let started_at = Instant::now();
        let (batch_id, mut requests) = batch.into_parts();

        if requests.is_empty() {
            debug!("Empty purge batch; nothing to dispatch");
            return BatchReport {
                batch_id,
                requests,
            };
        }

        let urls: Vec<String> = requests.iter().map(|request| request.url.clone()).collect();
        let timeout = self.request_timeout;

        let completions: Vec<(usize, Result<(), PurgeError>)> =
            stream::iter(urls.into_iter().enumerate())
                .map(|(slot, url)| {
                    let client = Arc::clone(&self.client);
                    async move {
                        let result = tokio::time::timeout(timeout, client.purge(&url))
                            .await
                            .unwrap_or(Err(PurgeError::Timeout));
                        (slot, result)
                    }
                })
                .buffer_unordered(self.concurrency.get())
                .collect()
                .await;

        for (slot, result) in completions {
            let request = &mut requests[slot];
            request.outcome = match result {
                Ok(()) => {
                    counter!(METRIC_PURGE_REQUESTS_TOTAL, "outcome" => "purged").increment(1);
                    PurgeOutcome::Purged
                }
                Err(err) => {
                    counter!(METRIC_PURGE_REQUESTS_TOTAL, "outcome" => "failed").increment(1);
                    error!(
                        url = %request.url,
                        identifier = request.identifier.as_deref().unwrap_or("*"),
                        code = %err.code(),
                        message = %err,
                        "Could not purge url"
                    );
                    PurgeOutcome::Failed(err)
                }
            };
        }

        let report = BatchReport {
            batch_id,
            requests,
        };

        info!(
            purged = report.purged_count(),
            failed = report.failed_count(),
            "Purge batch dispatched"
        );
        histogram!(METRIC_PURGE_BATCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        report
    }
}
