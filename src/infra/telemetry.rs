use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names;
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            metric_names::METRIC_PURGE_REQUESTS_TOTAL,
            Unit::Count,
            "Total number of purge requests sent to the proxy, by outcome."
        );
        describe_histogram!(
            metric_names::METRIC_PURGE_BATCH_MS,
            Unit::Milliseconds,
            "Purge batch dispatch latency in milliseconds."
        );
        describe_counter!(
            metric_names::METRIC_LOCAL_DELETIONS_TOTAL,
            Unit::Count,
            "Total number of local cache deletions after a confirmed purge, by mode."
        );
        describe_counter!(
            metric_names::METRIC_ENTRIES_RETAINED_TOTAL,
            Unit::Count,
            "Total number of local cache entries kept because their purge failed."
        );
    });
}
