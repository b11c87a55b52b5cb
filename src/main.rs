use std::{process, sync::Arc, time::Duration};

use purgelink::{
    application::{error::AppError, repos::CacheStore},
    cache::{
        CacheTrigger, InvalidationCoordinator, PurgeClient, PurgeConfig, PurgeDispatcher,
        RequestOrigin,
    },
    config,
    domain::entries::CacheEntry,
    infra::{
        db::PostgresCacheStore, error::InfraError, purge_client::HttpPurgeClient, telemetry,
    },
};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let store = init_store(&settings).await?;
    let trigger = build_trigger(store, &settings)?;

    match cli_args.command {
        config::Command::Record(args) => run_record(&trigger, args).await,
        config::Command::Remove(args) => {
            print_report(trigger.remove(&args.identifier).await?)
        }
        config::Command::Flush(args) => run_flush(&trigger, args).await,
        config::Command::FlushTags(args) => run_flush_tags(&trigger, args).await,
        config::Command::PageChanged(args) => {
            print_report(trigger.page_changed(args.page_id).await?)
        }
        config::Command::CollectGarbage => {
            let removed = trigger.collect_garbage().await?;
            print_report(Some(serde_json::json!({ "removed": removed })))
        }
    }
}

async fn init_store(settings: &config::Settings) -> Result<Arc<PostgresCacheStore>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresCacheStore::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresCacheStore::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let store = PostgresCacheStore::new(pool);
    store
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!(max_connections = settings.database.max_connections.get(), "Cache store ready");
    Ok(Arc::new(store))
}

fn build_trigger(
    store: Arc<PostgresCacheStore>,
    settings: &config::Settings,
) -> Result<CacheTrigger, AppError> {
    let purge_config = PurgeConfig::from(&settings.purge);

    let client: Arc<dyn PurgeClient> =
        Arc::new(HttpPurgeClient::new(purge_config.request_timeout).map_err(AppError::from)?);
    let dispatcher = PurgeDispatcher::new(
        client,
        purge_config.concurrency,
        purge_config.request_timeout,
    );
    let store: Arc<dyn CacheStore> = store;

    info!(
        enabled = purge_config.enabled,
        base_url = purge_config.configured_base_url().as_deref().unwrap_or("<request host>"),
        concurrency = purge_config.concurrency.get(),
        chunk_size = purge_config.chunk_size.get(),
        "Purge integration configured"
    );

    Ok(CacheTrigger::new(InvalidationCoordinator::new(
        store,
        dispatcher,
        purge_config,
    )))
}

#[derive(Serialize)]
struct RecordReport {
    identifier: String,
    url: String,
    tags: Vec<String>,
    expires_at: String,
}

impl RecordReport {
    fn from_entry(entry: CacheEntry) -> Result<Self, AppError> {
        let expires_at = entry
            .expires_at
            .format(&Rfc3339)
            .map_err(|err| AppError::unexpected(err.to_string()))?;
        Ok(Self {
            identifier: entry.identifier,
            url: entry.locator,
            tags: entry.tags,
            expires_at,
        })
    }
}

async fn run_record(trigger: &CacheTrigger, args: config::RecordArgs) -> Result<(), AppError> {
    let lifetime = Duration::from_secs(args.lifetime_seconds);
    let entry = trigger.page_cached(&args.url, args.tags, lifetime).await?;
    let report = entry.map(RecordReport::from_entry).transpose()?;
    print_report(report)
}

async fn run_flush(trigger: &CacheTrigger, args: config::FlushArgs) -> Result<(), AppError> {
    let origin = match args.request_host.as_deref() {
        Some(value) => Some(RequestOrigin::parse(value).ok_or_else(|| {
            AppError::validation(format!("`{value}` is not an absolute http(s) url"))
        })?),
        None => None,
    };
    print_report(trigger.flush(origin.as_ref()).await?)
}

async fn run_flush_tags(
    trigger: &CacheTrigger,
    args: config::FlushTagsArgs,
) -> Result<(), AppError> {
    let report = match args.tags.as_slice() {
        [tag] => trigger.flush_by_tag(tag).await?,
        tags => trigger.flush_by_tags(tags).await?,
    };
    print_report(report)
}

/// Print an operation report as JSON. A disabled integration reports as such.
fn print_report<T: Serialize>(report: Option<T>) -> Result<(), AppError> {
    let rendered = match report {
        Some(report) => serde_json::to_string_pretty(&report),
        None => serde_json::to_string_pretty(&serde_json::json!({ "status": "disabled" })),
    }
    .map_err(|err| AppError::from(InfraError::from(err)))?;

    println!("{rendered}");
    Ok(())
}
