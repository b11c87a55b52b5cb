//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "purgelink";
const ENV_PREFIX: &str = "PURGELINK";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_PURGE_CONCURRENCY: u32 = 10;
const DEFAULT_PURGE_CHUNK_SIZE: u32 = 100;
const DEFAULT_PURGE_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PAGE_LIFETIME_SECS: u64 = 86_400;

/// Command-line arguments for the purgelink binary.
#[derive(Debug, Parser)]
#[command(
    name = "purgelink",
    version,
    about = "Page cache with reverse-proxy purging"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PURGELINK_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Record a rendered page in the local cache.
    Record(RecordArgs),
    /// Purge and remove one cache entry.
    Remove(RemoveArgs),
    /// Purge the whole site and empty the local cache.
    Flush(FlushArgs),
    /// Purge and remove every entry carrying any of the given tags.
    #[command(name = "flush-tags")]
    FlushTags(FlushTagsArgs),
    /// Purge and remove every entry rendered from a page.
    #[command(name = "page-changed")]
    PageChanged(PageChangedArgs),
    /// Remove expired entries from the local cache.
    #[command(name = "gc")]
    CollectGarbage,
}

#[derive(Debug, Args, Clone)]
pub struct RecordArgs {
    /// Public URL the page was rendered for.
    #[arg(long, value_name = "URL")]
    pub url: String,

    /// Cache tag; repeat for several.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Lifetime of the entry.
    #[arg(long = "lifetime-seconds", value_name = "SECONDS", default_value_t = DEFAULT_PAGE_LIFETIME_SECS)]
    pub lifetime_seconds: u64,
}

#[derive(Debug, Args, Clone)]
pub struct RemoveArgs {
    /// Identifier of the cache entry.
    #[arg(value_name = "IDENTIFIER")]
    pub identifier: String,
}

#[derive(Debug, Args, Clone, Default)]
pub struct FlushArgs {
    /// URL of the current request; its scheme and host are used when no base
    /// URL is configured.
    #[arg(long = "request-host", value_name = "URL")]
    pub request_host: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct FlushTagsArgs {
    #[arg(value_name = "TAG", required = true)]
    pub tags: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct PageChangedArgs {
    #[arg(value_name = "PAGE_ID")]
    pub page_id: u64,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT", global = true)]
    pub database_max_connections: Option<u32>,

    /// Enable or disable the purge integration.
    #[arg(
        long = "purge-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub purge_enabled: Option<bool>,

    /// Override the public base URL used for site-wide flushes.
    #[arg(long = "purge-base-url", value_name = "URL", global = true)]
    pub purge_base_url: Option<String>,

    /// Override the number of purge requests in flight per batch.
    #[arg(long = "purge-concurrency", value_name = "COUNT", global = true)]
    pub purge_concurrency: Option<u32>,

    /// Override the number of tags flushed per chunk.
    #[arg(long = "purge-chunk-size", value_name = "COUNT", global = true)]
    pub purge_chunk_size: Option<u32>,

    /// Override the per-request purge timeout.
    #[arg(long = "purge-request-timeout-ms", value_name = "MS", global = true)]
    pub purge_request_timeout_ms: Option<u64>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub purge: PurgeSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct PurgeSettings {
    pub enabled: bool,
    pub base_url: Option<Url>,
    pub concurrency: NonZeroU32,
    pub chunk_size: NonZeroU32,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    purge: RawPurgeSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.purge_enabled {
            self.purge.enabled = Some(enabled);
        }
        if let Some(url) = overrides.purge_base_url.as_ref() {
            self.purge.base_url = Some(url.clone());
        }
        if let Some(value) = overrides.purge_concurrency {
            self.purge.concurrency = Some(value);
        }
        if let Some(value) = overrides.purge_chunk_size {
            self.purge.chunk_size = Some(value);
        }
        if let Some(value) = overrides.purge_request_timeout_ms {
            self.purge.request_timeout_ms = Some(value);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            purge,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let purge = build_purge_settings(purge)?;

        Ok(Self {
            logging,
            database,
            purge,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = trimmed(database.url);

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_purge_settings(purge: RawPurgeSettings) -> Result<PurgeSettings, LoadError> {
    let base_url = match trimmed(purge.base_url) {
        Some(value) => Some(parse_base_url(&value)?),
        None => None,
    };

    let concurrency = non_zero_u32(
        purge.concurrency.unwrap_or(DEFAULT_PURGE_CONCURRENCY).into(),
        "purge.concurrency",
    )?;
    let chunk_size = non_zero_u32(
        purge.chunk_size.unwrap_or(DEFAULT_PURGE_CHUNK_SIZE).into(),
        "purge.chunk_size",
    )?;

    let timeout_ms = purge
        .request_timeout_ms
        .unwrap_or(DEFAULT_PURGE_REQUEST_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "purge.request_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(PurgeSettings {
        enabled: purge.enabled.unwrap_or(true),
        base_url,
        concurrency,
        chunk_size,
        request_timeout: Duration::from_millis(timeout_ms),
    })
}

fn parse_base_url(value: &str) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid("purge.base_url", format!("failed to parse: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "purge.base_url",
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(LoadError::invalid("purge.base_url", "url has no host"));
    }
    // `/*` is appended to the base url, so anything after the path would
    // end up inside the wildcard.
    if url.query().is_some() || url.fragment().is_some() {
        return Err(LoadError::invalid(
            "purge.base_url",
            "url must not carry a query or fragment",
        ));
    }
    Ok(url)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPurgeSettings {
    enabled: Option<bool>,
    base_url: Option<String>,
    concurrency: Option<u32>,
    chunk_size: Option<u32>,
    request_timeout_ms: Option<u64>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
