//! Purgelink cache system
//!
//! Keeps the local page cache and the reverse proxy in step:
//!
//! - **Local store**: cache rows plus a tag index ([`MemoryStore`] or the
//!   Postgres store in `infra::db`)
//! - **Dispatcher**: fans `PURGE` requests out under a concurrency cap
//! - **Coordinator**: deletes a local row only after its proxy copy is gone
//!
//! ## Configuration
//!
//! ```toml
//! [purge]
//! enabled = true
//! base_url = "https://www.example.com"
//! concurrency = 10
//! chunk_size = 100
//! request_timeout_ms = 10000
//! ```

mod batch;
mod client;
mod config;
mod coordinator;
mod dispatcher;
mod lock;
mod origin;
mod registry;
mod store;
mod trigger;

pub use batch::{BatchReport, PurgeBatch, PurgeOutcome, PurgeRequest, PurgeSummary};
pub use client::{PurgeClient, PurgeError, classify_status};
pub use config::PurgeConfig;
pub use coordinator::{
    FlushOutcome, InvalidationCoordinator, InvalidationError, RemoveOutcome, TagFlushReport,
};
pub use dispatcher::PurgeDispatcher;
pub use origin::{RequestOrigin, resolve_base_url};
pub use registry::TagIndex;
pub use store::MemoryStore;
pub use trigger::CacheTrigger;

pub(crate) mod metric_names {
    pub(crate) use super::coordinator::{METRIC_ENTRIES_RETAINED_TOTAL, METRIC_LOCAL_DELETIONS_TOTAL};
    pub(crate) use super::dispatcher::{METRIC_PURGE_BATCH_MS, METRIC_PURGE_REQUESTS_TOTAL};
}
