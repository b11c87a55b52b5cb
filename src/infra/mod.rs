//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod purge_client;
pub mod telemetry;
