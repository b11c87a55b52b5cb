//! Page cache backend that keeps a reverse proxy in step with the local
//! cache: invalidating an entry purges its proxy copy first and deletes the
//! local record only once that purge is confirmed.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
