//! `logcask` — an append-only, log-structured key-value store with an
//! in-memory hash index, periodic segment rotation, crash recovery via
//! log replay, and background segment merging.
//!
//! The storage engine (`database`, `segment`, `record`, `recovery`,
//! `merge`, `config`) is the correctness surface. `http_server`,
//! `balancer`, `cli` and `commands` are the external glue that gives
//! this crate the same shape as the system it was modeled on; none of
//! it participates in the engine's invariants.

pub mod config;
pub mod database;
pub mod error;
pub mod http_server;
pub mod merge;
pub mod metrics;
pub mod record;
pub mod recovery;
pub mod segment;

pub use config::Config;
pub use database::Database;
pub use error::{Result, StorageError};
