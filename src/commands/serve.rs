//! `serve` command implementation
//!
//! Opens a [`logcask::Database`] and exposes it over the HTTP façade.

use logcask::{Config, Database, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Run logcask's HTTP façade over a database directory.
pub async fn run_serve(
    data_dir: PathBuf,
    bind: String,
    rotation_threshold: Option<u64>,
    merge_interval_secs: Option<u64>,
) -> Result<()> {
    let mut config = Config::new(data_dir.clone()).with_env_overrides();
    if let Some(threshold) = rotation_threshold {
        config.rotation_threshold = threshold;
    }
    if let Some(secs) = merge_interval_secs {
        config.merge_interval = std::time::Duration::from_secs(secs);
    }

    info!(dir = %data_dir.display(), bind = %bind, "opening database");
    let db = Arc::new(Database::open(config)?);

    logcask::http_server::serve(db, &bind).await?;
    Ok(())
}
