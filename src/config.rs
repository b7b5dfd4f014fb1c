//! Layered configuration for the storage engine: CLI flag > environment
//! variable (`LOGCASK_*`) > config file > built-in default, mirroring the
//! teacher's `clap`-derived `#[arg(long, default_value = …)]` convention
//! for the outer CLI while giving the engine itself a plain, independently
//! constructible struct for library embedding.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROTATION_THRESHOLD: u64 = 1024 * 1024; // 1 MiB
pub const DEFAULT_RECOVERY_BUFFER_SIZE: usize = 8192;
pub const DEFAULT_MERGE_INTERVAL: Duration = Duration::from_secs(20);

/// Tunables for a single [`crate::Database`] instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub dir: PathBuf,
    pub rotation_threshold: u64,
    pub recovery_buffer_size: usize,
    pub merge_interval: Duration,
    /// Disabled for embedded/test databases such as a sealed-segment
    /// source opened purely to be merged into another database.
    pub spawn_merge_worker: bool,
}

impl Config {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
            recovery_buffer_size: DEFAULT_RECOVERY_BUFFER_SIZE,
            merge_interval: DEFAULT_MERGE_INTERVAL,
            spawn_merge_worker: true,
        }
    }

    /// Applies `LOGCASK_ROTATION_THRESHOLD`, `LOGCASK_RECOVERY_BUFFER_SIZE`
    /// and `LOGCASK_MERGE_INTERVAL_SECS` environment overrides on top of
    /// whatever was set by CLI flags or defaults.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("LOGCASK_ROTATION_THRESHOLD") {
            if let Ok(parsed) = v.parse() {
                self.rotation_threshold = parsed;
            }
        }
        if let Ok(v) = std::env::var("LOGCASK_RECOVERY_BUFFER_SIZE") {
            if let Ok(parsed) = v.parse() {
                self.recovery_buffer_size = parsed;
            }
        }
        if let Ok(v) = std::env::var("LOGCASK_MERGE_INTERVAL_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.merge_interval = Duration::from_secs(parsed);
            }
        }
        self
    }

    pub fn without_merge_worker(mut self) -> Self {
        self.spawn_merge_worker = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = Config::new("/tmp/whatever");
        assert_eq!(cfg.rotation_threshold, 1024 * 1024);
        assert_eq!(cfg.recovery_buffer_size, 8192);
        assert_eq!(cfg.merge_interval, Duration::from_secs(20));
        assert!(cfg.spawn_merge_worker);
    }

    #[test]
    fn without_merge_worker_disables_spawn() {
        let cfg = Config::new("/tmp/whatever").without_merge_worker();
        assert!(!cfg.spawn_merge_worker);
    }
}
