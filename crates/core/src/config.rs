use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_opt<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, CoreError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CoreError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

pub const ENV_WORKER_THREADS: &str = "CALLQ_WORKER_THREADS";
pub const ENV_THREAD_NAME: &str = "CALLQ_THREAD_NAME";
pub const ENV_STACK_SIZE: &str = "CALLQ_STACK_SIZE";

// ── Queue config ──────────────────────────────────────────────

/// Worker pool configuration for a callback queue.
///
/// Parsed from a `[queue]` TOML table or from `CALLQ_*` environment
/// variables. Missing fields fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Worker threads are named `{prefix}-{n}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Stack size in bytes for worker threads. `None` = platform default.
    #[serde(default)]
    pub stack_size: Option<usize>,
}

fn default_worker_threads() -> usize { 0 }
fn default_thread_name_prefix() -> String { "callq-worker".into() }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name_prefix: default_thread_name_prefix(),
            stack_size: None,
        }
    }
}

/// On-disk layout: everything lives under a `[queue]` table.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    queue: QueueConfig,
}

impl QueueConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(env_opt)
    }

    /// Build config from an arbitrary key lookup. Unset keys keep defaults,
    /// set-but-unparseable keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let mut config = Self::default();
        if let Some(n) = parse_opt(&lookup, ENV_WORKER_THREADS)? {
            config.worker_threads = n;
        }
        if let Some(prefix) = lookup(ENV_THREAD_NAME) {
            config.thread_name_prefix = prefix;
        }
        if let Some(size) = parse_opt(&lookup, ENV_STACK_SIZE)? {
            config.stack_size = Some(size);
        }
        Ok(config)
    }

    /// Parse the `[queue]` table of a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        let file: ConfigFile = toml::from_str(raw)?;
        Ok(file.queue)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Queue config loaded:");
        tracing::info!(
            "  workers:     {} (configured {})",
            self.resolved_worker_threads(),
            self.worker_threads
        );
        tracing::info!("  thread name: {}-N", self.thread_name_prefix);
        match self.stack_size {
            Some(size) => tracing::info!("  stack size:  {} bytes", size),
            None => tracing::info!("  stack size:  (platform default)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.thread_name_prefix, "callq-worker");
        assert_eq!(config.stack_size, None);
    }

    #[test]
    fn resolved_worker_threads() {
        let mut config = QueueConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_worker_threads() > 0);

        config.worker_threads = 8;
        assert_eq!(config.resolved_worker_threads(), 8);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = QueueConfig::from_lookup(lookup_from(&[
            (ENV_WORKER_THREADS, "3"),
            (ENV_THREAD_NAME, "mesh"),
            (ENV_STACK_SIZE, " 65536 "),
        ]))
        .unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.thread_name_prefix, "mesh");
        assert_eq!(config.stack_size, Some(65536));
    }

    #[test]
    fn lookup_rejects_garbage() {
        let err = QueueConfig::from_lookup(lookup_from(&[(ENV_WORKER_THREADS, "many")]))
            .unwrap_err();
        match err {
            CoreError::InvalidEnv { key, value } => {
                assert_eq!(key, ENV_WORKER_THREADS);
                assert_eq!(value, "many");
            }
            other => panic!("expected InvalidEnv, got {other:?}"),
        }
    }

    #[test]
    fn empty_lookup_is_default() {
        let config = QueueConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn toml_partial_table() {
        let config = QueueConfig::from_toml_str("[queue]\nworker_threads = 6\n").unwrap();
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.thread_name_prefix, "callq-worker");
    }

    #[test]
    fn toml_missing_table_uses_defaults() {
        let config = QueueConfig::from_toml_str("").unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn toml_wrong_type_is_error() {
        let err = QueueConfig::from_toml_str("[queue]\nworker_threads = \"four\"\n");
        assert!(matches!(err, Err(CoreError::ConfigParse(_))));
    }

    #[test]
    fn from_file_reads_queue_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]").unwrap();
        writeln!(file, "worker_threads = 2").unwrap();
        writeln!(file, "stack_size = 1048576").unwrap();

        let config = QueueConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.stack_size, Some(1_048_576));
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let err = QueueConfig::from_file("/definitely/not/here/callq.toml");
        assert!(matches!(err, Err(CoreError::Io(_))));
    }
}
