//! Scheduler configuration loading and management.
//!
//! Embedding applications can construct a [`SchedulerConfig`] directly or
//! load it from a YAML file.  The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   name: "orchestrator"
//!   dispatch: "pool"
//!   pool_workers: 4
//! ```
//! Every field is optional; missing values fall back to their defaults so
//! partial configs are accepted gracefully.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::dispatch::DispatchMode;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default pool size when `dispatch: pool` is selected without an explicit
/// `pool_workers` value.
pub const DEFAULT_POOL_WORKERS: usize = 4;

/// Default engine name, used for the worker thread name and as a log field.
pub const DEFAULT_NAME: &str = "metronome";

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
///
/// Kept private; callers work with [`SchedulerConfig`] instead.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    scheduler: ConfigEntry,
}

/// Scheduler fields as they appear in the YAML file.
#[derive(Debug, Deserialize)]
struct ConfigEntry {
    name: Option<String>,
    /// One of `serialized`, `concurrent`, `pool`.
    dispatch: Option<String>,
    #[serde(default = "default_pool_workers")]
    pool_workers: usize,
}

/// Serde default for `pool_workers`.
fn default_pool_workers() -> usize {
    DEFAULT_POOL_WORKERS
}

// ── SchedulerConfig ───────────────────────────────────────────────────────────

/// Construction-time settings for an
/// [`EventScheduler`](crate::scheduler::EventScheduler).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Engine name.  Becomes the worker thread name prefix and the
    /// `scheduler` field on every log event the engine emits.
    pub name: String,

    /// How due actions are handed to execution.  Fixed for the lifetime of
    /// the engine.
    pub dispatch: DispatchMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            dispatch: DispatchMode::Serialized,
        }
    }
}

impl SchedulerConfig {
    pub fn new(name: impl Into<String>, dispatch: DispatchMode) -> Self {
        Self {
            name: name.into(),
            dispatch,
        }
    }

    /// Parses `path` into a [`SchedulerConfig`].
    ///
    /// * Missing `name` / `dispatch` fall back to defaults with a warning.
    /// * `pool_workers: 0` is coerced to `1` with a warning; a pool with no
    ///   workers would silently drop every event.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the YAML is
    /// structurally invalid, or if `dispatch` names an unknown mode.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scheduler configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;
        let entry = file.scheduler;

        let name = entry.name.unwrap_or_else(|| {
            warn!("No scheduler name in configuration, using '{DEFAULT_NAME}'");
            DEFAULT_NAME.to_string()
        });

        let dispatch = match entry.dispatch.as_deref() {
            None => {
                warn!("No dispatch mode in configuration, using serialized dispatch");
                DispatchMode::Serialized
            }
            Some("serialized") => DispatchMode::Serialized,
            Some("concurrent") => DispatchMode::Concurrent,
            Some("pool") => {
                let workers = if entry.pool_workers == 0 {
                    warn!("pool_workers is 0, coercing to 1");
                    1
                } else {
                    entry.pool_workers
                };
                DispatchMode::Pool { workers }
            }
            Some(other) => {
                bail!("unknown dispatch mode '{other}' (valid: serialized, concurrent, pool)")
            }
        };

        let config = Self { name, dispatch };
        info!(
            name = %config.name,
            dispatch = ?config.dispatch,
            "Scheduler configuration loaded"
        );
        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_full_config() {
        let yaml = r#"
scheduler:
  name: "orchestrator"
  dispatch: "pool"
  pool_workers: 8
"#;
        let f = yaml_tempfile(yaml);
        let config = SchedulerConfig::load_from_file(f.path()).unwrap();

        assert_eq!(config.name, "orchestrator");
        assert_eq!(config.dispatch, DispatchMode::Pool { workers: 8 });
    }

    #[test]
    fn missing_fields_use_defaults() {
        let yaml = "scheduler: {}\n";
        let f = yaml_tempfile(yaml);
        let config = SchedulerConfig::load_from_file(f.path()).unwrap();

        assert_eq!(config.name, DEFAULT_NAME);
        assert_eq!(config.dispatch, DispatchMode::Serialized);
    }

    #[test]
    fn pool_without_worker_count_uses_default() {
        let yaml = "scheduler:\n  dispatch: \"pool\"\n";
        let f = yaml_tempfile(yaml);
        let config = SchedulerConfig::load_from_file(f.path()).unwrap();

        assert_eq!(
            config.dispatch,
            DispatchMode::Pool {
                workers: DEFAULT_POOL_WORKERS
            }
        );
    }

    #[test]
    fn zero_pool_workers_is_coerced_to_one() {
        let yaml = "scheduler:\n  dispatch: \"pool\"\n  pool_workers: 0\n";
        let f = yaml_tempfile(yaml);
        let config = SchedulerConfig::load_from_file(f.path()).unwrap();

        assert_eq!(config.dispatch, DispatchMode::Pool { workers: 1 });
    }

    #[test]
    fn unknown_dispatch_mode_returns_error() {
        let yaml = "scheduler:\n  dispatch: \"round_robin\"\n";
        let f = yaml_tempfile(yaml);
        let result = SchedulerConfig::load_from_file(f.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("round_robin"));
    }

    #[test]
    fn missing_file_returns_error() {
        let result = SchedulerConfig::load_from_file(Path::new("/nonexistent/scheduler.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(SchedulerConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn default_config_is_serialized_dispatch() {
        let config = SchedulerConfig::default();
        assert_eq!(config.name, DEFAULT_NAME);
        assert_eq!(config.dispatch, DispatchMode::Serialized);
    }
}
