//! Recognized configuration keys for the registry core (spec.md §6).
//!
//! Loading from a file or environment is the embedding binary's job (out of
//! scope here, same as the teacher crate never loads its own `PackConfig`
//! from disk). This module only defines the shape and defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// `repos.root_path` — root directory under which bare repositories live,
    /// one subdirectory per Repository Id.
    #[serde(default = "default_repos_root")]
    pub repos_root_path: PathBuf,

    /// `sdk.output_path` — root directory for generated SDK artifacts.
    #[serde(default = "default_sdk_root")]
    pub sdk_output_path: PathBuf,

    #[serde(default)]
    pub queue: QueueConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos_root_path: default_repos_root(),
            sdk_output_path: default_sdk_root(),
            queue: QueueConfig::default(),
        }
    }
}

fn default_repos_root() -> PathBuf {
    PathBuf::from("./repos")
}

fn default_sdk_root() -> PathBuf {
    PathBuf::from("./sdk")
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QueueConfig {
    /// `queue.batch_size` — max rows claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// `queue.poll_interval` — seconds between polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// `queue.stuck_timeout` — seconds a `processing` row may go unclaimed
    /// before another worker may reclaim it.
    #[serde(default = "default_stuck_timeout_secs")]
    pub stuck_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval_secs(),
            stuck_timeout_secs: default_stuck_timeout_secs(),
        }
    }
}

fn default_batch_size() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_stuck_timeout_secs() -> u64 {
    15 * 60
}

impl QueueConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stuck_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stuck_timeout_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.repos_root_path, PathBuf::from("./repos"));
        assert_eq!(cfg.sdk_output_path, PathBuf::from("./sdk"));
        assert_eq!(cfg.queue.batch_size, 10);
        assert_eq!(cfg.queue.poll_interval_secs, 5);
        assert_eq!(cfg.queue.stuck_timeout_secs, 900);
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"repos_root_path": "/data/repos"}"#).unwrap();
        assert_eq!(cfg.repos_root_path, PathBuf::from("/data/repos"));
        assert_eq!(cfg.sdk_output_path, PathBuf::from("./sdk"));
    }
}
