//! Configuration for spatial index construction.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GridIndexError, Result};

/// Loader name of the in-memory backend.
pub const MEMORY_LOADER: &str = "memory";

/// Loader name of the backend persisting trees as files under the cache root.
pub const MAPPED_FILE_LOADER: &str = "mapped-cache-file";

/// Configuration for [`Search`][crate::search::Search].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Name of the backend storing the tree, as registered in a
    /// [`BackendRegistry`][crate::search::BackendRegistry].
    pub loader: String,

    /// Share built trees between searches over the same identity. When disabled every search
    /// builds a private in-memory tree, whatever the loader.
    pub caching: bool,

    /// Load all points in one bulk call instead of inserting them one at a time.
    pub fast_build: bool,

    /// Directory holding persisted trees and their lock files.
    pub cache_root: PathBuf,

    /// How long to wait for another builder of the same identity.
    #[serde(with = "duration_secs")]
    pub lock_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            loader: MEMORY_LOADER.to_string(),
            caching: true,
            fast_build: true,
            cache_root: std::env::temp_dir().join("grid-index-cache"),
            lock_timeout: Duration::from_secs(600),
        }
    }
}

impl SearchConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GRID_INDEX_LOADER") {
            config.loader = val;
        }

        if let Ok(val) = std::env::var("GRID_INDEX_CACHING") {
            config.caching = parse_bool(&val);
        }

        if let Ok(val) = std::env::var("GRID_INDEX_FAST_BUILD") {
            config.fast_build = parse_bool(&val);
        }

        if let Ok(val) = std::env::var("GRID_INDEX_CACHE_ROOT") {
            config.cache_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("GRID_INDEX_LOCK_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.lock_timeout = Duration::from_secs(secs);
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.loader.trim().is_empty() {
            return Err(GridIndexError::Config(
                "loader must not be empty".to_string(),
            ));
        }

        if self.lock_timeout.is_zero() {
            return Err(GridIndexError::Config(
                "lock_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.loader, "memory");
        assert!(config.caching);
        assert!(config.fast_build);
        assert_eq!(config.lock_timeout, Duration::from_secs(600));
        assert!(config.cache_root.ends_with("grid-index-cache"));
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"loader": "mapped-cache-file", "lock_timeout": 5}"#).unwrap();
        assert_eq!(config.loader, MAPPED_FILE_LOADER);
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert!(config.caching);
        assert!(config.fast_build);
    }

    #[test]
    fn json_roundtrip() {
        let config = SearchConfig {
            fast_build: false,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SearchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn invalid() {
        let empty = SearchConfig {
            loader: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(GridIndexError::Config(_))));

        let no_wait = SearchConfig {
            lock_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(no_wait.validate(), Err(GridIndexError::Config(_))));
    }

    #[test]
    fn bool_values() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool("0"));
    }
}
