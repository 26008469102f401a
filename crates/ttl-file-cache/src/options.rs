//! Construction-time tunables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(60 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Options applied when a [`FileCache`](crate::FileCache) is constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// How long an entry lives after its last `put` or successful `get`
    pub time_to_live: Duration,
    /// Period of the background expiration sweep
    pub sweep_interval: Duration,
    /// Directory in which the working directory is created (system temp dir if unset)
    pub base_dir: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            time_to_live: DEFAULT_TIME_TO_LIVE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            base_dir: None,
        }
    }
}

impl CacheOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Parse options from environment variables
    ///
    /// Reads `FILE_CACHE_TTL_SECS`, `FILE_CACHE_SWEEP_INTERVAL_SECS` and
    /// `FILE_CACHE_DIR`. Missing or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let secs = |name: &str| {
            lookup(name)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        let time_to_live = secs("FILE_CACHE_TTL_SECS").unwrap_or(defaults.time_to_live);
        let sweep_interval =
            secs("FILE_CACHE_SWEEP_INTERVAL_SECS").unwrap_or(defaults.sweep_interval);
        let base_dir = lookup("FILE_CACHE_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Self {
            time_to_live,
            sweep_interval,
            base_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let opts = CacheOptions::default();
        assert_eq!(opts.time_to_live, Duration::from_secs(3600));
        assert_eq!(opts.sweep_interval, Duration::from_secs(600));
        assert!(opts.base_dir.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let opts = CacheOptions::default()
            .with_ttl(Duration::ZERO)
            .with_sweep_interval(Duration::from_millis(50))
            .with_base_dir("/var/cache/app");
        assert_eq!(opts.time_to_live, Duration::ZERO);
        assert_eq!(opts.sweep_interval, Duration::from_millis(50));
        assert_eq!(opts.base_dir, Some(PathBuf::from("/var/cache/app")));
    }

    #[test]
    fn test_from_lookup_reads_all_vars() {
        let opts = CacheOptions::from_lookup(lookup_from(&[
            ("FILE_CACHE_TTL_SECS", "30"),
            ("FILE_CACHE_SWEEP_INTERVAL_SECS", " 5 "),
            ("FILE_CACHE_DIR", "/tmp/blobs"),
        ]));
        assert_eq!(opts.time_to_live, Duration::from_secs(30));
        assert_eq!(opts.sweep_interval, Duration::from_secs(5));
        assert_eq!(opts.base_dir, Some(PathBuf::from("/tmp/blobs")));
    }

    #[test]
    fn test_from_lookup_falls_back_on_bad_values() {
        let opts = CacheOptions::from_lookup(lookup_from(&[
            ("FILE_CACHE_TTL_SECS", "an hour"),
            ("FILE_CACHE_DIR", ""),
        ]));
        assert_eq!(opts, CacheOptions::default());
    }
}
