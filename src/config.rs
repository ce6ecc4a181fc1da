//! Configuration for the echo-kv engine and server.
//!
//! This module provides a builder for the knobs the engine consumes (key
//! limit, eviction policy, eviction ratio, snapshot path) and the few the
//! connection layer needs (address, sweep interval).

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

/// Which keys to drop when the store reaches its key limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EvictionStrategy {
    /// Drop a single arbitrary key.
    #[value(name = "simple-first")]
    SimpleFirst,
    /// Drop a ratio of the limit, chosen at random.
    #[value(name = "allkeys-random")]
    AllKeysRandom,
    /// Drop the most idle keys among a small random sample.
    #[value(name = "allkeys-lru")]
    AllKeysLru,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::SimpleFirst => "simple-first",
            EvictionStrategy::AllKeysRandom => "allkeys-random",
            EvictionStrategy::AllKeysLru => "allkeys-lru",
        }
    }
}

impl std::fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for creating a new store and server.
///
/// ```
/// use echo_kv::{Config, EvictionStrategy};
///
/// let config = Config::new()
///     .keys_limit(10_000)
///     .eviction_strategy(EvictionStrategy::AllKeysLru)
///     .eviction_ratio(0.1)
///     .build();
/// assert_eq!(config.get_keys_limit(), Some(10_000));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Host the server binds to.
    pub(crate) host: String,

    /// Port the server binds to.
    pub(crate) port: u16,

    /// Maximum number of keys. `None` means unlimited.
    pub(crate) keys_limit: Option<usize>,

    pub(crate) eviction_strategy: EvictionStrategy,

    /// Fraction of the key limit removed per eviction pass.
    pub(crate) eviction_ratio: f64,

    /// Snapshot file written by BGREWRITEAOF and on shutdown.
    pub(crate) aof_file: PathBuf,

    /// How often the active expiration sweep runs.
    pub(crate) cron_frequency: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7379,
            keys_limit: Some(100),
            eviction_strategy: EvictionStrategy::AllKeysLru,
            eviction_ratio: 0.40,
            aof_file: PathBuf::from("./echo-master.aof"),
            cron_frequency: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Create a new configuration builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the maximum number of keys.
    ///
    /// Use 0 for unlimited.
    pub fn keys_limit(mut self, limit: usize) -> Self {
        self.keys_limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    pub fn eviction_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.eviction_strategy = strategy;
        self
    }

    /// Set the fraction of the key limit evicted per pass.
    ///
    /// Values outside `(0, 1]` are clamped into it.
    pub fn eviction_ratio(mut self, ratio: f64) -> Self {
        self.eviction_ratio = if ratio.is_nan() {
            Self::default().eviction_ratio
        } else {
            ratio.clamp(f64::EPSILON, 1.0)
        };
        self
    }

    pub fn aof_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.aof_file = path.into();
        self
    }

    /// Set the interval of the active expiration sweep.
    ///
    /// A zero interval keeps the default.
    pub fn cron_frequency(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.cron_frequency = interval;
        }
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Self {
        self
    }

    /// `host:port` the server listens on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn get_keys_limit(&self) -> Option<usize> {
        self.keys_limit
    }

    pub fn get_eviction_strategy(&self) -> EvictionStrategy {
        self.eviction_strategy
    }

    pub fn get_eviction_ratio(&self) -> f64 {
        self.eviction_ratio
    }

    pub fn get_aof_file(&self) -> &std::path::Path {
        &self.aof_file
    }

    pub fn get_cron_frequency(&self) -> Duration {
        self.cron_frequency
    }

    /// Keys removed per ratio-based eviction pass: `ceil(ratio * limit)`,
    /// never less than one.
    pub fn eviction_count(&self) -> usize {
        match self.keys_limit {
            Some(limit) => ((self.eviction_ratio * limit as f64).ceil() as usize).max(1),
            None => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.keys_limit, Some(100));
        assert_eq!(config.eviction_strategy, EvictionStrategy::AllKeysLru);
        assert_eq!(config.listen_addr(), "0.0.0.0:7379");
        assert_eq!(config.cron_frequency, Duration::from_secs(1));
    }

    #[test]
    fn test_builder_pattern() {
        let config = Config::new()
            .host("127.0.0.1")
            .port(6400)
            .keys_limit(10)
            .eviction_strategy(EvictionStrategy::SimpleFirst)
            .eviction_ratio(0.5)
            .aof_file("/tmp/x.aof")
            .build();

        assert_eq!(config.listen_addr(), "127.0.0.1:6400");
        assert_eq!(config.get_keys_limit(), Some(10));
        assert_eq!(config.get_eviction_strategy(), EvictionStrategy::SimpleFirst);
        assert_eq!(config.get_aof_file(), std::path::Path::new("/tmp/x.aof"));
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let config = Config::new().keys_limit(0).build();
        assert!(config.get_keys_limit().is_none());
    }

    #[test]
    fn test_eviction_count_rounds_up() {
        let config = Config::new().keys_limit(10).eviction_ratio(0.25).build();
        assert_eq!(config.eviction_count(), 3);

        let config = Config::new().keys_limit(3).eviction_ratio(0.01).build();
        assert_eq!(config.eviction_count(), 1);

        let config = Config::new().keys_limit(4).eviction_ratio(7.0).build();
        assert_eq!(config.eviction_count(), 4);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(
            EvictionStrategy::from_str("allkeys-random", false).unwrap(),
            EvictionStrategy::AllKeysRandom
        );
        assert_eq!(EvictionStrategy::AllKeysLru.to_string(), "allkeys-lru");
    }
}
