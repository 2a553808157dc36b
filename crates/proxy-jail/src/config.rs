//! Ban engine configuration.

use std::time::Duration;

use proxy_jail_geo::{DEFAULT_CHECK_INTERVAL, GeoPaths};
use serde::{Deserialize, Serialize};

/// How many errors an address may cause before it is banned.
///
/// The limiter holds `max_count` tokens and regains one every `window`.
/// A zero `window` disables escalation entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgivablePolicy {
    /// Time to regain one forgiven error.
    pub window: Duration,
    /// Errors tolerated in a burst.
    pub max_count: u32,
    /// Ban length once the burst is exceeded.
    pub ban_minutes: u32,
}

impl ForgivablePolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(window: Duration, max_count: u32, ban_minutes: u32) -> Self {
        Self {
            window,
            max_count,
            ban_minutes,
        }
    }

    /// Ban length as a duration.
    #[must_use]
    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.ban_minutes) * 60)
    }
}

impl Default for ForgivablePolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_count: 5,
            ban_minutes: 60,
        }
    }
}

/// Main ban engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JailConfig {
    /// Whitelist rules, `a.b.c.d` or `a.b.c.d/len`.
    pub whitelist: Vec<String>,
    /// Error escalation policy.
    pub forgivable: ForgivablePolicy,
    /// Geo database paths; `None` disables enrichment.
    pub geo: Option<GeoPaths>,
    /// Minimum interval between staged geo database checks.
    pub geo_check_interval: Duration,
    /// How often idle counters are dropped; `None` keeps them forever.
    pub sweep_interval: Option<Duration>,
}

impl Default for JailConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            forgivable: ForgivablePolicy::default(),
            geo: None,
            geo_check_interval: DEFAULT_CHECK_INTERVAL,
            sweep_interval: Some(Duration::from_secs(600)),
        }
    }
}

impl JailConfig {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> JailConfigBuilder {
        JailConfigBuilder::default()
    }
}

/// Builder for `JailConfig`.
#[derive(Debug, Clone, Default)]
pub struct JailConfigBuilder {
    config: JailConfig,
}

impl JailConfigBuilder {
    /// Add a whitelist rule.
    #[must_use]
    pub fn whitelist_rule(mut self, rule: impl Into<String>) -> Self {
        self.config.whitelist.push(rule.into());
        self
    }

    /// Set the error escalation policy.
    #[must_use]
    pub fn forgivable(mut self, policy: ForgivablePolicy) -> Self {
        self.config.forgivable = policy;
        self
    }

    /// Enable geo enrichment from these databases.
    #[must_use]
    pub fn geo(mut self, paths: GeoPaths) -> Self {
        self.config.geo = Some(paths);
        self
    }

    /// Set the geo update check interval.
    #[must_use]
    pub fn geo_check_interval(mut self, interval: Duration) -> Self {
        self.config.geo_check_interval = interval;
        self
    }

    /// Set or disable the idle counter sweep.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> JailConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JailConfig::default();
        assert!(config.whitelist.is_empty());
        assert_eq!(config.forgivable.max_count, 5);
        assert_eq!(config.forgivable.window, Duration::from_secs(60));
        assert!(config.geo.is_none());
        assert_eq!(config.geo_check_interval, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_builder_pattern() {
        let config = JailConfig::builder()
            .whitelist_rule("127.0.0.1")
            .whitelist_rule("10.0.0.0/8")
            .forgivable(ForgivablePolicy::new(Duration::from_secs(60), 2, 5))
            .sweep_interval(None)
            .build();

        assert_eq!(config.whitelist, vec!["127.0.0.1", "10.0.0.0/8"]);
        assert_eq!(config.forgivable.max_count, 2);
        assert_eq!(config.forgivable.ban_minutes, 5);
        assert!(config.sweep_interval.is_none());
    }

    #[test]
    fn test_ban_duration() {
        let policy = ForgivablePolicy::new(Duration::from_secs(60), 2, 5);
        assert_eq!(policy.ban_duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_config_deserializes() {
        let json = r#"{
            "whitelist": ["192.168.1.0/24"],
            "forgivable": {"window": {"secs": 60, "nanos": 0}, "max_count": 3, "ban_minutes": 10},
            "geo": null,
            "geo_check_interval": {"secs": 3600, "nanos": 0},
            "sweep_interval": null
        }"#;
        let config: JailConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.whitelist, vec!["192.168.1.0/24"]);
        assert_eq!(config.forgivable.max_count, 3);
        assert!(config.sweep_interval.is_none());
    }
}
