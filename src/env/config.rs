use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_KV_TIMEOUT: Duration = Duration::from_millis(2500);
pub const DEFAULT_KV_DURABLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout budgets used when an operation carries no explicit timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Budget for plain key-value operations
    pub kv_timeout: Duration,

    /// Budget for writes that wait on persistence (synchronous durability
    /// levels or observe-based polling)
    pub kv_durable_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawTimeoutConfig {
    kv_timeout_ms: Option<u64>,
    kv_durable_timeout_ms: Option<u64>,
}

impl TimeoutConfig {
    /// Create a configuration with the default budgets
    pub fn new() -> Self {
        Self {
            kv_timeout: DEFAULT_KV_TIMEOUT,
            kv_durable_timeout: DEFAULT_KV_DURABLE_TIMEOUT,
        }
    }

    /// Set the plain key-value timeout
    pub fn kv_timeout(mut self, timeout: Duration) -> Self {
        self.kv_timeout = timeout;
        self
    }

    /// Set the durable key-value timeout
    pub fn kv_durable_timeout(mut self, timeout: Duration) -> Self {
        self.kv_durable_timeout = timeout;
        self
    }

    /// Parse from a JSON document
    ///
    /// Format: `{"kv_timeout_ms": 2500, "kv_durable_timeout_ms": 10000}`;
    /// missing fields keep their defaults.
    pub fn from_json(input: &str) -> Result<Self, String> {
        let raw: RawTimeoutConfig =
            serde_json::from_str(input).map_err(|e| format!("Invalid timeout config: {}", e))?;

        let mut config = Self::new();
        if let Some(ms) = raw.kv_timeout_ms {
            config = config.kv_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = raw.kv_durable_timeout_ms {
            config = config.kv_durable_timeout(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.kv_timeout.is_zero() {
            return Err("kv_timeout must be > 0".to_string());
        }

        if self.kv_durable_timeout < self.kv_timeout {
            return Err("kv_durable_timeout cannot be shorter than kv_timeout".to_string());
        }

        Ok(())
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TimeoutConfig::default();
        assert_eq!(config.kv_timeout, Duration::from_millis(2500));
        assert_eq!(config.kv_durable_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_pattern() {
        let config = TimeoutConfig::new()
            .kv_timeout(Duration::from_secs(2))
            .kv_durable_timeout(Duration::from_secs(20));

        assert_eq!(config.kv_timeout, Duration::from_secs(2));
        assert_eq!(config.kv_durable_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_from_json() {
        let config = TimeoutConfig::from_json(r#"{"kv_timeout_ms": 1000}"#).unwrap();
        assert_eq!(config.kv_timeout, Duration::from_secs(1));
        assert_eq!(config.kv_durable_timeout, DEFAULT_KV_DURABLE_TIMEOUT);
    }

    #[test]
    fn test_invalid_json() {
        assert!(TimeoutConfig::from_json("not json").is_err());
        assert!(TimeoutConfig::from_json(r#"{"kv_timeout_ms": 0}"#).is_err());
        assert!(
            TimeoutConfig::from_json(r#"{"kv_timeout_ms": 5000, "kv_durable_timeout_ms": 100}"#)
                .is_err()
        );
    }
}
