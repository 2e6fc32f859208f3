//! Engine configuration.
//!
//! The poll period is a fixed constant. `EngineConfig` exists so the cache can
//! be constructed with an injected value (tests, embedders); nothing is read
//! from files or the environment.

use std::time::Duration;

/// Period between revalidations of a polled resource.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// User agent sent by the reqwest transport.
pub const DEFAULT_USER_AGENT: &str = concat!("tether/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often a polled resource is re-fetched.
    pub poll_interval: Duration,
    /// `User-Agent` header for outgoing requests.
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl EngineConfig {
    /// Short poll period for development and tests.
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval",
                reason: "must be > 0".to_string(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "user_agent",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
        assert!(EngineConfig::development().validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = EngineConfig::default().with_poll_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "poll_interval", .. })
        ));
    }

    #[test]
    fn test_blank_user_agent_rejected() {
        let config = EngineConfig {
            user_agent: "   ".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
