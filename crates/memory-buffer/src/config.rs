//! Configuration for the memory buffer.

use std::time::Duration;

/// Default byte ceiling (500 MiB).
pub const DEFAULT_LIMIT_BYTES: usize = 524_288_000;

/// Default pause before redelivering a rejected head entry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Memory buffer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Total accounted bytes above which input stops being read
    pub limit: usize,

    /// Pause between a failed delivery and the next attempt of the same entry
    pub retry_delay: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT_BYTES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl BufferConfig {
    /// Config with the given limit and default retry pacing.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BufferConfig::default();
        assert_eq!(config.limit, 524_288_000);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_with_limit() {
        let config = BufferConfig::with_limit(1024);
        assert_eq!(config.limit, 1024);
        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
    }
}
