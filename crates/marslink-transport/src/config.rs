// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 marslink-transport contributors

//! Environment-driven configuration, loaded once at startup. Mirrors the
//! original `internal/config` package: every value comes from the
//! environment (no CLI flag layer), and an invalid duration or size is a
//! fatal startup error rather than something the server tolerates at
//! runtime.

use std::time::Duration;
use thiserror::Error;

const DEFAULT_SEGMENT_SIZE: &str = "120";
const DEFAULT_TIMEOUT_DURATION: &str = "10s";
const DEFAULT_CHECK_INTERVAL: &str = "5s";
const DEFAULT_TRANSPORT_PORT: &str = "4000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid SEGMENT_SIZE {value:?}: {source}")]
    SegmentSize {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("invalid SEGMENT_SIZE {value:?}: must be >= 1")]
    SegmentSizeZero { value: String },

    #[error("invalid TIMEOUT_DURATION {value:?}: {source}")]
    TimeoutDuration {
        value: String,
        source: humantime::DurationError,
    },

    #[error("invalid CHECK_INTERVAL {value:?}: {source}")]
    CheckInterval {
        value: String,
        source: humantime::DurationError,
    },

    #[error("invalid TRANSPORT_PORT {value:?}: {source}")]
    TransportPort {
        value: String,
        source: std::num::ParseIntError,
    },
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_mars_url: String,
    pub app_earth_url: String,
    pub channel_url: String,
    pub kafka_brokers: String,
    pub segment_size: usize,
    pub timeout_duration: Duration,
    pub check_interval: Duration,
    pub transport_port: u16,
}

impl Config {
    /// Load configuration from the process environment. Invalid durations
    /// or sizes are returned as an error; the caller (`main`) treats this
    /// as fatal, matching the original's `log.Fatalf` behavior.
    pub fn load() -> Result<Self, ConfigError> {
        let segment_size_raw = env_or(DEFAULT_SEGMENT_SIZE, "SEGMENT_SIZE");
        let segment_size: usize =
            segment_size_raw
                .parse()
                .map_err(|source| ConfigError::SegmentSize {
                    value: segment_size_raw.clone(),
                    source,
                })?;
        if segment_size == 0 {
            return Err(ConfigError::SegmentSizeZero {
                value: segment_size_raw,
            });
        }

        let timeout_raw = env_or(DEFAULT_TIMEOUT_DURATION, "TIMEOUT_DURATION");
        let timeout_duration = humantime::parse_duration(&timeout_raw).map_err(|source| {
            ConfigError::TimeoutDuration {
                value: timeout_raw.clone(),
                source,
            }
        })?;

        let check_interval_raw = env_or(DEFAULT_CHECK_INTERVAL, "CHECK_INTERVAL");
        let check_interval = humantime::parse_duration(&check_interval_raw).map_err(|source| {
            ConfigError::CheckInterval {
                value: check_interval_raw.clone(),
                source,
            }
        })?;

        let transport_port_raw = env_or(DEFAULT_TRANSPORT_PORT, "TRANSPORT_PORT");
        let transport_port =
            transport_port_raw
                .parse()
                .map_err(|source| ConfigError::TransportPort {
                    value: transport_port_raw.clone(),
                    source,
                })?;

        Ok(Self {
            app_mars_url: std::env::var("APP_MARS_URL").unwrap_or_default(),
            app_earth_url: std::env::var("APP_EARTH_URL").unwrap_or_default(),
            channel_url: std::env::var("CHANNEL_URL").unwrap_or_default(),
            kafka_brokers: std::env::var("KAFKA_BROKERS").unwrap_or_default(),
            segment_size,
            timeout_duration,
            check_interval,
            transport_port,
        })
    }
}

fn env_or(fallback: &str, key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_when_unset() {
        std::env::remove_var("MARSLINK_TEST_KEY_UNSET");
        assert_eq!(env_or("fallback", "MARSLINK_TEST_KEY_UNSET"), "fallback");
    }

    #[test]
    fn rejects_zero_segment_size() {
        let err = ConfigError::SegmentSizeZero {
            value: "0".to_string(),
        };
        assert!(err.to_string().contains("SEGMENT_SIZE"));
    }

    #[test]
    fn rejects_non_numeric_segment_size() {
        let err = "not-a-number".parse::<usize>().unwrap_err();
        let config_err = ConfigError::SegmentSize {
            value: "not-a-number".to_string(),
            source: err,
        };
        assert!(config_err.to_string().contains("SEGMENT_SIZE"));
    }

    #[test]
    fn parses_human_readable_durations() {
        assert_eq!(
            humantime::parse_duration("10s").unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(
            humantime::parse_duration("5s").unwrap(),
            Duration::from_secs(5)
        );
    }
}
