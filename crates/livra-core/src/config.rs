// Copyright (C) 2025 Livra Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Livra engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL (e.g. `sqlite:.data/livra.db?mode=rwc`)
    pub database_url: String,
    /// HTTP server bind address
    pub http_addr: SocketAddr,
    /// Lower bound of the jittered post-image sleep window
    pub sleep_min: Duration,
    /// Upper bound of the jittered post-image sleep window
    pub sleep_max: Duration,
    /// How often the wake scheduler polls for due runs
    pub wake_poll_interval: Duration,
    /// Maximum prior posts passed to generation as reference images
    pub reference_image_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `LIVRA_DATABASE_URL`: SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `LIVRA_HTTP_PORT`: HTTP server port (default: 8080)
    /// - `LIVRA_SLEEP_MIN_SECS`: minimum sleep between image and video
    ///   production (default: 14400, i.e. 4 hours)
    /// - `LIVRA_SLEEP_MAX_SECS`: maximum sleep (default: 28800, i.e. 8 hours)
    /// - `LIVRA_WAKE_POLL_SECS`: wake scheduler poll interval (default: 5)
    /// - `LIVRA_REFERENCE_IMAGES`: reference image count (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("LIVRA_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("LIVRA_DATABASE_URL"))?;

        let http_port: u16 = std::env::var("LIVRA_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("LIVRA_HTTP_PORT", "must be a valid port number"))?;

        let sleep_min_secs: u64 = std::env::var("LIVRA_SLEEP_MIN_SECS")
            .unwrap_or_else(|_| "14400".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("LIVRA_SLEEP_MIN_SECS", "must be a non-negative integer")
            })?;

        let sleep_max_secs: u64 = std::env::var("LIVRA_SLEEP_MAX_SECS")
            .unwrap_or_else(|_| "28800".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("LIVRA_SLEEP_MAX_SECS", "must be a non-negative integer")
            })?;

        if sleep_max_secs < sleep_min_secs {
            return Err(ConfigError::Invalid(
                "LIVRA_SLEEP_MAX_SECS",
                "must be >= LIVRA_SLEEP_MIN_SECS",
            ));
        }

        let wake_poll_secs: u64 = std::env::var("LIVRA_WAKE_POLL_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("LIVRA_WAKE_POLL_SECS", "must be a positive integer")
            })?;

        let reference_image_limit: usize = std::env::var("LIVRA_REFERENCE_IMAGES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("LIVRA_REFERENCE_IMAGES", "must be a non-negative integer")
            })?;

        Ok(Self {
            database_url,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            sleep_min: Duration::from_secs(sleep_min_secs),
            sleep_max: Duration::from_secs(sleep_max_secs),
            wake_poll_interval: Duration::from_secs(wake_poll_secs),
            reference_image_limit,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    fn clear_optional(guard: &mut EnvGuard) {
        guard.remove("LIVRA_HTTP_PORT");
        guard.remove("LIVRA_SLEEP_MIN_SECS");
        guard.remove("LIVRA_SLEEP_MAX_SECS");
        guard.remove("LIVRA_WAKE_POLL_SECS");
        guard.remove("LIVRA_REFERENCE_IMAGES");
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("LIVRA_DATABASE_URL", "sqlite:test.db");
        clear_optional(&mut guard);

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite:test.db");
        assert_eq!(config.http_addr.port(), 8080);
        assert_eq!(config.sleep_min, Duration::from_secs(14400));
        assert_eq!(config.sleep_max, Duration::from_secs(28800));
        assert_eq!(config.wake_poll_interval, Duration::from_secs(5));
        assert_eq!(config.reference_image_limit, 3);
    }

    #[test]
    fn test_config_custom_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("LIVRA_DATABASE_URL", "sqlite:.data/livra.db?mode=rwc");
        guard.set("LIVRA_HTTP_PORT", "9090");
        guard.set("LIVRA_SLEEP_MIN_SECS", "1");
        guard.set("LIVRA_SLEEP_MAX_SECS", "2");
        guard.set("LIVRA_WAKE_POLL_SECS", "1");
        guard.set("LIVRA_REFERENCE_IMAGES", "5");

        let config = Config::from_env().unwrap();

        assert_eq!(config.http_addr.port(), 9090);
        assert_eq!(config.sleep_min, Duration::from_secs(1));
        assert_eq!(config.sleep_max, Duration::from_secs(2));
        assert_eq!(config.reference_image_limit, 5);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("LIVRA_DATABASE_URL");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Missing("LIVRA_DATABASE_URL")
        ));
    }

    #[test]
    fn test_config_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("LIVRA_DATABASE_URL", "sqlite:test.db");
        guard.set("LIVRA_HTTP_PORT", "not_a_number");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Invalid("LIVRA_HTTP_PORT", _)
        ));
    }

    #[test]
    fn test_config_sleep_window_inverted() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("LIVRA_DATABASE_URL", "sqlite:test.db");
        clear_optional(&mut guard);
        guard.set("LIVRA_SLEEP_MIN_SECS", "100");
        guard.set("LIVRA_SLEEP_MAX_SECS", "50");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Invalid("LIVRA_SLEEP_MAX_SECS", _)
        ));
    }
}
