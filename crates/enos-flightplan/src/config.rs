// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Decoder tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How long the expander's consumer waits for the next scenario before giving up.
    pub next_timeout: Duration,
    /// Number of concurrent scenario decode workers.
    pub decode_workers: usize,
    /// Minimum expected scenario count before decoding concurrently.
    pub concurrency_threshold: usize,
    /// Number of concurrent sample validation workers.
    pub sample_validation_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        let workers = default_workers();
        Self {
            next_timeout: Duration::from_millis(2000),
            decode_workers: workers,
            concurrency_threshold: 100,
            sample_validation_workers: workers,
        }
    }
}

fn default_workers() -> usize {
    num_cpus::get().max(2)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `ENOS_DECODE_NEXT_TIMEOUT_MS`: Per-scenario receive deadline (default: 2000)
    /// - `ENOS_DECODE_WORKERS`: Scenario decode workers (default: max(2, ncpu))
    /// - `ENOS_DECODE_CONCURRENCY_THRESHOLD`: Scenario count before decoding concurrently (default: 100)
    /// - `ENOS_SAMPLE_VALIDATION_WORKERS`: Sample validation workers (default: max(2, ncpu))
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_workers = default_workers().to_string();

        let next_timeout_ms: u64 = std::env::var("ENOS_DECODE_NEXT_TIMEOUT_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("ENOS_DECODE_NEXT_TIMEOUT_MS", "must be a positive integer")
            })?;
        if next_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ENOS_DECODE_NEXT_TIMEOUT_MS",
                "must be a positive integer",
            ));
        }

        let decode_workers: usize = std::env::var("ENOS_DECODE_WORKERS")
            .unwrap_or_else(|_| default_workers.clone())
            .parse()
            .map_err(|_| ConfigError::Invalid("ENOS_DECODE_WORKERS", "must be a positive integer"))?;
        if decode_workers == 0 {
            return Err(ConfigError::Invalid("ENOS_DECODE_WORKERS", "must be a positive integer"));
        }

        let concurrency_threshold: usize = std::env::var("ENOS_DECODE_CONCURRENCY_THRESHOLD")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "ENOS_DECODE_CONCURRENCY_THRESHOLD",
                    "must be a non-negative integer",
                )
            })?;

        let sample_validation_workers: usize = std::env::var("ENOS_SAMPLE_VALIDATION_WORKERS")
            .unwrap_or_else(|_| default_workers.clone())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("ENOS_SAMPLE_VALIDATION_WORKERS", "must be a positive integer")
            })?;
        if sample_validation_workers == 0 {
            return Err(ConfigError::Invalid(
                "ENOS_SAMPLE_VALIDATION_WORKERS",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            next_timeout: Duration::from_millis(next_timeout_ms),
            decode_workers,
            concurrency_threshold,
            sample_validation_workers,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
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

    const VARS: [&str; 4] = [
        "ENOS_DECODE_NEXT_TIMEOUT_MS",
        "ENOS_DECODE_WORKERS",
        "ENOS_DECODE_CONCURRENCY_THRESHOLD",
        "ENOS_SAMPLE_VALIDATION_WORKERS",
    ];

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

        fn clear_all(&mut self) {
            for key in VARS {
                self.remove(key);
            }
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

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();

        let config = Config::from_env().unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.next_timeout, Duration::from_millis(2000));
        assert_eq!(config.concurrency_threshold, 100);
        assert!(config.decode_workers >= 2);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();

        guard.set("ENOS_DECODE_NEXT_TIMEOUT_MS", "150");
        guard.set("ENOS_DECODE_WORKERS", "7");
        guard.set("ENOS_DECODE_CONCURRENCY_THRESHOLD", "0");
        guard.set("ENOS_SAMPLE_VALIDATION_WORKERS", "3");

        let config = Config::from_env().unwrap();

        assert_eq!(config.next_timeout, Duration::from_millis(150));
        assert_eq!(config.decode_workers, 7);
        assert_eq!(config.concurrency_threshold, 0);
        assert_eq!(config.sample_validation_workers, 3);
    }

    #[test]
    fn test_config_invalid_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.clear_all();

        guard.set("ENOS_DECODE_WORKERS", "abc");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ENOS_DECODE_WORKERS", _)));

        guard.set("ENOS_DECODE_WORKERS", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ENOS_DECODE_WORKERS", _)));

        guard.remove("ENOS_DECODE_WORKERS");
        guard.set("ENOS_DECODE_NEXT_TIMEOUT_MS", "-5");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ENOS_DECODE_NEXT_TIMEOUT_MS", _)));
        assert!(err.to_string().contains("ENOS_DECODE_NEXT_TIMEOUT_MS"));
    }
}
