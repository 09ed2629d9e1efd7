use std::time::Duration;

use onboard_core::{RetryPolicy, DEFAULT_MAX_RETRIES};
use onboard_db::DEFAULT_MAX_CONNECTIONS;

use crate::dispatcher::DispatcherConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub max_retries: u32,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub delivery_timeout: Duration,
    pub claim_lease: Duration,
    pub stale_sweep_interval: Duration,
    /// Number of dispatcher loops spawned in this process.
    pub concurrency: usize,
    /// How long to wait for in-flight deliveries after a shutdown signal.
    pub shutdown_timeout: Duration,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("database_url", &"<redacted>")
            .field("db_max_connections", &self.db_max_connections)
            .field("max_retries", &self.max_retries)
            .field("poll_interval", &self.poll_interval)
            .field("error_backoff", &self.error_backoff)
            .field("delivery_timeout", &self.delivery_timeout)
            .field("claim_lease", &self.claim_lease)
            .field("stale_sweep_interval", &self.stale_sweep_interval)
            .field("concurrency", &self.concurrency)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `DATABASE_URL`              | —       |
    /// | `DB_MAX_CONNECTIONS`        | `20`    |
    /// | `MAX_RETRIES`               | `5`     |
    /// | `POLL_INTERVAL_SECS`        | `5`     |
    /// | `ERROR_BACKOFF_SECS`        | `5`     |
    /// | `DELIVERY_TIMEOUT_SECS`     | `15`    |
    /// | `CLAIM_LEASE_SECS`          | `300`   |
    /// | `STALE_SWEEP_INTERVAL_SECS` | `60`    |
    /// | `WORKER_CONCURRENCY`        | `1`     |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`    |
    ///
    /// `CLAIM_LEASE_SECS` must exceed `DELIVERY_TIMEOUT_SECS`, otherwise a
    /// claim could be swept while its delivery is still running.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = var("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let delivery_timeout = secs(&var, "DELIVERY_TIMEOUT_SECS", 15)?;
        let claim_lease = secs(&var, "CLAIM_LEASE_SECS", 300)?;
        if claim_lease <= delivery_timeout {
            return Err(ConfigError::Invalid {
                name: "CLAIM_LEASE_SECS",
                expected: "greater than DELIVERY_TIMEOUT_SECS",
                value: claim_lease.as_secs().to_string(),
            });
        }

        Ok(Self {
            database_url,
            db_max_connections: positive(&var, "DB_MAX_CONNECTIONS", u64::from(DEFAULT_MAX_CONNECTIONS))?
                .try_into()
                .map_err(|_| invalid("DB_MAX_CONNECTIONS", "a positive u32", &var))?,
            max_retries: parse(&var, "MAX_RETRIES", DEFAULT_MAX_RETRIES, "a non-negative integer")?,
            poll_interval: secs(&var, "POLL_INTERVAL_SECS", 5)?,
            error_backoff: secs(&var, "ERROR_BACKOFF_SECS", 5)?,
            delivery_timeout,
            claim_lease,
            stale_sweep_interval: secs(&var, "STALE_SWEEP_INTERVAL_SECS", 60)?,
            concurrency: positive(&var, "WORKER_CONCURRENCY", 1)?
                .try_into()
                .map_err(|_| invalid("WORKER_CONCURRENCY", "a positive integer", &var))?,
            shutdown_timeout: secs(&var, "SHUTDOWN_TIMEOUT_SECS", 30)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            poll_interval: self.poll_interval,
            error_backoff: self.error_backoff,
            delivery_timeout: self.delivery_timeout,
            claim_lease: self.claim_lease,
            stale_sweep_interval: self.stale_sweep_interval,
        }
    }
}

fn invalid(
    name: &'static str,
    expected: &'static str,
    var: &impl Fn(&str) -> Option<String>,
) -> ConfigError {
    ConfigError::Invalid {
        name,
        expected,
        value: var(name).unwrap_or_default(),
    }
}

fn parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: raw,
        }),
    }
}

/// Integer that must be at least 1.
fn positive(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse(var, name, default, "a positive integer")? {
        0 => Err(invalid(name, "a positive integer", var)),
        n => Ok(n),
    }
}

/// Whole seconds; zero is rejected so no loop can spin.
fn secs(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    positive(var, name, default).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/onboard")]).unwrap();

        assert_eq!(config.db_max_connections, 20);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.error_backoff, Duration::from_secs(5));
        assert_eq!(config.delivery_timeout, Duration::from_secs(15));
        assert_eq!(config.claim_lease, Duration::from_secs(300));
        assert_eq!(config.stale_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/onboard"),
            ("MAX_RETRIES", "0"),
            ("WORKER_CONCURRENCY", "4"),
            ("POLL_INTERVAL_SECS", " 2 "),
        ])
        .unwrap();

        assert_eq!(config.retry_policy(), RetryPolicy::new(0));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.dispatcher().poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn garbage_and_zero_values_are_rejected() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/onboard"),
            ("MAX_RETRIES", "lots"),
        ])
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "MAX_RETRIES", .. });

        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/onboard"),
            ("POLL_INTERVAL_SECS", "0"),
        ])
        .unwrap_err();
        assert_matches!(err, ConfigError::Invalid { name: "POLL_INTERVAL_SECS", .. });
    }

    #[test]
    fn claim_lease_must_outlast_the_delivery_timeout() {
        for lease in ["15", "5"] {
            let err = load(&[
                ("DATABASE_URL", "postgres://localhost/onboard"),
                ("DELIVERY_TIMEOUT_SECS", "15"),
                ("CLAIM_LEASE_SECS", lease),
            ])
            .unwrap_err();
            assert_eq!(
                err,
                ConfigError::Invalid {
                    name: "CLAIM_LEASE_SECS",
                    expected: "greater than DELIVERY_TIMEOUT_SECS",
                    value: lease.to_string(),
                }
            );
        }

        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/onboard"),
            ("DELIVERY_TIMEOUT_SECS", "15"),
            ("CLAIM_LEASE_SECS", "16"),
        ])
        .unwrap();
        assert_eq!(config.claim_lease, Duration::from_secs(16));
    }

    #[test]
    fn debug_redacts_database_url() {
        let config = load(&[("DATABASE_URL", "postgres://user:pw@db/onboard")]).unwrap();
        assert!(!format!("{config:?}").contains("pw@db"));
    }
}
