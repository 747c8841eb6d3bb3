//! Controller configuration from environment variables.

use crate::error::ControllerError;
use reconcile_core::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings for the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when `None`
    pub namespace: Option<String>,
    /// Conflict retry budget for secret updates
    pub retry: RetryPolicy,
    /// Requeue after a successful reconciliation
    pub requeue_interval: Duration,
    /// Error requeue backoff bounds, in seconds
    pub error_backoff_min_secs: u64,
    pub error_backoff_max_secs: u64,
    /// Concurrent reconciliations
    pub concurrency: u16,
    /// Quiet period before reconciling after an event
    pub debounce: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            retry: RetryPolicy::default(),
            requeue_interval: Duration::from_secs(300),
            error_backoff_min_secs: 5,
            error_backoff_max_secs: 300,
            concurrency: 3,
            debounce: Duration::from_secs(5),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "SYNC_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
            initial_delay: Duration::from_millis(parse_or(
                &lookup,
                "SYNC_RETRY_INITIAL_DELAY_MS",
                duration_millis(defaults.retry.initial_delay),
            )?),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "SYNC_RETRY_MAX_DELAY_MS",
                duration_millis(defaults.retry.max_delay),
            )?),
            ..defaults.retry
        };
        if retry.max_attempts == 0 {
            return Err(ControllerError::InvalidConfig(
                "SYNC_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let requeue_interval = Duration::from_secs(parse_or(
            &lookup,
            "REQUEUE_INTERVAL_SECS",
            defaults.requeue_interval.as_secs(),
        )?);

        let error_backoff_min_secs =
            parse_or(&lookup, "ERROR_BACKOFF_MIN_SECS", defaults.error_backoff_min_secs)?;
        let error_backoff_max_secs =
            parse_or(&lookup, "ERROR_BACKOFF_MAX_SECS", defaults.error_backoff_max_secs)?;
        if error_backoff_min_secs == 0 || error_backoff_min_secs > error_backoff_max_secs {
            return Err(ControllerError::InvalidConfig(format!(
                "ERROR_BACKOFF_MIN_SECS ({}) must be non-zero and not exceed ERROR_BACKOFF_MAX_SECS ({})",
                error_backoff_min_secs, error_backoff_max_secs
            )));
        }

        let concurrency = parse_or(&lookup, "CONTROLLER_CONCURRENCY", defaults.concurrency)?;
        let debounce = Duration::from_secs(parse_or(
            &lookup,
            "CONTROLLER_DEBOUNCE_SECS",
            defaults.debounce.as_secs(),
        )?);

        Ok(Self {
            namespace,
            retry,
            requeue_interval,
            error_backoff_min_secs,
            error_backoff_max_secs,
            concurrency,
            debounce,
        })
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Parse a variable, falling back to `default` when it is unset or blank
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", name, raw, e))
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(10));
        assert_eq!(config.retry.max_delay, Duration::from_secs(1));
        assert_eq!(config.concurrency, 3);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("WATCH_NAMESPACE", "logging"),
            ("SYNC_RETRY_ATTEMPTS", "8"),
            ("SYNC_RETRY_INITIAL_DELAY_MS", "50"),
            ("SYNC_RETRY_MAX_DELAY_MS", "2000"),
            ("REQUEUE_INTERVAL_SECS", "60"),
            ("ERROR_BACKOFF_MIN_SECS", "1"),
            ("ERROR_BACKOFF_MAX_SECS", "30"),
            ("CONTROLLER_CONCURRENCY", "10"),
            ("CONTROLLER_DEBOUNCE_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.namespace.as_deref(), Some("logging"));
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(50));
        assert_eq!(config.retry.max_delay, Duration::from_secs(2));
        assert_eq!(config.retry.factor, 2);
        assert_eq!(config.requeue_interval, Duration::from_secs(60));
        assert_eq!(config.error_backoff_min_secs, 1);
        assert_eq!(config.error_backoff_max_secs, 30);
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.debounce, Duration::ZERO);
    }

    #[test]
    fn test_blank_namespace_means_all() {
        let config = config_from(&[("WATCH_NAMESPACE", "  ")]).unwrap();
        assert_eq!(config.namespace, None);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = config_from(&[("SYNC_RETRY_ATTEMPTS", "five")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(ref msg) if msg.contains("SYNC_RETRY_ATTEMPTS")));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = config_from(&[("SYNC_RETRY_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_inverted_backoff_bounds_rejected() {
        let err = config_from(&[
            ("ERROR_BACKOFF_MIN_SECS", "60"),
            ("ERROR_BACKOFF_MAX_SECS", "10"),
        ])
        .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
