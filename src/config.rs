//! Configuration types.
//!
//! Everything is read from environment variables (a `.env` file is loaded
//! by `main` first). Parsing goes through an [`EnvLookup`] so tests can feed
//! a plain map instead of mutating the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::mail::MailConfig;
use crate::store::StoreConfig;

/// Source of configuration values, keyed by environment variable name.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Default scheduler interval: 1 minute.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Default per-call adapter timeout.
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 30;

/// Default port for the trigger surface.
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default number of unread messages pulled into one batch.
pub const DEFAULT_MAX_BATCH: usize = 10;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// When false only manual triggers run.
    pub enabled: bool,
    /// Time between scheduled runs.
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
        }
    }
}

impl SchedulerConfig {
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let disabled = env_flag(env, "DISABLE_SCHEDULER")?;
        let interval_secs: u64 = env_parse(env, "DIGEST_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DIGEST_INTERVAL_SECS".to_string(),
                message: "interval must be at least 1 second".to_string(),
            });
        }
        Ok(Self {
            enabled: !disabled,
            interval: Duration::from_secs(interval_secs),
        })
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub scheduler: SchedulerConfig,
    /// Upper bound on every individual adapter call.
    pub adapter_timeout: Duration,
    pub http_port: u16,
    pub mail: MailConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
}

impl DigestConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let timeout_secs: u64 =
            env_parse(env, "DIGEST_ADAPTER_TIMEOUT_SECS", DEFAULT_ADAPTER_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DIGEST_ADAPTER_TIMEOUT_SECS".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        Ok(Self {
            scheduler: SchedulerConfig::from_lookup(env)?,
            adapter_timeout: Duration::from_secs(timeout_secs),
            http_port: env_parse(env, "DIGEST_HTTP_PORT", DEFAULT_HTTP_PORT)?,
            mail: MailConfig::from_lookup(env)?,
            llm: LlmConfig::from_lookup(env)?,
            store: StoreConfig::from_lookup(env)?,
        })
    }

    /// How long shutdown waits for an in-flight run: the worst case is one
    /// list, a fetch and a mark_read per message, a summarize and an append,
    /// each hitting the adapter timeout.
    pub fn shutdown_grace(&self) -> Duration {
        let steps = 2 * self.mail.max_batch() + 3;
        self.adapter_timeout
            .saturating_mul(u32::try_from(steps).unwrap_or(u32::MAX))
    }
}

/// Directory for rolling log files, if file logging is enabled.
pub fn log_dir_from_env() -> Option<PathBuf> {
    std::env::var("DIGEST_LOG_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

// ── Lookup helpers ──────────────────────────────────────────────────

/// Non-empty, trimmed value for `key`.
pub fn env_value(env: EnvLookup<'_>, key: &str) -> Option<String> {
    env(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_or(env: EnvLookup<'_>, key: &str, default: &str) -> String {
    env_value(env, key).unwrap_or_else(|| default.to_string())
}

pub fn env_required(env: EnvLookup<'_>, key: &str, hint: &str) -> Result<String, ConfigError> {
    env_value(env, key).ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}

pub fn env_parse<T>(env: EnvLookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_value(env, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Boolean flag; unset means false.
pub fn env_flag(env: EnvLookup<'_>, key: &str) -> Result<bool, ConfigError> {
    match env_value(env, key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{v}' is not a boolean"),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::mail::MailConfig;
    use crate::store::StoreConfig;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("EMAIL_IMAP_HOST", "imap.example.com"),
            ("EMAIL_USERNAME", "digest@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
            ("DIGEST_LLM_API_KEY", "gsk-test"),
        ]
    }

    #[test]
    fn defaults_apply_when_only_required_values_set() {
        let pairs = minimal();
        let env = lookup(&pairs);
        let config = DigestConfig::from_lookup(&env).unwrap();

        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.interval, Duration::from_secs(60));
        assert_eq!(config.adapter_timeout, Duration::from_secs(30));
        assert_eq!(config.http_port, 8000);
        assert!(matches!(config.mail, MailConfig::Imap(_)));
        assert!(matches!(config.store, StoreConfig::LibSql { .. }));
    }

    #[test]
    fn shutdown_grace_covers_a_full_batch_of_timeouts() {
        let mut pairs = minimal();
        pairs.push(("DIGEST_ADAPTER_TIMEOUT_SECS", "2"));
        pairs.push(("DIGEST_MAX_BATCH", "4"));
        let env = lookup(&pairs);
        let config = DigestConfig::from_lookup(&env).unwrap();
        assert_eq!(config.mail.max_batch(), 4);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(2 * 11));
    }

    #[test]
    fn scheduler_can_be_disabled() {
        let mut pairs = minimal();
        pairs.push(("DISABLE_SCHEDULER", "TRUE"));
        let env = lookup(&pairs);
        let config = DigestConfig::from_lookup(&env).unwrap();
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn zero_interval_rejected() {
        let env = lookup(&[("DIGEST_INTERVAL_SECS", "0")]);
        let err = SchedulerConfig::from_lookup(&env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DIGEST_INTERVAL_SECS"));
    }

    #[test]
    fn malformed_number_names_the_key() {
        let mut pairs = minimal();
        pairs.push(("DIGEST_HTTP_PORT", "eighty"));
        let env = lookup(&pairs);
        let err = DigestConfig::from_lookup(&env).unwrap_err();
        assert!(err.to_string().contains("DIGEST_HTTP_PORT"));
    }

    #[test]
    fn missing_llm_key_is_fatal() {
        let env = lookup(&[
            ("EMAIL_IMAP_HOST", "imap.example.com"),
            ("EMAIL_USERNAME", "u"),
            ("EMAIL_PASSWORD", "p"),
        ]);
        let err = DigestConfig::from_lookup(&env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn flag_parsing() {
        let env = lookup(&[("A", "yes"), ("B", "0"), ("C", "maybe"), ("D", "  ")]);
        assert!(env_flag(&env, "A").unwrap());
        assert!(!env_flag(&env, "B").unwrap());
        assert!(env_flag(&env, "C").is_err());
        assert!(!env_flag(&env, "D").unwrap());
        assert!(!env_flag(&env, "MISSING").unwrap());
    }
}
