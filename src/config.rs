//! Configuration for the mailwire command-line client.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use mailwire_client::{ClientConfig, RateLimitPolicy, RetryPolicy, DEFAULT_BASE_URL};
use mailwire_webhook::WebhookHandler;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "mailwire.toml";
const ENV_PREFIX: &str = "MAILWIRE_";

/// Complete CLI configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `MAILWIRE_` (highest priority)
/// 2. Configuration file (`mailwire.toml`, or the `--config` path)
/// 3. Built-in defaults (lowest priority)
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    // API
    /// API base URL.
    ///
    /// Environment variable: `MAILWIRE_BASE_URL`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token for the send API.
    ///
    /// Environment variable: `MAILWIRE_API_TOKEN`
    #[serde(default)]
    pub api_token: String,
    /// Per-attempt request timeout in seconds.
    ///
    /// Environment variable: `MAILWIRE_TIMEOUT_SECONDS`
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// User agent override.
    ///
    /// Environment variable: `MAILWIRE_USER_AGENT`
    #[serde(default)]
    pub user_agent: Option<String>,

    // Retry
    /// Retries after the initial attempt.
    ///
    /// Environment variable: `MAILWIRE_MAX_RETRIES`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `MAILWIRE_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    ///
    /// Environment variable: `MAILWIRE_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Backoff growth factor per attempt.
    ///
    /// Environment variable: `MAILWIRE_RETRY_BACKOFF_MULTIPLIER`
    #[serde(default = "default_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `MAILWIRE_RETRY_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor")]
    pub retry_jitter_factor: f64,

    // Rate limiting
    /// Send requests allowed per window.
    ///
    /// Environment variable: `MAILWIRE_RATE_LIMIT_MAX_REQUESTS`
    #[serde(default = "default_max_requests")]
    pub rate_limit_max_requests: u32,
    /// Rate-limit window length in milliseconds.
    ///
    /// Environment variable: `MAILWIRE_RATE_LIMIT_WINDOW_MS`
    #[serde(default = "default_window_ms")]
    pub rate_limit_window_ms: u64,

    // Webhooks
    /// Shared secret for webhook signatures.
    ///
    /// Environment variable: `MAILWIRE_WEBHOOK_SECRET`
    #[serde(default)]
    pub webhook_secret: Option<String>,

    // Logging
    /// Filter used when `RUST_LOG` is unset.
    ///
    /// Environment variable: `MAILWIRE_LOG_LEVEL`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token_masked())
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_ms", &self.rate_limit_window_ms)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "***"))
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads configuration from defaults, a TOML file, and `MAILWIRE_`
    /// environment variables.
    ///
    /// Without `path`, `mailwire.toml` in the working directory is used if
    /// present. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.is_file() {
                    anyhow::bail!("config file not found: {}", path.display());
                }
                path
            },
            None => Path::new(CONFIG_FILE),
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: self.retry_backoff_multiplier,
            jitter_factor: self.retry_jitter_factor,
        }
    }

    /// Convert to rate-limit policy.
    pub fn to_rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests: self.rate_limit_max_requests,
            window: Duration::from_millis(self.rate_limit_window_ms),
        }
    }

    /// Convert to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            base_url: self.base_url.clone(),
            api_token: self.api_token.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            retry: self.to_retry_policy(),
            rate_limit: self.to_rate_limit_policy(),
        }
    }

    /// Webhook handler using the configured secret, if any.
    pub fn to_webhook_handler(&self) -> WebhookHandler {
        match &self.webhook_secret {
            Some(secret) => WebhookHandler::with_secret(secret),
            None => WebhookHandler::new(),
        }
    }

    /// Get API token with all but the last four characters masked for
    /// logging.
    pub fn api_token_masked(&self) -> String {
        ClientConfig { api_token: self.api_token.clone(), ..ClientConfig::default() }
            .api_token_masked()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            anyhow::bail!("base_url must not be empty");
        }

        if self.timeout_seconds == 0 {
            anyhow::bail!("timeout_seconds must be greater than 0");
        }

        if self.rate_limit_max_requests == 0 {
            anyhow::bail!("rate_limit_max_requests must be greater than 0");
        }

        if self.rate_limit_window_ms == 0 {
            anyhow::bail!("rate_limit_window_ms must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        if self.retry_backoff_multiplier.is_nan() || self.retry_backoff_multiplier < 1.0 {
            anyhow::bail!("retry_backoff_multiplier must be at least 1.0");
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("retry_base_delay_ms cannot exceed retry_max_delay_ms");
        }

        if self.webhook_secret.as_deref().is_some_and(str::is_empty) {
            anyhow::bail!("webhook_secret must not be empty when set");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: String::new(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_backoff_multiplier: default_backoff_multiplier(),
            retry_jitter_factor: default_jitter_factor(),
            rate_limit_max_requests: default_max_requests(),
            rate_limit_window_ms: default_window_ms(),
            webhook_secret: None,
            log_level: default_log_level(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    mailwire_client::DEFAULT_TIMEOUT_SECONDS
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "info,mailwire=debug".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, io::Write, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_client_defaults() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.to_retry_policy(), RetryPolicy::default());
        assert_eq!(config.to_rate_limit_policy(), RateLimitPolicy::default());

        let client = config.to_client_config();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.timeout, ClientConfig::default().timeout);
        assert_eq!(client.user_agent, ClientConfig::default().user_agent);
    }

    #[test]
    fn file_then_env_overrides() {
        let mut guard = TestEnvGuard::new();
        let file = config_file(
            r#"
            base_url = "https://file.example.com"
            api_token = "file-token"
            max_retries = 5
            rate_limit_max_requests = 10
            webhook_secret = "whsec_file"
            "#,
        );
        guard.set_var("MAILWIRE_API_TOKEN", "env-token");
        guard.set_var("MAILWIRE_RETRY_JITTER_FACTOR", "0.25");

        let config = Config::load(Some(file.path())).expect("Config should load");

        assert_eq!(config.base_url, "https://file.example.com");
        assert_eq!(config.api_token, "env-token");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_jitter_factor, 0.25);
        assert_eq!(config.to_rate_limit_policy().max_requests, 10);
        assert!(config.to_webhook_handler().has_secret());
    }

    #[test]
    fn conversions_carry_values() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("MAILWIRE_TIMEOUT_SECONDS", "45");
        guard.set_var("MAILWIRE_RETRY_BASE_DELAY_MS", "250");
        guard.set_var("MAILWIRE_RETRY_MAX_DELAY_MS", "4000");
        guard.set_var("MAILWIRE_RETRY_BACKOFF_MULTIPLIER", "3");
        guard.set_var("MAILWIRE_RATE_LIMIT_WINDOW_MS", "1000");
        guard.set_var("MAILWIRE_USER_AGENT", "acme-mailer/2.0");

        let file = config_file("");
        let config = Config::load(Some(file.path())).expect("Config should load");
        let client = config.to_client_config();

        assert_eq!(client.timeout, Duration::from_secs(45));
        assert_eq!(client.user_agent, "acme-mailer/2.0");
        assert_eq!(client.retry.base_delay, Duration::from_millis(250));
        assert_eq!(client.retry.max_delay, Duration::from_millis(4000));
        assert_eq!(client.retry.backoff_multiplier, 3.0);
        assert_eq!(client.rate_limit.window, Duration::from_secs(1));
        assert!(!config.to_webhook_handler().has_secret());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let error = Config::load(Some(Path::new("/nonexistent/mailwire.toml"))).unwrap_err();
        assert!(error.to_string().contains("config file not found"));
    }

    #[test]
    fn invalid_env_value_rejected() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("MAILWIRE_RATE_LIMIT_MAX_REQUESTS", "0");

        let file = config_file("");
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn invalid_config_validation_fails() {
        let mut config = Config::default();
        config.base_url = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.retry_jitter_factor = 1.5;
        assert!(config.validate().is_err());

        config = Config::default();
        config.retry_backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        config = Config::default();
        config.retry_base_delay_ms = 20_000;
        assert!(config.validate().is_err());

        config = Config::default();
        config.rate_limit_window_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.webhook_secret = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn secrets_masked_in_debug_output() {
        let config = Config {
            api_token: "mw_live_0123456789abcdef".to_string(),
            webhook_secret: Some("whsec_hidden".to_string()),
            ..Config::default()
        };

        let debug = format!("{config:?}");
        assert!(!debug.contains("0123456789"));
        assert!(!debug.contains("whsec_hidden"));
        assert!(debug.contains("***cdef"));
    }
}
