//! Configuration management for the Baton webhook relay.

use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use baton_core::{ContinueToken, DeliveryBudget};
use baton_delivery::{BackoffPolicy, ClientConfig, RelaySettings};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "baton.toml";

/// Relay configuration with defaults, file, and environment overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`baton.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// `BACKEND_URL`, `STRAVA_VERIFY_TOKEN` and `CONTINUE_TOKEN` have no usable
/// default and must be provided.
///
/// # Example
///
/// ```no_run
/// use baton_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Relay will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP-layer timeout for inbound requests in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,
    /// Largest accepted request body in bytes.
    ///
    /// Environment variable: `MAX_BODY_BYTES`
    #[serde(default = "default_max_body_bytes", alias = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,
    /// Seconds to wait for running windows on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_GRACE_SECONDS`
    #[serde(default = "default_shutdown_grace", alias = "SHUTDOWN_GRACE_SECONDS")]
    pub shutdown_grace_seconds: u64,

    // Peers
    /// Base URL of the backend that receives forwarded events.
    ///
    /// Environment variable: `BACKEND_URL`
    #[serde(default, alias = "BACKEND_URL")]
    pub backend_url: String,
    /// Base URL this relay is reachable at, used for continuation calls.
    /// Defaults to `http://{host}:{port}`.
    ///
    /// Environment variable: `PUBLIC_URL`
    #[serde(default, alias = "PUBLIC_URL")]
    pub public_url: Option<String>,

    // Secrets
    /// Token the provider echoes during subscription verification.
    ///
    /// Environment variable: `STRAVA_VERIFY_TOKEN`
    #[serde(default, alias = "STRAVA_VERIFY_TOKEN")]
    pub strava_verify_token: String,
    /// Shared secret authenticating continuation calls.
    ///
    /// Environment variable: `CONTINUE_TOKEN`
    #[serde(default, alias = "CONTINUE_TOKEN")]
    pub continue_token: String,

    // Windows
    /// Budget of the window started at intake, in milliseconds.
    ///
    /// Environment variable: `INTAKE_WINDOW_MS`
    #[serde(default = "default_intake_window_ms", alias = "INTAKE_WINDOW_MS")]
    pub intake_window_ms: u64,
    /// Budget of each continuation window, in milliseconds.
    ///
    /// Environment variable: `CONTINUATION_WINDOW_MS`
    #[serde(default = "default_continuation_window_ms", alias = "CONTINUATION_WINDOW_MS")]
    pub continuation_window_ms: u64,
    /// Host's hard per-invocation ceiling, in milliseconds.
    ///
    /// Environment variable: `PLATFORM_CEILING_MS`
    #[serde(default = "default_platform_ceiling_ms", alias = "PLATFORM_CEILING_MS")]
    pub platform_ceiling_ms: u64,
    /// Timeout of a single delivery attempt, in milliseconds.
    ///
    /// Environment variable: `ATTEMPT_TIMEOUT_MS`
    #[serde(default = "default_attempt_timeout_ms", alias = "ATTEMPT_TIMEOUT_MS")]
    pub attempt_timeout_ms: u64,
    /// Highest depth a continuation window may run at.
    ///
    /// Environment variable: `MAX_CONTINUATION_DEPTH`
    #[serde(default = "default_max_depth", alias = "MAX_CONTINUATION_DEPTH")]
    pub max_continuation_depth: u32,

    // Retry
    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms", alias = "RETRY_BASE_DELAY_MS")]
    pub retry_base_delay_ms: u64,
    /// Cap of the exponential part of a delay in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms", alias = "RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: u64,
    /// Exclusive upper bound of the additive jitter in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_JITTER_MS`
    #[serde(default = "default_max_jitter_ms", alias = "RETRY_MAX_JITTER_MS")]
    pub retry_max_jitter_ms: u64,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a value is invalid.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Backoff policy for the forwarding engine.
    pub fn to_backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_jitter: Duration::from_millis(self.retry_max_jitter_ms),
        }
    }

    /// HTTP client configuration for the forwarder and hand-off.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            hand_off_timeout: Duration::from_secs(self.request_timeout),
            ..ClientConfig::default()
        }
    }

    /// Budget of the window started at intake.
    pub fn intake_budget(&self) -> DeliveryBudget {
        DeliveryBudget::new(
            Duration::from_millis(self.intake_window_ms),
            Duration::from_millis(self.attempt_timeout_ms),
        )
    }

    /// Budget of each continuation window.
    pub fn continuation_budget(&self) -> DeliveryBudget {
        DeliveryBudget::new(
            Duration::from_millis(self.continuation_window_ms),
            Duration::from_millis(self.attempt_timeout_ms),
        )
    }

    /// Window budgets and chain bound for the relay.
    pub fn to_relay_settings(&self) -> RelaySettings {
        RelaySettings {
            intake: self.intake_budget(),
            continuation: self.continuation_budget(),
            max_depth: self.max_continuation_depth,
        }
    }

    /// Continuation shared secret.
    pub fn continue_token(&self) -> ContinueToken {
        ContinueToken::new(self.continue_token.clone())
    }

    /// Base URL used for self-invocation.
    pub fn public_base_url(&self) -> String {
        self.public_url.clone().unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }

    /// Grace period for running windows on shutdown.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.backend_url.trim().is_empty() {
            anyhow::bail!("backend_url is required");
        }
        Url::parse(&self.backend_url).context("backend_url is not a valid URL")?;
        Url::parse(&self.public_base_url()).context("public_url is not a valid URL")?;

        if self.strava_verify_token.is_empty() {
            anyhow::bail!("strava_verify_token is required");
        }

        if self.continue_token.is_empty() {
            anyhow::bail!("continue_token is required");
        }

        for (name, window) in [
            ("intake_window_ms", self.intake_window_ms),
            ("continuation_window_ms", self.continuation_window_ms),
            ("attempt_timeout_ms", self.attempt_timeout_ms),
        ] {
            if window == 0 {
                anyhow::bail!("{name} must be greater than 0");
            }
            if window >= self.platform_ceiling_ms {
                anyhow::bail!(
                    "{name} ({window}) must be below platform_ceiling_ms ({})",
                    self.platform_ceiling_ms
                );
            }
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("retry_base_delay_ms cannot exceed retry_max_delay_ms");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than 0");
        }

        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend_url", &self.backend_url)
            .field("public_url", &self.public_base_url())
            .field("strava_verify_token", &"***")
            .field("continue_token", &"***")
            .field("intake_window_ms", &self.intake_window_ms)
            .field("continuation_window_ms", &self.continuation_window_ms)
            .field("attempt_timeout_ms", &self.attempt_timeout_ms)
            .field("max_continuation_depth", &self.max_continuation_depth)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_grace_seconds: default_shutdown_grace(),
            backend_url: String::new(),
            public_url: None,
            strava_verify_token: String::new(),
            continue_token: String::new(),
            intake_window_ms: default_intake_window_ms(),
            continuation_window_ms: default_continuation_window_ms(),
            platform_ceiling_ms: default_platform_ceiling_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            max_continuation_depth: default_max_depth(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_intake_window_ms() -> u64 {
    24_000
}

fn default_continuation_window_ms() -> u64 {
    20_000
}

fn default_platform_ceiling_ms() -> u64 {
    30_000
}

fn default_attempt_timeout_ms() -> u64 {
    5_000
}

fn default_max_depth() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    750
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_max_jitter_ms() -> u64 {
    300
}
