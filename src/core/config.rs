use crate::core::kernel::rate_limit::RateLimitingBehaviour;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::time::Duration;
use url::Url;

/// API key pair used to sign authenticated requests
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub key: Secret<String>,
    pub secret: Secret<String>,
}

// Never expose secrets in serialization
impl Serialize for ApiCredentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ApiCredentials", 2)?;
        state.serialize_field("key", "[REDACTED]")?;
        state.serialize_field("secret", "[REDACTED]")?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ApiCredentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ApiCredentialsHelper {
            key: String,
            secret: String,
        }

        let helper = ApiCredentialsHelper::deserialize(deserializer)?;
        Ok(Self::new(helper.key, helper.secret))
    }
}

impl ApiCredentials {
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: Secret::new(key.into()),
            secret: Secret::new(secret.into()),
        }
    }

    /// Read credentials from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY` (e.g., `BINANCE_API_KEY`)
    /// - `{PREFIX}_SECRET_KEY` (e.g., `BINANCE_SECRET_KEY`)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let key_var = format!("{}_API_KEY", prefix.to_uppercase());
        let secret_var = format!("{}_SECRET_KEY", prefix.to_uppercase());

        let key =
            env::var(&key_var).map_err(|_| ConfigError::MissingEnvironmentVariable(key_var))?;
        let secret = env::var(&secret_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_var))?;

        Ok(Self::new(key, secret))
    }

    /// Load a `.env` file (if present) and then read credentials from the environment
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            // a missing file falls back to the process environment
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key.expose_secret().is_empty() || self.secret.expose_secret().is_empty()
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.key.expose_secret()
    }

    /// Get secret (use carefully - exposes secret)
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

/// Proxy used by the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiProxy {
    /// Host including scheme, e.g. `http://127.0.0.1`
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<Secret<String>>,
}

impl ApiProxy {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            login: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_login(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self.password = Some(Secret::new(password.into()));
        self
    }

    pub fn to_reqwest(&self) -> Result<reqwest::Proxy, ConfigError> {
        let address = format!("{}:{}", self.host, self.port);
        let mut proxy = reqwest::Proxy::all(&address).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("Invalid proxy '{}': {}", address, e))
        })?;
        if let Some(login) = &self.login {
            let password = self
                .password
                .as_ref()
                .map(|p| p.expose_secret().as_str())
                .unwrap_or_default();
            proxy = proxy.basic_auth(login, password);
        }
        Ok(proxy)
    }
}

/// Options shared by REST and socket clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeOptions {
    pub proxy: Option<ApiProxy>,
    pub credentials: Option<ApiCredentials>,
    pub request_timeout: Duration,
    pub rate_limiter_enabled: bool,
    pub rate_limiting_behaviour: RateLimitingBehaviour,
    /// Keep the raw response text next to the typed data
    pub output_original_data: bool,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            credentials: None,
            request_timeout: Duration::from_secs(20),
            rate_limiter_enabled: true,
            rate_limiting_behaviour: RateLimitingBehaviour::Wait,
            output_original_data: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpVersion {
    Http11,
    #[default]
    Http2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestExchangeOptions {
    pub base: ExchangeOptions,
    pub user_agent: String,
    pub http_version: HttpVersion,
    pub http_keep_alive_interval: Option<Duration>,
    pub http_pooled_connection_lifetime: Duration,
    pub http_pooled_connection_idle_timeout: Duration,
    pub http_max_connections_per_server: usize,
    pub caching_enabled: bool,
    pub caching_max_age: Duration,
    pub auto_timestamp: bool,
    pub timestamp_recalculation_interval: Duration,
}

impl Default for RestExchangeOptions {
    fn default() -> Self {
        Self {
            base: ExchangeOptions::default(),
            user_agent: concat!("exchange-net/", env!("CARGO_PKG_VERSION")).to_string(),
            http_version: HttpVersion::default(),
            http_keep_alive_interval: Some(Duration::from_secs(15)),
            http_pooled_connection_lifetime: Duration::from_secs(15 * 60),
            http_pooled_connection_idle_timeout: Duration::from_secs(2 * 60),
            http_max_connections_per_server: 100,
            caching_enabled: false,
            caching_max_age: Duration::from_secs(5),
            auto_timestamp: true,
            timestamp_recalculation_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl RestExchangeOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.base.request_timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.base.credentials = Some(credentials);
        self
    }

    pub fn with_proxy(mut self, proxy: ApiProxy) -> Self {
        self.base.proxy = Some(proxy);
        self
    }

    pub fn with_http_version(mut self, version: HttpVersion) -> Self {
        self.http_version = version;
        self
    }

    pub fn with_caching(mut self, max_age: Duration) -> Self {
        self.caching_enabled = true;
        self.caching_max_age = max_age;
        self
    }

    pub fn with_rate_limiting(mut self, behaviour: RateLimitingBehaviour) -> Self {
        self.base.rate_limiter_enabled = true;
        self.base.rate_limiting_behaviour = behaviour;
        self
    }

    pub fn with_original_data(mut self, enabled: bool) -> Self {
        self.base.output_original_data = enabled;
        self
    }

    /// Apply API-level overrides on top of these client-level options
    #[must_use]
    pub fn merged_with(&self, api: &ApiOptions) -> Self {
        let mut merged = self.clone();
        api.apply_to(&mut merged.base);
        if let Some(auto_timestamp) = api.auto_timestamp {
            merged.auto_timestamp = auto_timestamp;
        }
        if let Some(interval) = api.timestamp_recalculation_interval {
            merged.timestamp_recalculation_interval = interval;
        }
        merged
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketExchangeOptions {
    pub base: ExchangeOptions,
    pub auto_reconnect: bool,
    pub reconnect_interval: Duration,
    pub max_reconnect_tries: Option<u32>,
    pub max_resubscribe_tries: Option<u32>,
    pub max_concurrent_resubscriptions_per_socket: u32,
    pub socket_response_timeout: Duration,
    /// Close the connection when nothing arrives for this long
    pub socket_no_data_timeout: Option<Duration>,
    pub socket_subscriptions_combine_target: Option<u32>,
    pub connect_timeout: Duration,
}

impl Default for SocketExchangeOptions {
    fn default() -> Self {
        Self {
            base: ExchangeOptions::default(),
            auto_reconnect: true,
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_tries: None,
            max_resubscribe_tries: Some(5),
            max_concurrent_resubscriptions_per_socket: 5,
            socket_response_timeout: Duration::from_secs(10),
            socket_no_data_timeout: None,
            socket_subscriptions_combine_target: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SocketExchangeOptions {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.socket_response_timeout = timeout;
        self
    }

    pub fn with_no_data_timeout(mut self, timeout: Duration) -> Self {
        self.socket_no_data_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_original_data(mut self, enabled: bool) -> Self {
        self.base.output_original_data = enabled;
        self
    }

    #[must_use]
    pub fn merged_with(&self, api: &ApiOptions) -> Self {
        let mut merged = self.clone();
        api.apply_to(&mut merged.base);
        if let Some(timeout) = api.socket_response_timeout {
            merged.socket_response_timeout = timeout;
        }
        merged
    }
}

/// Per-API overrides; every set field wins over the client-level value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOptions {
    pub base_address: Option<String>,
    pub credentials: Option<ApiCredentials>,
    pub request_timeout: Option<Duration>,
    pub rate_limiter_enabled: Option<bool>,
    pub rate_limiting_behaviour: Option<RateLimitingBehaviour>,
    pub output_original_data: Option<bool>,
    pub auto_timestamp: Option<bool>,
    pub timestamp_recalculation_interval: Option<Duration>,
    pub socket_response_timeout: Option<Duration>,
}

impl ApiOptions {
    pub fn with_base_address(mut self, address: impl Into<String>) -> Self {
        self.base_address = Some(address.into());
        self
    }

    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Resolve an endpoint path against the configured base address
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        let base = self.base_address.as_deref().ok_or_else(|| {
            ConfigError::InvalidConfiguration("No base address configured".to_string())
        })?;
        let base = Url::parse(base).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("Invalid base address '{}': {}", base, e))
        })?;
        base.join(path).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("Invalid endpoint '{}': {}", path, e))
        })
    }

    fn apply_to(&self, base: &mut ExchangeOptions) {
        if let Some(credentials) = &self.credentials {
            base.credentials = Some(credentials.clone());
        }
        if let Some(timeout) = self.request_timeout {
            base.request_timeout = timeout;
        }
        if let Some(enabled) = self.rate_limiter_enabled {
            base.rate_limiter_enabled = enabled;
        }
        if let Some(behaviour) = self.rate_limiting_behaviour {
            base.rate_limiting_behaviour = behaviour;
        }
        if let Some(output) = self.output_original_data {
            base.output_original_data = output;
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
