use crate::core::config::{ApiProxy, ConfigError, HttpVersion, RestExchangeOptions};
use crate::core::errors::ExchangeError;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A transport request bound to the HTTP client it was created with
#[derive(Debug)]
pub struct Request {
    inner: reqwest::Request,
    client: Client,
    version: HttpVersion,
    request_id: u64,
}

impl Request {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    /// Requested HTTP version; the client negotiates it or a lower one
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn set_query(&mut self, query: &str) {
        let query = Some(query).filter(|q| !q.is_empty());
        self.inner.url_mut().set_query(query);
    }

    pub fn set_body(&mut self, body: String, content_type: &str) -> Result<(), ExchangeError> {
        self.add_header(CONTENT_TYPE.as_str(), content_type)?;
        *self.inner.body_mut() = Some(body.into());
        Ok(())
    }

    pub fn add_header(&mut self, key: &str, value: &str) -> Result<(), ExchangeError> {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ExchangeError::ArgumentError(format!("Invalid header name '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ExchangeError::ArgumentError(format!("Invalid value for header '{}': {}", key, e)))?;
        self.inner.headers_mut().insert(name, value);
        Ok(())
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.inner.headers().get(key).and_then(|v| v.to_str().ok())
    }

    pub async fn send(self) -> Result<Response, reqwest::Error> {
        self.client.execute(self.inner).await
    }
}

/// Owns the pooled HTTP client and creates transport requests from it
///
/// The client is rebuilt whenever settings change; requests created earlier
/// keep the client handle they were created with.
#[derive(Debug, Default)]
pub struct RequestFactory {
    state: RwLock<Option<FactoryState>>,
}

#[derive(Debug)]
struct FactoryState {
    client: Client,
    options: RestExchangeOptions,
}

impl RequestFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up the factory, using `client` when given instead of building one
    pub fn configure(
        &self,
        options: RestExchangeOptions,
        client: Option<Client>,
    ) -> Result<(), ExchangeError> {
        let client = match client {
            Some(client) => client,
            None => build_http_client(&options)?,
        };
        *self.state.write().unwrap_or_else(PoisonError::into_inner) =
            Some(FactoryState { client, options });
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// # Panics
    ///
    /// Panics when called before [`configure`](Self::configure).
    pub fn create(&self, version: HttpVersion, method: Method, url: Url, request_id: u64) -> Request {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let state = state
            .as_ref()
            .expect("RequestFactory::create called before configure");
        let mut inner = reqwest::Request::new(method, url);
        // HTTP/2 stays negotiated, forcing it would fail on HTTP/1 connections
        if version == HttpVersion::Http11 {
            *inner.version_mut() = reqwest::Version::HTTP_11;
        }
        Request {
            inner,
            client: state.client.clone(),
            version,
            request_id,
        }
    }

    /// Rebuild the client with new proxy, timeout and keep-alive settings
    ///
    /// # Panics
    ///
    /// Panics when called before [`configure`](Self::configure).
    pub fn update_settings(
        &self,
        proxy: Option<ApiProxy>,
        request_timeout: Duration,
        keep_alive_interval: Option<Duration>,
    ) -> Result<(), ExchangeError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let state = state
            .as_mut()
            .expect("RequestFactory::update_settings called before configure");

        let mut options = state.options.clone();
        options.base.proxy = proxy;
        options.base.request_timeout = request_timeout;
        options.http_keep_alive_interval = keep_alive_interval;

        state.client = build_http_client(&options)?;
        state.options = options;
        debug!(timeout = ?request_timeout, "Rebuilt HTTP client with updated settings");
        Ok(())
    }

    /// Whether the configured client was built from the same client settings
    ///
    /// Only the settings that shape the HTTP client are compared. An
    /// unconfigured factory matches nothing.
    pub fn matches_client_settings(&self, options: &RestExchangeOptions) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = state.as_ref() else {
            return false;
        };
        let current = &state.options;
        let same_proxy = match (&current.base.proxy, &options.base.proxy) {
            (None, None) => true,
            (Some(a), Some(b)) => a.host == b.host && a.port == b.port && a.login == b.login,
            _ => false,
        };
        same_proxy
            && current.base.request_timeout == options.base.request_timeout
            && current.user_agent == options.user_agent
            && current.http_version == options.http_version
            && current.http_keep_alive_interval == options.http_keep_alive_interval
            && current.http_pooled_connection_lifetime == options.http_pooled_connection_lifetime
            && current.http_pooled_connection_idle_timeout
                == options.http_pooled_connection_idle_timeout
            && current.http_max_connections_per_server == options.http_max_connections_per_server
    }

    pub fn options(&self) -> Option<RestExchangeOptions> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|state| state.options.clone())
    }
}

/// Build a pooled HTTP client from REST options
pub fn build_http_client(options: &RestExchangeOptions) -> Result<Client, ExchangeError> {
    // reqwest only evicts idle connections, so the lifetime bounds the idle timeout
    let idle_timeout = options
        .http_pooled_connection_idle_timeout
        .min(options.http_pooled_connection_lifetime);

    let mut builder = Client::builder()
        .timeout(options.base.request_timeout)
        .user_agent(options.user_agent.as_str())
        .tcp_keepalive(options.http_keep_alive_interval)
        .pool_idle_timeout(idle_timeout)
        .pool_max_idle_per_host(options.http_max_connections_per_server);

    if options.http_version == HttpVersion::Http11 {
        builder = builder.http1_only();
    }
    if let Some(proxy) = &options.base.proxy {
        builder = builder.proxy(proxy.to_reqwest()?);
    }

    builder.build().map_err(|e| {
        ConfigError::InvalidConfiguration(format!("Failed to build HTTP client: {}", e)).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://api.example.com/api/v3/ticker").unwrap()
    }

    #[test]
    #[should_panic(expected = "before configure")]
    fn test_create_requires_configure() {
        let factory = RequestFactory::new();
        factory.create(HttpVersion::Http11, Method::GET, url(), 1);
    }

    #[test]
    fn test_create_request() {
        let factory = RequestFactory::new();
        factory
            .configure(RestExchangeOptions::default(), None)
            .unwrap();
        assert!(factory.is_configured());

        let mut request = factory.create(HttpVersion::Http2, Method::POST, url(), 9);
        request.set_query("a=1&b=2");
        request
            .set_body("{}".to_string(), "application/json")
            .unwrap();

        assert_eq!(request.request_id(), 9);
        assert_eq!(*request.method(), Method::POST);
        assert_eq!(request.url().query(), Some("a=1&b=2"));
        assert_eq!(request.header("content-type"), Some("application/json"));

        request.set_query("");
        assert_eq!(request.url().query(), None);
    }

    #[test]
    fn test_invalid_header_rejected() {
        let factory = RequestFactory::new();
        factory
            .configure(RestExchangeOptions::default(), None)
            .unwrap();
        let mut request = factory.create(HttpVersion::Http11, Method::GET, url(), 1);
        assert!(request.add_header("bad header", "x").is_err());
    }

    #[test]
    fn test_update_settings_rebuilds_client() {
        let factory = RequestFactory::new();
        factory
            .configure(RestExchangeOptions::default(), None)
            .unwrap();
        factory
            .update_settings(
                Some(ApiProxy::new("http://127.0.0.1", 3128)),
                Duration::from_secs(3),
                None,
            )
            .unwrap();

        let options = factory.options().unwrap();
        assert_eq!(options.base.request_timeout, Duration::from_secs(3));
        assert!(options.base.proxy.is_some());
        assert_eq!(options.http_keep_alive_interval, None);
    }

    #[test]
    fn test_create_pins_http11_version() {
        let factory = RequestFactory::new();
        factory
            .configure(RestExchangeOptions::default(), None)
            .unwrap();

        let request = factory.create(HttpVersion::Http11, Method::GET, url(), 1);
        assert_eq!(request.version(), HttpVersion::Http11);
        assert_eq!(request.inner.version(), reqwest::Version::HTTP_11);
    }

    #[test]
    fn test_matches_client_settings() {
        let factory = RequestFactory::new();
        assert!(!factory.matches_client_settings(&RestExchangeOptions::default()));

        factory
            .configure(RestExchangeOptions::default(), None)
            .unwrap();
        assert!(factory.matches_client_settings(&RestExchangeOptions::default()));

        let mut slower = RestExchangeOptions::default();
        slower.base.request_timeout = Duration::from_secs(60);
        assert!(!factory.matches_client_settings(&slower));

        // caching is not a client setting
        let mut cached = RestExchangeOptions::default();
        cached.caching_enabled = !cached.caching_enabled;
        assert!(factory.matches_client_settings(&cached));
    }
}
