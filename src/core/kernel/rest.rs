use crate::core::config::{ConfigError, RestExchangeOptions};
use crate::core::errors::ExchangeError;
use crate::core::kernel::cache::ResponseCache;
use crate::core::kernel::error_mapping::{ErrorMapper, ErrorMapping};
use crate::core::kernel::rate_limit::RateLimiter;
use crate::core::kernel::request_factory::{Request, RequestFactory};
use crate::core::kernel::serializer::{
    DataDeserializer, DataSerializer, JsonBodySerializer, JsonDeserializer,
    UrlParametersSerializer,
};
use crate::core::kernel::signer::{HmacSigner, HmacStyle, Signer};
use crate::core::kernel::time_sync::TimeSyncState;
use crate::core::result::{ResponseInfo, WebCallResult};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};
use url::Url;

/// Where the serialized payload of a request goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterPosition {
    InUri,
    InBody,
}

impl ParameterPosition {
    /// Query parameters for GET and DELETE, body for everything else
    pub fn for_method(method: &Method) -> Self {
        if *method == Method::GET || *method == Method::DELETE {
            Self::InUri
        } else {
            Self::InBody
        }
    }
}

/// Everything needed to execute one REST call
#[derive(Debug, Clone)]
pub struct RequestData<T> {
    pub method: Method,
    pub address: Url,
    pub payload: T,
    pub parameter_position: ParameterPosition,
    pub authenticated: bool,
    /// Rate limit weight of the request
    pub weight: u32,
    pub request_id: Option<u64>,
}

impl<T> RequestData<T> {
    pub fn new(method: Method, address: Url, payload: T) -> Self {
        let parameter_position = ParameterPosition::for_method(&method);
        Self {
            method,
            address,
            payload,
            parameter_position,
            authenticated: false,
            weight: 1,
            request_id: None,
        }
    }

    pub fn with_parameter_position(mut self, position: ParameterPosition) -> Self {
        self.parameter_position = position;
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Executes typed REST calls and returns a uniform result envelope
///
/// Implementations never return errors out of band: every failure, from
/// serialization to server errors, ends up in the returned [`WebCallResult`].
#[async_trait]
pub trait DataRequester: Send + Sync {
    async fn request<I, O>(&self, data: &RequestData<I>) -> WebCallResult<O>
    where
        I: Serialize + Send + Sync,
        O: DeserializeOwned + Send,
    {
        self.request_with_cancellation(data, &CancellationToken::new())
            .await
    }

    async fn request_with_cancellation<I, O>(
        &self,
        data: &RequestData<I>,
        cancellation: &CancellationToken,
    ) -> WebCallResult<O>
    where
        I: Serialize + Send + Sync,
        O: DeserializeOwned + Send;
}

/// Builder for [`RestDataRequester`]
pub struct RestDataRequesterBuilder<D: DataDeserializer = JsonDeserializer> {
    exchange_name: String,
    options: RestExchangeOptions,
    factory: Option<Arc<RequestFactory>>,
    http_client: Option<Client>,
    url_serializer: Arc<dyn DataSerializer>,
    body_serializer: Arc<dyn DataSerializer>,
    deserializer: D,
    error_mapper: Arc<dyn ErrorMapper>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    signer: Option<Arc<dyn Signer>>,
}

impl RestDataRequesterBuilder<JsonDeserializer> {
    pub fn new(exchange_name: impl Into<String>, options: RestExchangeOptions) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            options,
            factory: None,
            http_client: None,
            url_serializer: Arc::new(UrlParametersSerializer::default()),
            body_serializer: Arc::new(JsonBodySerializer),
            deserializer: JsonDeserializer,
            error_mapper: Arc::new(ErrorMapping::default()),
            rate_limiter: None,
            signer: None,
        }
    }
}

impl<D: DataDeserializer> RestDataRequesterBuilder<D> {
    pub fn with_url_serializer(mut self, serializer: Arc<dyn DataSerializer>) -> Self {
        self.url_serializer = serializer;
        self
    }

    pub fn with_body_serializer(mut self, serializer: Arc<dyn DataSerializer>) -> Self {
        self.body_serializer = serializer;
        self
    }

    pub fn with_deserializer<D2: DataDeserializer>(
        self,
        deserializer: D2,
    ) -> RestDataRequesterBuilder<D2> {
        RestDataRequesterBuilder {
            exchange_name: self.exchange_name,
            options: self.options,
            factory: self.factory,
            http_client: self.http_client,
            url_serializer: self.url_serializer,
            body_serializer: self.body_serializer,
            deserializer,
            error_mapper: self.error_mapper,
            rate_limiter: self.rate_limiter,
            signer: self.signer,
        }
    }

    pub fn with_error_mapper(mut self, mapper: Arc<dyn ErrorMapper>) -> Self {
        self.error_mapper = mapper;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Share a request factory between requesters
    ///
    /// A factory that is already configured must have been set up with the
    /// same HTTP client settings, otherwise `build` fails.
    pub fn with_request_factory(mut self, factory: Arc<RequestFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Use an existing HTTP client instead of building one from the options
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<RestDataRequester<D>, ExchangeError> {
        let factory = self.factory.unwrap_or_default();
        if !factory.is_configured() {
            factory.configure(self.options.clone(), self.http_client)?;
        } else if self.http_client.is_some() {
            return Err(ConfigError::InvalidConfiguration(
                "An HTTP client can't be given with an already configured request factory"
                    .to_string(),
            )
            .into());
        } else if !factory.matches_client_settings(&self.options) {
            return Err(ConfigError::InvalidConfiguration(
                "Options conflict with the HTTP client settings of the shared request factory"
                    .to_string(),
            )
            .into());
        }

        // credentials alone are enough for the default signing scheme
        let signer = self.signer.or_else(|| {
            self.options
                .base
                .credentials
                .clone()
                .filter(|c| !c.is_empty())
                .map(|c| Arc::new(HmacSigner::new(c, HmacStyle::QueryString)) as Arc<dyn Signer>)
        });

        let cache = self
            .options
            .caching_enabled
            .then(|| ResponseCache::new(self.options.caching_max_age));
        let time_sync = TimeSyncState::new(
            self.options.auto_timestamp,
            self.options.timestamp_recalculation_interval,
        );

        Ok(RestDataRequester {
            exchange_name: self.exchange_name,
            options: self.options,
            factory,
            url_serializer: self.url_serializer,
            body_serializer: self.body_serializer,
            deserializer: self.deserializer,
            error_mapper: self.error_mapper,
            rate_limiter: self.rate_limiter,
            signer,
            cache,
            time_sync,
            next_request_id: AtomicU64::new(1),
        })
    }
}

/// [`DataRequester`] over a pooled reqwest client
pub struct RestDataRequester<D: DataDeserializer = JsonDeserializer> {
    exchange_name: String,
    options: RestExchangeOptions,
    factory: Arc<RequestFactory>,
    url_serializer: Arc<dyn DataSerializer>,
    body_serializer: Arc<dyn DataSerializer>,
    deserializer: D,
    error_mapper: Arc<dyn ErrorMapper>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    signer: Option<Arc<dyn Signer>>,
    cache: Option<ResponseCache>,
    time_sync: TimeSyncState,
    next_request_id: AtomicU64,
}

impl<D: DataDeserializer> std::fmt::Debug for RestDataRequester<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestDataRequester")
            .field("exchange_name", &self.exchange_name)
            .field("has_signer", &self.signer.is_some())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .field("caching", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Raw outcome of a network call
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    elapsed: Duration,
    from_cache: bool,
}

impl<D: DataDeserializer> RestDataRequester<D> {
    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn options(&self) -> &RestExchangeOptions {
        &self.options
    }

    pub fn request_factory(&self) -> &Arc<RequestFactory> {
        &self.factory
    }

    pub fn time_sync(&self) -> &TimeSyncState {
        &self.time_sync
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn serializer_for(&self, position: ParameterPosition) -> &dyn DataSerializer {
        match position {
            ParameterPosition::InUri => self.url_serializer.as_ref(),
            ParameterPosition::InBody => self.body_serializer.as_ref(),
        }
    }

    fn serialize_payload<I: Serialize>(
        &self,
        data: &RequestData<I>,
    ) -> Result<String, ExchangeError> {
        let value = serde_json::to_value(&data.payload).map_err(|e| {
            ExchangeError::SerializationError(format!("Failed to serialize payload: {}", e))
        })?;
        self.serializer_for(data.parameter_position).serialize(&value)
    }

    /// Create the transport request with payload applied; returns the query
    /// and body the request carries so they can be signed later
    fn build_request<I>(
        &self,
        data: &RequestData<I>,
        request_id: u64,
        serialized: String,
    ) -> Result<(Request, String, String), ExchangeError> {
        let mut request = self.factory.create(
            self.options.http_version,
            data.method.clone(),
            data.address.clone(),
            request_id,
        );

        let existing_query = data.address.query().unwrap_or_default();
        let (query, body) = match data.parameter_position {
            ParameterPosition::InUri => (join_query(existing_query, &serialized), String::new()),
            ParameterPosition::InBody => (existing_query.to_string(), serialized),
        };

        request.set_query(&query);
        if !body.is_empty() {
            let content_type = self.serializer_for(data.parameter_position).content_type();
            request.set_body(body.clone(), content_type)?;
        }
        Ok((request, query, body))
    }

    fn sign(&self, request: &mut Request, query: &str, body: &str) -> Result<(), ExchangeError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            ExchangeError::AuthError("Authentication required but no signer provided".to_string())
        })?;

        let timestamp = self.time_sync.timestamp_ms();
        let (headers, signed_params) = signer.sign_request(
            request.method().as_str(),
            request.url().path(),
            query,
            body.as_bytes(),
            timestamp,
        )?;

        for (key, value) in headers {
            request.add_header(&key, &value)?;
        }
        request.set_query(&create_query_string(&signed_params));
        Ok(())
    }

    async fn acquire_rate_limit(
        &self,
        weight: u32,
        cancellation: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let Some(limiter) = self
            .rate_limiter
            .as_ref()
            .filter(|_| self.options.base.rate_limiter_enabled)
        else {
            return Ok(());
        };

        tokio::select! {
            biased;
            () = cancellation.cancelled() => Err(ExchangeError::Cancelled),
            result = limiter.acquire(weight, self.options.base.rate_limiting_behaviour) => result,
        }
    }

    async fn transmit(
        request: Request,
        cancellation: &CancellationToken,
    ) -> Result<RawResponse, ExchangeError> {
        let started = Instant::now();
        let exchange = async {
            let response = request.send().await.map_err(transport_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(transport_error)?;
            Ok::<_, ExchangeError>((status, headers, body.to_vec()))
        };

        let (status, headers, body) = tokio::select! {
            biased;
            () = cancellation.cancelled() => return Err(ExchangeError::Cancelled),
            result = exchange => result?,
        };

        Ok(RawResponse {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
            from_cache: false,
        })
    }

    async fn execute<I>(
        &self,
        data: &RequestData<I>,
        request_id: u64,
        cancellation: &CancellationToken,
    ) -> Result<(RawResponse, String), ExchangeError>
    where
        I: Serialize + Send + Sync,
    {
        let serialized = self.serialize_payload(data)?;
        if data.authenticated && self.signer.is_none() {
            return Err(ExchangeError::AuthError(
                "Authentication required but no signer provided".to_string(),
            ));
        }

        let (mut request, query, body) = self.build_request(data, request_id, serialized)?;

        let cache = self
            .cache
            .as_ref()
            .filter(|_| data.method == Method::GET && !data.authenticated);
        let cache_key = format!("{} {}", data.method, request.url());
        if let Some(hit) = cache.and_then(|c| c.get(&cache_key)) {
            debug!("Returning cached response");
            let raw = RawResponse {
                status: hit.status,
                headers: hit.headers,
                body: hit.body,
                elapsed: Duration::ZERO,
                from_cache: true,
            };
            return Ok((raw, request.url().to_string()));
        }

        self.acquire_rate_limit(data.weight, cancellation).await?;

        if data.authenticated {
            self.sign(&mut request, &query, &body)?;
        }

        let address = request.url().to_string();
        trace!(request_id, address = %address, body = %body, "Sending request");
        let raw = Self::transmit(request, cancellation).await?;

        if let Some(cache) = cache.filter(|_| raw.status.is_success()) {
            cache.insert(cache_key, raw.status, raw.headers.clone(), raw.body.clone());
        }
        Ok((raw, address))
    }
}

#[async_trait]
impl<D: DataDeserializer> DataRequester for RestDataRequester<D> {
    #[instrument(
        skip(self, data, cancellation),
        fields(exchange = %self.exchange_name, method = %data.method, address = %data.address)
    )]
    async fn request_with_cancellation<I, O>(
        &self,
        data: &RequestData<I>,
        cancellation: &CancellationToken,
    ) -> WebCallResult<O>
    where
        I: Serialize + Send + Sync,
        O: DeserializeOwned + Send,
    {
        let request_id = data
            .request_id
            .unwrap_or_else(|| self.next_request_id.fetch_add(1, Ordering::Relaxed));

        let (raw, address) = match self.execute(data, request_id, cancellation).await {
            Ok(result) => result,
            Err(e) => {
                warn!(request_id, error = %e, "Request failed");
                return WebCallResult::failure(e);
            }
        };

        let info = ResponseInfo {
            status: raw.status,
            headers: raw.headers,
            elapsed: raw.elapsed,
            address,
            method: data.method.clone(),
            request_id,
            from_cache: raw.from_cache,
        };
        trace!(
            request_id,
            status = %info.status,
            elapsed_ms = info.elapsed.as_millis() as u64,
            body = %String::from_utf8_lossy(&raw.body),
            "Received response"
        );

        let original_data = self
            .options
            .base
            .output_original_data
            .then(|| String::from_utf8_lossy(&raw.body).into_owned());

        if !info.status.is_success() {
            let error = self
                .error_mapper
                .parse_error_response(info.status.as_u16(), &raw.body);
            warn!(request_id, status = %info.status, error = %error, "Request returned error");
            return WebCallResult::failure(error)
                .with_response(info)
                .with_original_data(original_data);
        }

        let result = match self.deserializer.deserialize::<O>(&raw.body) {
            Ok(value) => WebCallResult::success(value),
            Err(e) => {
                warn!(request_id, error = %e, "Failed to deserialize response");
                WebCallResult::failure(e)
            }
        };
        result.with_response(info).with_original_data(original_data)
    }
}

fn transport_error(error: reqwest::Error) -> ExchangeError {
    if error.is_timeout() {
        ExchangeError::Timeout(error.to_string())
    } else {
        ExchangeError::server(error.to_string())
    }
}

fn join_query(existing: &str, extra: &str) -> String {
    match (existing.is_empty(), extra.is_empty()) {
        (true, _) => extra.to_string(),
        (false, true) => existing.to_string(),
        (false, false) => format!("{}&{}", existing, extra),
    }
}

/// Query string from already-encoded pairs
fn create_query_string(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
