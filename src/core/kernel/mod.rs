/// Exchange-agnostic transport layer shared by all exchange clients
///
/// The kernel holds only transport logic and the seams exchange clients plug
/// into. Exchange code supplies serialization rules, endpoint shapes, error
/// mapping and message classification; the kernel does the rest.
///
/// # Architecture
///
/// ## REST
/// - `RestDataRequester`: serialize, rate limit, sign, send, map errors,
///   deserialize into a `WebCallResult`
/// - `RequestFactory`: owns the pooled HTTP client
/// - `ResponseCache`: optional cache for public GET responses
///
/// ## WebSocket
/// - `WebSocketConnection`: one socket with a single reader task
/// - `WebSocketDataStreamer`: one dedicated socket per subscription
/// - `WsCodec`: exchange-specific message classification
///
/// ## Collaborators
/// - `DataSerializer` / `DataDeserializer`
/// - `ErrorMapper`, `RateLimiter`, `Signer`
///
/// # Example
/// ```rust,no_run
/// use exchange_net::core::config::RestExchangeOptions;
/// use exchange_net::core::kernel::*;
/// use reqwest::Method;
/// use serde_json::{json, Value};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let requester = RestDataRequesterBuilder::new("example", RestExchangeOptions::default())
///     .with_url_serializer(std::sync::Arc::new(UrlParametersSerializer::new(
///         ArrayParametersSerialization::Array,
///     )))
///     .build()?;
///
/// let data = RequestData::new(
///     Method::GET,
///     Url::parse("https://api.example.com/api/v3/ticker")?,
///     json!({"symbol": "BTCUSDT"}),
/// );
/// let ticker = requester.request::<_, Value>(&data).await.into_result()?;
/// println!("{ticker}");
/// # Ok(())
/// # }
/// ```
pub mod cache;
pub mod codec;
pub mod error_mapping;
pub mod rate_limit;
pub mod request_factory;
pub mod rest;
pub mod serializer;
pub mod signer;
pub mod streamer;
pub mod time_sync;
pub mod ws;

pub use cache::{CachedResponse, ResponseCache};
pub use codec::{FnCodec, JsonFieldCodec, MessageType, ReceivedMessage, WsCodec};
pub use error_mapping::{ErrorInfo, ErrorMapper, ErrorMapping, ErrorType};
pub use rate_limit::{GovernorRateLimiter, RateLimiter, RateLimitingBehaviour};
pub use request_factory::{build_http_client, Request, RequestFactory};
pub use rest::{
    DataRequester, ParameterPosition, RequestData, RestDataRequester, RestDataRequesterBuilder,
};
pub use serializer::{
    ArrayParametersSerialization, DataDeserializer, DataSerializer, FormDataSerializer,
    JsonBodySerializer, JsonDeserializer, UrlParametersSerializer,
};
pub use signer::{HmacSigner, HmacStyle, SignatureResult, Signer};
pub use streamer::{
    DataEvent, DataStreamer, EventHandler, StreamData, UpdateSubscription, WebSocketDataStreamer,
};
pub use time_sync::TimeSyncState;
pub use ws::{ConnectionState, MessageHandler, WebSocketConnection};
