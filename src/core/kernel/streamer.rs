use crate::core::config::SocketExchangeOptions;
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{ReceivedMessage, WsCodec};
use crate::core::kernel::serializer::{
    DataDeserializer, DataSerializer, JsonBodySerializer, JsonDeserializer,
};
use crate::core::kernel::ws::{MessageHandler, WebSocketConnection};
use crate::core::result::CallResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Callback invoked for every typed update of a subscription
pub type EventHandler<T> = Arc<dyn Fn(DataEvent<T>) + Send + Sync>;

/// One typed update received on a subscription
#[derive(Debug, Clone)]
pub struct DataEvent<T> {
    pub data: T,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    /// Raw frame text, kept when `output_original_data` is enabled
    pub original_data: Option<String>,
}

/// Subscription request for [`DataStreamer::subscribe`]
pub struct StreamData<P, T> {
    pub address: String,
    /// Id the codec assigns to this subscription's updates
    pub topic: String,
    pub subscribe_payload: P,
    pub unsubscribe_payload: Option<Value>,
    /// Response id to wait for after subscribing, if the exchange confirms
    pub confirmation_id: Option<String>,
    pub handler: EventHandler<T>,
}

impl<P, T> StreamData<P, T> {
    pub fn new(
        address: impl Into<String>,
        topic: impl Into<String>,
        subscribe_payload: P,
        handler: impl Fn(DataEvent<T>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            address: address.into(),
            topic: topic.into(),
            subscribe_payload,
            unsubscribe_payload: None,
            confirmation_id: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_unsubscribe_payload(mut self, payload: Value) -> Self {
        self.unsubscribe_payload = Some(payload);
        self
    }

    pub fn with_confirmation(mut self, response_id: impl Into<String>) -> Self {
        self.confirmation_id = Some(response_id.into());
        self
    }

    pub fn awaits_confirmation(&self) -> bool {
        self.confirmation_id.is_some()
    }
}

impl<P: std::fmt::Debug, T> std::fmt::Debug for StreamData<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamData")
            .field("address", &self.address)
            .field("topic", &self.topic)
            .field("subscribe_payload", &self.subscribe_payload)
            .field("unsubscribe_payload", &self.unsubscribe_payload)
            .field("confirmation_id", &self.confirmation_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait DataStreamer: Send + Sync {
    async fn subscribe<P, T>(&self, request: StreamData<P, T>) -> CallResult<UpdateSubscription>
    where
        P: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static;
}

/// [`DataStreamer`] opening one dedicated socket per subscription
pub struct WebSocketDataStreamer<D: DataDeserializer = JsonDeserializer> {
    exchange_name: String,
    options: SocketExchangeOptions,
    codec: Arc<dyn WsCodec>,
    serializer: Arc<dyn DataSerializer>,
    deserializer: Arc<D>,
    next_socket_id: AtomicU64,
}

impl WebSocketDataStreamer<JsonDeserializer> {
    pub fn new(
        exchange_name: impl Into<String>,
        options: SocketExchangeOptions,
        codec: Arc<dyn WsCodec>,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            options,
            codec,
            serializer: Arc::new(JsonBodySerializer),
            deserializer: Arc::new(JsonDeserializer),
            next_socket_id: AtomicU64::new(1),
        }
    }
}

impl<D: DataDeserializer + 'static> WebSocketDataStreamer<D> {
    pub fn with_serializer(mut self, serializer: Arc<dyn DataSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_deserializer<D2: DataDeserializer>(self, deserializer: D2) -> WebSocketDataStreamer<D2> {
        WebSocketDataStreamer {
            exchange_name: self.exchange_name,
            options: self.options,
            codec: self.codec,
            serializer: self.serializer,
            deserializer: Arc::new(deserializer),
            next_socket_id: self.next_socket_id,
        }
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn options(&self) -> &SocketExchangeOptions {
        &self.options
    }

    fn serialize<P: Serialize>(&self, payload: &P) -> Result<String, ExchangeError> {
        let value = serde_json::to_value(payload).map_err(|e| {
            ExchangeError::SerializationError(format!("Failed to serialize payload: {}", e))
        })?;
        self.serializer.serialize(&value)
    }

    /// Wraps the typed handler into a raw frame handler
    fn event_handler<T>(&self, topic: String, handler: EventHandler<T>) -> MessageHandler
    where
        T: DeserializeOwned + 'static,
    {
        let deserializer = Arc::clone(&self.deserializer);
        let keep_original = self.options.base.output_original_data;
        let exchange = self.exchange_name.clone();

        Arc::new(move |message: ReceivedMessage| {
            let data = match deserializer.deserialize::<T>(message.data.as_bytes()) {
                Ok(data) => data,
                Err(e) => {
                    warn!(exchange = %exchange, topic = %topic, error = %e, "Failed to deserialize stream message");
                    return;
                }
            };
            let original_data = keep_original.then_some(message.data);
            handler(DataEvent {
                data,
                topic: topic.clone(),
                timestamp: message.timestamp,
                original_data,
            });
        })
    }
}

#[async_trait]
impl<D: DataDeserializer + 'static> DataStreamer for WebSocketDataStreamer<D> {
    #[instrument(
        skip(self, request),
        fields(exchange = %self.exchange_name, address = %request.address, topic = %request.topic)
    )]
    async fn subscribe<P, T>(&self, request: StreamData<P, T>) -> CallResult<UpdateSubscription>
    where
        P: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
    {
        let StreamData {
            address,
            topic,
            subscribe_payload,
            unsubscribe_payload,
            confirmation_id,
            handler,
        } = request;

        let subscribe = match self.serialize(&subscribe_payload) {
            Ok(text) => text,
            Err(e) => return CallResult::failure(e),
        };
        let unsubscribe = match unsubscribe_payload
            .map(|payload| self.serializer.serialize(&payload))
            .transpose()
        {
            Ok(text) => text,
            Err(e) => return CallResult::failure(e),
        };

        let socket_id = self.next_socket_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(
            WebSocketConnection::new(address.as_str(), Arc::clone(&self.codec), self.options.clone())
                .with_id(socket_id),
        );
        if !connection.connect().await {
            return CallResult::failure(ExchangeError::CantConnect(format!(
                "Failed to connect to {}",
                address
            )));
        }

        connection.add_handler(topic.clone(), self.event_handler(topic.clone(), handler));
        if let Err(e) = connection.start_processing() {
            connection.close().await;
            return CallResult::failure(e);
        }

        let sent = match confirmation_id {
            Some(id) => connection
                .send_and_wait(id, subscribe)
                .await
                .as_failure::<UpdateSubscription>(),
            None => connection
                .send_text(subscribe)
                .await
                .err()
                .map(CallResult::failure),
        };
        if let Some(failure) = sent {
            warn!(socket = socket_id, error = ?failure.error(), "Subscription request failed");
            connection.close().await;
            return failure;
        }

        debug!(socket = socket_id, "Subscribed");
        CallResult::success(UpdateSubscription {
            connection,
            topic,
            unsubscribe_payload: unsubscribe,
        })
    }
}

/// Handle to a live subscription; owns its socket
///
/// Dropping the handle stops the socket without sending the unsubscribe
/// payload; use [`close`](Self::close) for an orderly shutdown.
#[derive(Debug)]
pub struct UpdateSubscription {
    connection: Arc<WebSocketConnection>,
    topic: String,
    unsubscribe_payload: Option<String>,
}

impl UpdateSubscription {
    pub fn socket_id(&self) -> u64 {
        self.connection.id()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Resolves once the socket is closed, by either side
    pub async fn closed(&self) {
        self.connection.closed().await;
    }

    /// Unsubscribe if a payload was given, then close the socket
    pub async fn close(&self) {
        if let Some(payload) = self.unsubscribe_payload.as_ref() {
            if self.connection.is_connected() {
                if let Err(e) = self.connection.send_text(payload.as_str()).await {
                    warn!(socket = self.socket_id(), error = %e, "Failed to send unsubscribe request");
                }
            }
        }
        self.connection.remove_handler(&self.topic);
        self.connection.close().await;
    }
}

impl Drop for UpdateSubscription {
    fn drop(&mut self) {
        self.connection.abort();
    }
}
