use crate::core::config::SocketExchangeOptions;
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{MessageType, ReceivedMessage, WsCodec};
use crate::core::result::CallResult;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;
type WsFrame = Option<Result<Message, tokio_tungstenite::tungstenite::Error>>;

/// Callback for messages routed to a subscription id
pub type MessageHandler = Arc<dyn Fn(ReceivedMessage) + Send + Sync>;

/// Lifecycle of a [`WebSocketConnection`]; `Closed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// A single duplex socket bound to one URI
///
/// After [`connect`](Self::connect) succeeds, [`start_processing`](Self::start_processing)
/// spawns the one reader task that answers pings, enforces the no-data
/// timeout and routes every frame through the codec: events go to the
/// handler registered for their id, responses to the pending request
/// waiting on that id.
pub struct WebSocketConnection {
    id: u64,
    uri: String,
    codec: Arc<dyn WsCodec>,
    options: SocketExchangeOptions,
    state: watch::Sender<ConnectionState>,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    reader: Mutex<Option<WsReader>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    handlers: RwLock<HashMap<String, MessageHandler>>,
    pending: Mutex<HashMap<String, oneshot::Sender<ReceivedMessage>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl WebSocketConnection {
    pub fn new(
        uri: impl Into<String>,
        codec: Arc<dyn WsCodec>,
        options: SocketExchangeOptions,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            id: 0,
            uri: uri.into(),
            codec,
            options,
            state,
            writer: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            reader_task: Mutex::new(None),
            handlers: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Tag used in log events to tell sockets apart
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the socket. Failures are logged and reported as `false`, leaving
    /// the connection `Disconnected`; a closed connection never reconnects.
    #[instrument(skip(self), fields(socket = self.id, uri = %self.uri))]
    pub async fn connect(&self) -> bool {
        let mut previous = ConnectionState::Disconnected;
        let claimed = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            if previous != ConnectionState::Connected {
                warn!(state = ?previous, "Connect called on a socket that can't connect");
            }
            return previous == ConnectionState::Connected;
        }

        let attempt =
            tokio::time::timeout(self.options.connect_timeout, connect_async(self.uri.as_str()))
                .await;
        match attempt {
            Ok(Ok((stream, _))) => {
                let (write, read) = stream.split();
                *self.writer.lock().await = Some(write);
                *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(read);
                self.state.send_replace(ConnectionState::Connected);
                debug!("Socket connected");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Socket connection failed");
                self.state.send_replace(ConnectionState::Disconnected);
                false
            }
            Err(_) => {
                warn!(timeout = ?self.options.connect_timeout, "Socket connection timed out");
                self.state.send_replace(ConnectionState::Disconnected);
                false
            }
        }
    }

    /// Spawn the reader task for a connected socket
    pub fn start_processing(self: &Arc<Self>) -> Result<(), ExchangeError> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                ExchangeError::WebSocketError(
                    "Socket is not connected or is already processing".to_string(),
                )
            })?;

        let connection = Arc::clone(self);
        let task = tokio::spawn(async move { connection.run_reader(reader).await });
        *self
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    pub fn add_handler(&self, id: impl Into<String>, handler: MessageHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), handler);
    }

    pub fn remove_handler(&self, id: &str) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ExchangeError> {
        let text = text.into();
        trace!(socket = self.id, data = %text, "Sending message");
        self.send_message(Message::Text(text)).await
    }

    /// Send a request and wait for the response the codec routes to `id`
    ///
    /// Fails with `ArgumentError` if a request with the same id is still
    /// pending, and with the codec's error if the response reports one.
    pub async fn send_and_wait(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
    ) -> CallResult<ReceivedMessage> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.entry(id.clone()) {
                Entry::Occupied(_) => {
                    return CallResult::failure(ExchangeError::ArgumentError(format!(
                        "A request with id '{}' is already pending",
                        id
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(tx);
                }
            }
        }

        if let Err(e) = self.send_text(text).await {
            self.remove_pending(&id);
            return CallResult::failure(e);
        }

        let timeout = self.options.socket_response_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => match self.codec.response_error(&message) {
                Some(e) => {
                    debug!(socket = self.id, id = %id, error = %e, "Request rejected");
                    CallResult::failure(e)
                }
                None => CallResult::success(message),
            },
            Ok(Err(_)) => CallResult::failure(ExchangeError::WebSocketError(
                "Connection closed before a response was received".to_string(),
            )),
            Err(_) => {
                self.remove_pending(&id);
                CallResult::failure(ExchangeError::Timeout(format!(
                    "No response for '{}' within {:?}",
                    id, timeout
                )))
            }
        }
    }

    /// Send a close frame and stop processing
    #[instrument(skip(self), fields(socket = self.id))]
    pub async fn close(&self) {
        self.shutdown.cancel();

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.send(Message::Close(None)).await {
                debug!(error = %e, "Failed to send close frame");
            }
            let _ = writer.close().await;
        }

        let task = self
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }

        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.mark_closed();
    }

    /// Stop the reader task without waiting for it
    pub fn abort(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once the connection is closed
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }

    async fn send_message(&self, message: Message) -> Result<(), ExchangeError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or_else(|| {
            ExchangeError::WebSocketError("Socket is not connected".to_string())
        })?;
        writer
            .send(message)
            .await
            .map_err(|e| ExchangeError::WebSocketError(format!("Failed to send message: {}", e)))
    }

    async fn run_reader(self: Arc<Self>, mut reader: WsReader) {
        let no_data_timeout = self.options.socket_no_data_timeout;
        loop {
            let frame = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                frame = next_frame(&mut reader, no_data_timeout) => frame,
            };

            let message = match frame {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    warn!(socket = self.id, error = %e, "Socket read failed");
                    break;
                }
                Ok(None) => {
                    debug!(socket = self.id, "Socket stream ended");
                    break;
                }
                Err(_) => {
                    warn!(socket = self.id, timeout = ?no_data_timeout, "No data received, closing socket");
                    break;
                }
            };

            match message {
                Message::Text(text) => self.dispatch(text),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => self.dispatch(text),
                    Err(e) => warn!(socket = self.id, error = %e, "Dropping non UTF-8 binary frame"),
                },
                Message::Ping(payload) => {
                    if let Err(e) = self.send_message(Message::Pong(payload)).await {
                        warn!(socket = self.id, error = %e, "Failed to answer ping");
                    }
                }
                Message::Close(frame) => {
                    debug!(socket = self.id, ?frame, "Received close frame");
                    break;
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.close().await;
        }
        self.mark_closed();
    }

    fn dispatch(&self, data: String) {
        let mut message = ReceivedMessage::new(data);
        message.message_type = self.codec.identify_message_type(&message);
        let id = self.codec.message_id(&message);
        trace!(
            socket = self.id,
            message_type = ?message.message_type,
            id = ?id,
            data = %message.data,
            "Received message"
        );

        match (message.message_type, id) {
            (MessageType::Response, Some(id)) => {
                let waiter = self.remove_pending(&id);
                match waiter {
                    Some(waiter) => {
                        if waiter.send(message).is_err() {
                            debug!(socket = self.id, id = %id, "Response arrived after waiter gave up");
                        }
                    }
                    None => self.invoke_handler(&id, message),
                }
            }
            (MessageType::Event, Some(id)) => self.invoke_handler(&id, message),
            (message_type, id) => {
                trace!(socket = self.id, ?message_type, ?id, "Unhandled message");
            }
        }
    }

    fn invoke_handler(&self, id: &str, message: ReceivedMessage) {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        match handler {
            Some(handler) => handler(message),
            None => debug!(socket = self.id, id, "No handler registered for message"),
        }
    }

    fn remove_pending(&self, id: &str) -> Option<oneshot::Sender<ReceivedMessage>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn mark_closed(&self) {
        if self.state.send_replace(ConnectionState::Closed) != ConnectionState::Closed {
            debug!(socket = self.id, "Socket closed");
        }
        // dropping the senders fails every outstanding request
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

async fn next_frame(
    reader: &mut WsReader,
    timeout: Option<Duration>,
) -> Result<WsFrame, Elapsed> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, reader.next()).await,
        None => Ok(reader.next().await),
    }
}
