use crate::core::errors::ExchangeError;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Classification of an inbound socket frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Pushed data for a subscription
    Event,
    /// Answer to a request sent on the socket
    Response,
    Unknown,
    Other,
}

/// One inbound text frame
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub data: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
}

impl ReceivedMessage {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            timestamp: Utc::now(),
            message_type: MessageType::Unknown,
        }
    }
}

/// Exchange-specific message classification for a socket connection
///
/// The connection uses the message type to pick between subscription
/// handlers and pending request waiters, and the message id to find the
/// handler or waiter the frame belongs to.
pub trait WsCodec: Send + Sync + 'static {
    fn identify_message_type(&self, message: &ReceivedMessage) -> MessageType;

    fn message_id(&self, message: &ReceivedMessage) -> Option<String>;

    /// Error carried by a response, e.g. a rejected subscription
    fn response_error(&self, _message: &ReceivedMessage) -> Option<ExchangeError> {
        None
    }
}

/// [`WsCodec`] assembled from two plain functions
pub struct FnCodec<T, I>
where
    T: Fn(&ReceivedMessage) -> MessageType + Send + Sync + 'static,
    I: Fn(&ReceivedMessage) -> Option<String> + Send + Sync + 'static,
{
    identify: T,
    id: I,
}

impl<T, I> FnCodec<T, I>
where
    T: Fn(&ReceivedMessage) -> MessageType + Send + Sync + 'static,
    I: Fn(&ReceivedMessage) -> Option<String> + Send + Sync + 'static,
{
    pub fn new(identify: T, id: I) -> Self {
        Self { identify, id }
    }
}

impl<T, I> WsCodec for FnCodec<T, I>
where
    T: Fn(&ReceivedMessage) -> MessageType + Send + Sync + 'static,
    I: Fn(&ReceivedMessage) -> Option<String> + Send + Sync + 'static,
{
    fn identify_message_type(&self, message: &ReceivedMessage) -> MessageType {
        (self.identify)(message)
    }

    fn message_id(&self, message: &ReceivedMessage) -> Option<String> {
        (self.id)(message)
    }
}

/// Classifies JSON frames by the presence of an id field
///
/// A frame carrying `response_field` is a [`MessageType::Response`] for that
/// id; otherwise a frame carrying `event_field` is a [`MessageType::Event`]
/// for that topic. Other JSON frames are `Unknown`, non-JSON frames `Other`.
/// With an error field set, a response carrying a non-null, non-false value
/// in it is reported as failed.
#[derive(Debug, Clone)]
pub struct JsonFieldCodec {
    pub event_field: String,
    pub response_field: String,
    pub error_field: Option<String>,
}

impl JsonFieldCodec {
    pub fn new(event_field: impl Into<String>, response_field: impl Into<String>) -> Self {
        Self {
            event_field: event_field.into(),
            response_field: response_field.into(),
            error_field: None,
        }
    }

    pub fn with_error_field(mut self, error_field: impl Into<String>) -> Self {
        self.error_field = Some(error_field.into());
        self
    }

    fn field(&self, message: &ReceivedMessage) -> Option<(MessageType, String)> {
        let value: Value = serde_json::from_str(&message.data).ok()?;
        let lookup = |name: &str| match value.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        lookup(&self.response_field)
            .map(|id| (MessageType::Response, id))
            .or_else(|| lookup(&self.event_field).map(|id| (MessageType::Event, id)))
    }
}

impl WsCodec for JsonFieldCodec {
    fn identify_message_type(&self, message: &ReceivedMessage) -> MessageType {
        if serde_json::from_str::<Value>(&message.data).is_err() {
            return MessageType::Other;
        }
        self.field(message)
            .map_or(MessageType::Unknown, |(message_type, _)| message_type)
    }

    fn message_id(&self, message: &ReceivedMessage) -> Option<String> {
        self.field(message).map(|(_, id)| id)
    }

    fn response_error(&self, message: &ReceivedMessage) -> Option<ExchangeError> {
        let field = self.error_field.as_deref()?;
        let value: Value = serde_json::from_str(&message.data).ok()?;
        match value.get(field)? {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) => Some(ExchangeError::server(s.clone())),
            other => Some(ExchangeError::server(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_codec() {
        let codec = FnCodec::new(
            |m: &ReceivedMessage| {
                if m.data.starts_with("ack:") {
                    MessageType::Response
                } else {
                    MessageType::Event
                }
            },
            |m: &ReceivedMessage| m.data.split(':').nth(1).map(str::to_string),
        );
        let message = ReceivedMessage::new("ack:42");
        assert_eq!(codec.identify_message_type(&message), MessageType::Response);
        assert_eq!(codec.message_id(&message).as_deref(), Some("42"));
    }

    #[test]
    fn test_json_field_codec() {
        let codec = JsonFieldCodec::new("topic", "id");

        let response = ReceivedMessage::new(r#"{"id":7,"result":null}"#);
        assert_eq!(codec.identify_message_type(&response), MessageType::Response);
        assert_eq!(codec.message_id(&response).as_deref(), Some("7"));

        let event = ReceivedMessage::new(r#"{"topic":"trades.BTC","data":[]}"#);
        assert_eq!(codec.identify_message_type(&event), MessageType::Event);
        assert_eq!(codec.message_id(&event).as_deref(), Some("trades.BTC"));

        let unknown = ReceivedMessage::new(r#"{"heartbeat":true}"#);
        assert_eq!(codec.identify_message_type(&unknown), MessageType::Unknown);
        assert_eq!(
            codec.identify_message_type(&ReceivedMessage::new("pong")),
            MessageType::Other
        );
    }

    #[test]
    fn test_json_field_codec_response_error() {
        let codec = JsonFieldCodec::new("topic", "id").with_error_field("error");

        let rejected = ReceivedMessage::new(r#"{"error":"invalid topic","id":"1"}"#);
        assert!(matches!(
            codec.response_error(&rejected),
            Some(ExchangeError::ServerError { message, .. }) if message == "invalid topic"
        ));

        let accepted = ReceivedMessage::new(r#"{"error":null,"id":"1","result":true}"#);
        assert!(codec.response_error(&accepted).is_none());

        // without an error field nothing is treated as a failure
        let plain = JsonFieldCodec::new("topic", "id");
        assert!(plain.response_error(&rejected).is_none());
    }
}
