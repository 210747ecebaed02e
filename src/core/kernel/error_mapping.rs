use crate::core::errors::ExchangeError;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Normalized category of an exchange error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Unknown,
    SystemError,
    Unauthorized,
    RateLimitRequest,
    InvalidParameter,
    MissingParameter,
    UnknownSymbol,
    UnknownOrder,
    InsufficientBalance,
}

/// What a raw exchange error code means
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub error_type: ErrorType,
    /// The same request may succeed later
    pub is_transient: bool,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(error_type: ErrorType, is_transient: bool, message: impl Into<String>) -> Self {
        Self {
            error_type,
            is_transient,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Unknown, false, message)
    }
}

/// Maps exchange error payloads onto [`ErrorInfo`]
///
/// Exchange clients provide the table of codes they know about; the default
/// [`parse_error_response`](ErrorMapper::parse_error_response) understands
/// the common `{"code": .., "msg": ..}` shapes.
pub trait ErrorMapper: Send + Sync {
    /// Unknown codes degrade to [`ErrorType::Unknown`]
    fn error_info(&self, code: &str, message: &str) -> ErrorInfo;

    fn parse_error_response(&self, status: u16, body: &[u8]) -> ExchangeError {
        let text = String::from_utf8_lossy(body);
        let (code, message) = serde_json::from_slice::<Value>(body)
            .ok()
            .map(|value| (extract_code(&value), extract_message(&value)))
            .unwrap_or_default();

        let code = code.unwrap_or_else(|| status.to_string());
        let message = message.unwrap_or_else(|| {
            if text.trim().is_empty() {
                format!("HTTP status {}", status)
            } else {
                text.into_owned()
            }
        });

        let mut info = self.error_info(&code, &message);
        if info.error_type == ErrorType::Unknown {
            match status {
                429 => info = ErrorInfo::new(ErrorType::RateLimitRequest, true, &message),
                500..=599 => info = ErrorInfo::new(ErrorType::SystemError, true, &message),
                _ => {}
            }
        }

        debug!(status, code = %code, error_type = ?info.error_type, "Parsed error response");
        ExchangeError::ServerError {
            code: Some(code),
            message,
            info: Some(info),
        }
    }
}

/// Table-driven [`ErrorMapper`]
#[derive(Debug, Clone, Default)]
pub struct ErrorMapping {
    entries: HashMap<String, ErrorInfo>,
}

impl ErrorMapping {
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, ErrorInfo)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(code, info)| (code.into(), info))
                .collect(),
        }
    }

    pub fn insert(&mut self, code: impl Into<String>, info: ErrorInfo) {
        self.entries.insert(code.into(), info);
    }
}

impl ErrorMapper for ErrorMapping {
    fn error_info(&self, code: &str, message: &str) -> ErrorInfo {
        self.entries
            .get(code)
            .cloned()
            .unwrap_or_else(|| ErrorInfo::unknown(message))
    }
}

const CODE_FIELDS: [&str; 4] = ["code", "error_code", "errorCode", "ret_code"];
const MESSAGE_FIELDS: [&str; 6] = [
    "msg",
    "message",
    "error_message",
    "errorMessage",
    "ret_msg",
    "error",
];

fn extract_code(value: &Value) -> Option<String> {
    CODE_FIELDS.iter().find_map(|field| match value.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn extract_message(value: &Value) -> Option<String> {
    MESSAGE_FIELDS
        .iter()
        .find_map(|field| value.get(field)?.as_str().map(str::to_string))
}
