use crate::core::kernel::error_mapping::ErrorInfo;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    #[error("Invalid argument: {0}")]
    ArgumentError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Empty response: no content to deserialize")]
    EmptyResponse,

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Can't connect: {0}")]
    CantConnect(String),

    #[error("Server error {}: {message}", .code.as_deref().unwrap_or("-"))]
    ServerError {
        code: Option<String>,
        message: String,
        info: Option<ErrorInfo>,
    },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

/// Coarse classification of an [`ExchangeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Argument,
    Serialization,
    Deserialization,
    CantConnect,
    Server,
    Timeout,
    Cancelled,
    RateLimited,
    Auth,
    WebSocket,
    Config,
}

impl ExchangeError {
    /// Server error without a remote code, used for transport failures
    pub fn server(message: impl Into<String>) -> Self {
        Self::ServerError {
            code: None,
            message: message.into(),
            info: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArgumentError(_) => ErrorKind::Argument,
            Self::SerializationError(_) => ErrorKind::Serialization,
            Self::EmptyResponse | Self::DeserializationError(_) => ErrorKind::Deserialization,
            Self::CantConnect(_) => ErrorKind::CantConnect,
            Self::ServerError { .. } => ErrorKind::Server,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::AuthError(_) => ErrorKind::Auth,
            Self::WebSocketError(_) => ErrorKind::WebSocket,
            Self::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Check if a higher orchestration layer may retry the call
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CantConnect(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::ServerError { info, .. } => info.as_ref().is_some_and(|info| info.is_transient),
            _ => false,
        }
    }
}
