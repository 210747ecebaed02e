use crate::core::config::ApiCredentials;
use crate::core::errors::ExchangeError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

/// Result type for signing operations: (headers, `query_params`)
pub type SignatureResult = Result<(HashMap<String, String>, Vec<(String, String)>), ExchangeError>;

/// Signer trait for request authentication
///
/// The requester hands over the already-encoded query string and body; the
/// returned query parameters replace the request's query verbatim, so values
/// must stay encoded exactly as they were signed.
pub trait Signer: Send + Sync {
    /// Sign a request and return headers and query parameters
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `endpoint` - Request path
    /// * `query_string` - Encoded query string (without leading '?')
    /// * `body` - Raw request body bytes
    /// * `timestamp` - Request timestamp in milliseconds
    fn sign_request(
        &self,
        method: &str,
        endpoint: &str,
        query_string: &str,
        body: &[u8],
        timestamp: u64,
    ) -> SignatureResult;
}

/// Where an [`HmacSigner`] puts the signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HmacStyle {
    /// `timestamp` and `signature` query parameters over `query&body`,
    /// API key in a header
    #[default]
    QueryString,
    /// API key, timestamp and signature headers over
    /// `timestamp + key + recv_window + (query or body)`
    Headers,
}

/// HMAC-SHA256 signer built from API credentials
pub struct HmacSigner {
    credentials: ApiCredentials,
    style: HmacStyle,
    api_key_header: String,
    recv_window: u64,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("style", &self.style)
            .field("api_key_header", &self.api_key_header)
            .finish_non_exhaustive()
    }
}

impl HmacSigner {
    pub const TIMESTAMP_HEADER: &'static str = "X-TIMESTAMP";
    pub const SIGNATURE_HEADER: &'static str = "X-SIGNATURE";
    pub const RECV_WINDOW_HEADER: &'static str = "X-RECV-WINDOW";

    pub fn new(credentials: ApiCredentials, style: HmacStyle) -> Self {
        Self {
            credentials,
            style,
            api_key_header: "X-API-KEY".to_string(),
            recv_window: 5000,
        }
    }

    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self
    }

    pub fn with_recv_window(mut self, recv_window: u64) -> Self {
        self.recv_window = recv_window;
        self
    }

    fn sign(&self, payload: &str) -> Result<String, ExchangeError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.credentials.secret().as_bytes())
            .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl Signer for HmacSigner {
    fn sign_request(
        &self,
        method: &str,
        _endpoint: &str,
        query_string: &str,
        body: &[u8],
        timestamp: u64,
    ) -> SignatureResult {
        if self.credentials.is_empty() {
            return Err(ExchangeError::AuthError(
                "No API credentials configured".to_string(),
            ));
        }
        let body = std::str::from_utf8(body)
            .map_err(|e| ExchangeError::AuthError(format!("Body is not valid UTF-8: {}", e)))?;

        let mut headers = HashMap::new();
        headers.insert(
            self.api_key_header.clone(),
            self.credentials.api_key().to_string(),
        );

        match self.style {
            HmacStyle::QueryString => {
                let query_with_timestamp = if query_string.is_empty() {
                    format!("timestamp={}", timestamp)
                } else {
                    format!("{}&timestamp={}", query_string, timestamp)
                };

                let payload = if body.is_empty() || method == "GET" {
                    query_with_timestamp.clone()
                } else {
                    format!("{}{}", query_with_timestamp, body)
                };
                let signature = self.sign(&payload)?;

                let mut signed_params = split_query(&query_with_timestamp);
                signed_params.push(("signature".to_string(), signature));
                Ok((headers, signed_params))
            }
            HmacStyle::Headers => {
                let content = if body.is_empty() { query_string } else { body };
                let payload = format!(
                    "{}{}{}{}",
                    timestamp,
                    self.credentials.api_key(),
                    self.recv_window,
                    content
                );
                let signature = self.sign(&payload)?;

                headers.insert(Self::TIMESTAMP_HEADER.to_string(), timestamp.to_string());
                headers.insert(
                    Self::RECV_WINDOW_HEADER.to_string(),
                    self.recv_window.to_string(),
                );
                headers.insert(Self::SIGNATURE_HEADER.to_string(), signature);
                Ok((headers, split_query(query_string)))
            }
        }
    }
}

fn split_query(query_string: &str) -> Vec<(String, String)> {
    query_string
        .split('&')
        .filter_map(|param| {
            param
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}
