use crate::core::errors::ExchangeError;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// Metadata of the HTTP exchange that produced a [`CallResult`]
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Time spent on the network call only
    pub elapsed: Duration,
    pub address: String,
    pub method: Method,
    pub request_id: u64,
    pub from_cache: bool,
}

/// Uniform result envelope returned by requesters and streamers
///
/// A call either succeeded with data or failed with an [`ExchangeError`];
/// response metadata is attached whenever a response was received, including
/// on failures after the network call.
#[derive(Debug)]
pub struct CallResult<T> {
    outcome: Result<T, ExchangeError>,
    response: Option<ResponseInfo>,
    original_data: Option<String>,
}

/// REST flavour of [`CallResult`], carrying [`ResponseInfo`]
pub type WebCallResult<T> = CallResult<T>;

impl<T> CallResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            outcome: Ok(data),
            response: None,
            original_data: None,
        }
    }

    pub fn failure(error: ExchangeError) -> Self {
        Self {
            outcome: Err(error),
            response: None,
            original_data: None,
        }
    }

    pub fn with_response(mut self, response: ResponseInfo) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_original_data(mut self, data: Option<String>) -> Self {
        self.original_data = data;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ExchangeError> {
        self.outcome.as_ref().err()
    }

    pub fn response(&self) -> Option<&ResponseInfo> {
        self.response.as_ref()
    }

    pub fn original_data(&self) -> Option<&str> {
        self.original_data.as_deref()
    }

    pub fn into_result(self) -> Result<T, ExchangeError> {
        self.outcome
    }

    pub fn into_parts(self) -> (Result<T, ExchangeError>, Option<ResponseInfo>) {
        (self.outcome, self.response)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallResult<U> {
        CallResult {
            outcome: self.outcome.map(f),
            response: self.response,
            original_data: self.original_data,
        }
    }

    /// Re-type a failed result, keeping error and response info.
    /// Returns `None` for a successful result.
    pub fn as_failure<U>(self) -> Option<CallResult<U>> {
        match self.outcome {
            Ok(_) => None,
            Err(error) => Some(CallResult {
                outcome: Err(error),
                response: self.response,
                original_data: self.original_data,
            }),
        }
    }
}

impl<T> From<Result<T, ExchangeError>> for CallResult<T> {
    fn from(outcome: Result<T, ExchangeError>) -> Self {
        Self {
            outcome,
            response: None,
            original_data: None,
        }
    }
}
