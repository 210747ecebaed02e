use super::DataDirection;
use crate::core::errors::ExchangeError;
use chrono::{DateTime, Duration, Utc};

/// Pagination capabilities of a single endpoint, used to reject requests
/// the endpoint can't serve before any I/O happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedEndpointOptions {
    pub supports_ascending: bool,
    pub supports_descending: bool,
    pub time_filter_supported: bool,
    pub max_limit: u32,
    pub max_age: Option<Duration>,
}

impl PaginatedEndpointOptions {
    pub fn new(
        supports_ascending: bool,
        supports_descending: bool,
        time_filter_supported: bool,
        max_limit: u32,
    ) -> Self {
        Self {
            supports_ascending,
            supports_descending,
            time_filter_supported,
            max_limit,
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn validate(
        &self,
        direction: DataDirection,
        start_time: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<(), ExchangeError> {
        self.validate_at(Utc::now(), direction, start_time, limit)
    }

    fn validate_at(
        &self,
        now: DateTime<Utc>,
        direction: DataDirection,
        start_time: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<(), ExchangeError> {
        match direction {
            DataDirection::Ascending if !self.supports_ascending => {
                return Err(ExchangeError::ArgumentError(
                    "Ascending direction is not supported".to_string(),
                ));
            }
            DataDirection::Descending if !self.supports_descending => {
                return Err(ExchangeError::ArgumentError(
                    "Descending direction is not supported".to_string(),
                ));
            }
            _ => {}
        }

        if start_time.is_some() && !self.time_filter_supported {
            return Err(ExchangeError::ArgumentError(
                "Time filter is not supported".to_string(),
            ));
        }

        if let Some(limit) = limit.filter(|l| *l > self.max_limit) {
            return Err(ExchangeError::ArgumentError(format!(
                "Limit {} exceeds maximum of {}",
                limit, self.max_limit
            )));
        }

        match (start_time, self.max_age) {
            (Some(start), Some(max_age)) => max_age_check(now, start, max_age),
            _ => Ok(()),
        }
    }
}

/// Reject a start time older than the servable window
pub fn validate_max_age(start_time: DateTime<Utc>, max_age: Duration) -> Result<(), ExchangeError> {
    max_age_check(Utc::now(), start_time, max_age)
}

fn max_age_check(
    now: DateTime<Utc>,
    start_time: DateTime<Utc>,
    max_age: Duration,
) -> Result<(), ExchangeError> {
    if start_time < now - max_age {
        return Err(ExchangeError::ArgumentError(format!(
            "Only the most recent {}s of data is available",
            max_age.num_seconds()
        )));
    }
    Ok(())
}
