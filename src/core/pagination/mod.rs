//! Direction-aware pagination
//!
//! The engine is pure and stateless: given the user's request window, the
//! parameters used for the last page and the results it produced, it decides
//! whether another page (or another time period) exists and what to request
//! next. Exchange clients supply the page-advance strategy as a callback,
//! typically one of the `next_page_from_*` helpers.

mod endpoint;
mod engine;
mod strategy;

pub use endpoint::{validate_max_age, PaginatedEndpointOptions};
pub use engine::{
    get_next_page_request, get_next_page_request_klines, get_next_period,
    get_pagination_parameters, has_next_page, has_next_page_klines, has_next_period,
};
pub use strategy::{
    next_page_from_cursor, next_page_from_id, next_page_from_offset, next_page_from_page,
    next_page_from_time, next_page_from_time_klines,
};

use chrono::{DateTime, Utc};

/// Order in which an endpoint returns its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataDirection {
    /// Oldest first
    Ascending,
    /// Newest first
    Descending,
}

/// Parameters to use for a single page request. Unset fields are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationParameters {
    pub direction: DataDirection,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub from_id: Option<String>,
    pub offset: Option<u32>,
    pub page: Option<u32>,
    pub cursor: Option<String>,
    pub limit: u32,
}

impl PaginationParameters {
    pub fn new(direction: DataDirection, limit: u32) -> Self {
        Self {
            direction,
            start_time: None,
            end_time: None,
            from_id: None,
            offset: None,
            page: None,
            cursor: None,
            limit,
        }
    }
}

/// What to request for the next page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: Option<String>,
    pub page: Option<u32>,
    pub offset: Option<u32>,
    pub from_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl PageRequest {
    pub fn with_time_range(
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            start_time,
            end_time,
            ..Self::default()
        }
    }
}
