use super::{DataDirection, PageRequest, PaginationParameters};
use crate::core::types::KlineInterval;
use chrono::{DateTime, Duration, Utc};

pub fn next_page_from_page(last: &PaginationParameters) -> PageRequest {
    PageRequest {
        page: Some(last.page.unwrap_or(1).saturating_add(1)),
        ..PageRequest::default()
    }
}

/// Offsets saturate at `u32::MAX`
pub fn next_page_from_offset(last: &PaginationParameters, result_count: usize) -> PageRequest {
    let count = u32::try_from(result_count).unwrap_or(u32::MAX);
    PageRequest {
        offset: Some(last.offset.unwrap_or(0).saturating_add(count)),
        ..PageRequest::default()
    }
}

pub fn next_page_from_cursor(next_cursor: impl Into<String>) -> PageRequest {
    PageRequest {
        cursor: Some(next_cursor.into()),
        ..PageRequest::default()
    }
}

/// Accepts numeric as well as string identifiers
pub fn next_page_from_id(next_from_id: impl ToString) -> PageRequest {
    PageRequest {
        from_id: Some(next_from_id.to_string()),
        ..PageRequest::default()
    }
}

/// Continue right after (ascending) or right before (descending) the last
/// returned timestamp
pub fn next_page_from_time(
    last: &PaginationParameters,
    last_timestamp: DateTime<Utc>,
    set_other_time_limiter: bool,
) -> PageRequest {
    let step = Duration::milliseconds(1);
    match last.direction {
        DataDirection::Ascending => PageRequest::with_time_range(
            Some(last_timestamp + step),
            last.end_time.filter(|_| set_other_time_limiter),
        ),
        DataDirection::Descending => PageRequest::with_time_range(
            last.start_time.filter(|_| set_other_time_limiter),
            Some(last_timestamp - step),
        ),
    }
}

/// Time window for the next `limit` candles after (or before) the last one
///
/// A missing request end (ascending) or request start (descending) falls
/// back to now.
pub fn next_page_from_time_klines(
    direction: DataDirection,
    interval: KlineInterval,
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: Option<DateTime<Utc>>,
    last_timestamp: DateTime<Utc>,
    limit: u32,
) -> PageRequest {
    time_klines_at(
        Utc::now(),
        direction,
        interval,
        request_start_time,
        request_end_time,
        last_timestamp,
        limit,
    )
}

fn time_klines_at(
    now: DateTime<Utc>,
    direction: DataDirection,
    interval: KlineInterval,
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: Option<DateTime<Utc>>,
    last_timestamp: DateTime<Utc>,
    limit: u32,
) -> PageRequest {
    let step = interval.duration();
    let window = Duration::seconds(interval.seconds() * i64::from(limit));
    match direction {
        DataDirection::Ascending => {
            let start = last_timestamp + step;
            let end = (start + window).min(request_end_time.unwrap_or(now));
            PageRequest::with_time_range(Some(start), Some(end))
        }
        DataDirection::Descending => {
            let end = last_timestamp - step;
            let start = (end - window).max(request_start_time.unwrap_or(now));
            PageRequest::with_time_range(Some(start), Some(end))
        }
    }
}
