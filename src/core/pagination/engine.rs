use super::{DataDirection, PageRequest, PaginationParameters};
use crate::core::types::KlineInterval;
use chrono::{DateTime, Duration, Utc};

/// Margin added to the max-age floor so client/server clock offset and
/// latency don't push a start time past what the server serves
const MAX_AGE_MARGIN_SECONDS: i64 = 30;

/// Minimum remaining span worth another period request
const MIN_PERIOD_SECONDS: i64 = 1;

/// Compute the parameters for the first (or next) page request
///
/// Times from `page_request` win over the user's request times. When
/// `max_period` is set the window is narrowed to at most that span: an
/// ascending request without a start begins `max_period` before the end, an
/// ascending request with a start ends `max_period` later (but not after
/// now), and a descending request always starts `max_period` before its end.
///
/// The start time is only included for ascending requests, and the end time
/// only for descending ones, unless `set_other_time_limiter` is set.
pub fn get_pagination_parameters(
    direction: DataDirection,
    limit: u32,
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    page_request: Option<&PageRequest>,
    set_other_time_limiter: bool,
    max_period: Option<Duration>,
) -> PaginationParameters {
    pagination_parameters_at(
        Utc::now(),
        direction,
        limit,
        request_start_time,
        request_end_time,
        page_request,
        set_other_time_limiter,
        max_period,
    )
}

pub(super) fn pagination_parameters_at(
    now: DateTime<Utc>,
    direction: DataDirection,
    limit: u32,
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    page_request: Option<&PageRequest>,
    set_other_time_limiter: bool,
    max_period: Option<Duration>,
) -> PaginationParameters {
    let mut start_time = page_request
        .and_then(|p| p.start_time)
        .or(request_start_time);
    let mut end_time = page_request
        .and_then(|p| p.end_time)
        .unwrap_or(request_end_time);

    if let Some(max_period) = max_period {
        match (direction, start_time) {
            (DataDirection::Ascending, Some(start)) => {
                end_time = (start + max_period).min(now);
            }
            (DataDirection::Ascending, None) | (DataDirection::Descending, _) => {
                start_time = Some(end_time - max_period);
            }
        }
    }

    let include_start = direction == DataDirection::Ascending || set_other_time_limiter;
    let include_end = direction == DataDirection::Descending || set_other_time_limiter;

    PaginationParameters {
        direction,
        start_time: start_time.filter(|_| include_start),
        end_time: Some(end_time).filter(|_| include_end),
        from_id: page_request.and_then(|p| p.from_id.clone()),
        offset: page_request.and_then(|p| p.offset),
        page: page_request.and_then(|p| p.page),
        cursor: page_request.and_then(|p| p.cursor.clone()),
        limit,
    }
}

/// Check whether another page may be available after a result
///
/// A result shorter than `limit` is always the last page. Otherwise an
/// ascending result continues while its latest timestamp is before the
/// request end, and a descending result continues while its earliest
/// timestamp is not before the request start.
pub fn has_next_page(
    result_count: usize,
    timestamps: &[DateTime<Utc>],
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    limit: u32,
    direction: DataDirection,
) -> bool {
    has_next_page_shifted(
        result_count,
        timestamps,
        request_start_time,
        request_end_time,
        limit,
        direction,
        Duration::zero(),
    )
}

/// [`has_next_page`] for kline data: timestamps are candle open times, so
/// the candle span is taken into account
pub fn has_next_page_klines(
    result_count: usize,
    timestamps: &[DateTime<Utc>],
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    limit: u32,
    direction: DataDirection,
    interval: KlineInterval,
) -> bool {
    has_next_page_shifted(
        result_count,
        timestamps,
        request_start_time,
        request_end_time,
        limit,
        direction,
        interval.duration(),
    )
}

fn has_next_page_shifted(
    result_count: usize,
    timestamps: &[DateTime<Utc>],
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    limit: u32,
    direction: DataDirection,
    shift: Duration,
) -> bool {
    if result_count < limit as usize {
        return false;
    }

    match direction {
        DataDirection::Ascending => timestamps
            .iter()
            .max()
            .is_some_and(|latest| *latest + shift < request_end_time),
        DataDirection::Descending => timestamps.iter().min().is_some_and(|earliest| {
            request_start_time.map_or(true, |start| *earliest - shift >= start)
        }),
    }
}

/// Compute the next page request from a result, or `None` when done
///
/// When another page exists the `next_page_request` strategy is asked for
/// it; unset start/end times are carried over from `last`. Otherwise, when
/// `max_period` limits the span of a single request, the next time period
/// is requested until the user's window (or the servable max age) is
/// exhausted.
pub fn get_next_page_request<F>(
    next_page_request: F,
    result_count: usize,
    timestamps: &[DateTime<Utc>],
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    last: &PaginationParameters,
    max_period: Option<Duration>,
    max_age: Option<Duration>,
) -> Option<PageRequest>
where
    F: FnOnce() -> Option<PageRequest>,
{
    let has_next = has_next_page(
        result_count,
        timestamps,
        request_start_time,
        request_end_time,
        last.limit,
        last.direction,
    );
    advance_at(
        Utc::now(),
        has_next,
        next_page_request,
        request_start_time,
        request_end_time,
        last,
        max_period,
        max_age,
    )
}

/// [`get_next_page_request`] for kline data
pub fn get_next_page_request_klines<F>(
    next_page_request: F,
    result_count: usize,
    timestamps: &[DateTime<Utc>],
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    last: &PaginationParameters,
    interval: KlineInterval,
    max_period: Option<Duration>,
    max_age: Option<Duration>,
) -> Option<PageRequest>
where
    F: FnOnce() -> Option<PageRequest>,
{
    let has_next = has_next_page_klines(
        result_count,
        timestamps,
        request_start_time,
        request_end_time,
        last.limit,
        last.direction,
        interval,
    );
    advance_at(
        Utc::now(),
        has_next,
        next_page_request,
        request_start_time,
        request_end_time,
        last,
        max_period,
        max_age,
    )
}

pub(super) fn advance_at<F>(
    now: DateTime<Utc>,
    has_next_page: bool,
    next_page_request: F,
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    last: &PaginationParameters,
    max_period: Option<Duration>,
    max_age: Option<Duration>,
) -> Option<PageRequest>
where
    F: FnOnce() -> Option<PageRequest>,
{
    if has_next_page {
        if let Some(mut request) = next_page_request() {
            request.start_time = request.start_time.or(last.start_time);
            request.end_time = request.end_time.or(last.end_time);
            return Some(request);
        }
    }

    let period = max_period?;
    if !has_next_period_at(
        now,
        request_start_time,
        request_end_time,
        last.direction,
        last,
        period,
        max_age,
    ) {
        return None;
    }

    let (start_time, end_time) = next_period_at(
        now,
        request_start_time,
        request_end_time,
        last.direction,
        last,
        period,
        max_age,
    );
    Some(PageRequest::with_time_range(start_time, end_time))
}

/// Check whether another time period remains to be requested
///
/// # Panics
///
/// Panics for ascending pagination when `last` has no start time; ascending
/// period pagination always sets one through [`get_pagination_parameters`].
pub fn has_next_period(
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    direction: DataDirection,
    last: &PaginationParameters,
    period: Duration,
    max_age: Option<Duration>,
) -> bool {
    has_next_period_at(
        Utc::now(),
        request_start_time,
        request_end_time,
        direction,
        last,
        period,
        max_age,
    )
}

pub(super) fn has_next_period_at(
    now: DateTime<Utc>,
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    direction: DataDirection,
    last: &PaginationParameters,
    period: Duration,
    max_age: Option<Duration>,
) -> bool {
    let min_span = Duration::seconds(MIN_PERIOD_SECONDS);
    match direction {
        DataDirection::Ascending => {
            assert!(
                last.start_time.is_some(),
                "Invalid pagination data; no start time for ascending pagination"
            );
            // windows never end after now, so a future request end counts as now
            let effective_end = request_end_time.min(now);
            let last_end = last.end_time.unwrap_or(effective_end);
            effective_end - last_end > min_span
        }
        DataDirection::Descending => {
            let last_start = last
                .start_time
                .unwrap_or_else(|| last.end_time.unwrap_or(request_end_time) - period);
            match lower_bound(now, request_start_time, max_age) {
                Some(bound) => last_start - bound > min_span,
                None => period > min_span,
            }
        }
    }
}

/// Compute the start/end time of the period following `last`
pub fn get_next_period(
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    direction: DataDirection,
    last: &PaginationParameters,
    period: Duration,
    max_age: Option<Duration>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    next_period_at(
        Utc::now(),
        request_start_time,
        request_end_time,
        direction,
        last,
        period,
        max_age,
    )
}

pub(super) fn next_period_at(
    now: DateTime<Utc>,
    request_start_time: Option<DateTime<Utc>>,
    request_end_time: DateTime<Utc>,
    direction: DataDirection,
    last: &PaginationParameters,
    period: Duration,
    max_age: Option<Duration>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let shift = match direction {
        DataDirection::Ascending => period,
        DataDirection::Descending => -period,
    };

    let mut start_time = last.start_time.map(|start| start + shift);
    let end_time = last
        .end_time
        .map(|end| (end + shift).min(request_end_time));

    if let Some(floor) = request_start_time {
        start_time = start_time.map(|start| start.max(floor));
    }
    if let Some(max_age) = max_age {
        let floor = max_age_floor(now, max_age);
        start_time = start_time.map(|start| start.max(floor));
    }

    (start_time, end_time)
}

/// Oldest start time that can safely be requested given a max age
pub(super) fn max_age_floor(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    now - max_age + Duration::seconds(MAX_AGE_MARGIN_SECONDS)
}

fn lower_bound(
    now: DateTime<Utc>,
    request_start_time: Option<DateTime<Utc>>,
    max_age: Option<Duration>,
) -> Option<DateTime<Utc>> {
    let age_floor = max_age.map(|age| max_age_floor(now, age));
    match (request_start_time, age_floor) {
        (Some(start), Some(floor)) => Some(start.max(floor)),
        (start, floor) => start.or(floor),
    }
}
