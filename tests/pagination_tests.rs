use chrono::{DateTime, Duration, TimeZone, Utc};
use exchange_net::core::errors::ExchangeError;
use exchange_net::core::pagination::{
    get_next_page_request, get_next_page_request_klines, get_pagination_parameters,
    next_page_from_cursor, next_page_from_offset, next_page_from_time,
    next_page_from_time_klines, validate_max_age, DataDirection, PageRequest,
    PaginatedEndpointOptions, PaginationParameters,
};
use exchange_net::core::types::KlineInterval;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, minute, 0).unwrap()
}

/// One point every ten minutes, inclusive on both ends
fn series(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut points = Vec::new();
    let mut current = from;
    while current <= to {
        points.push(current);
        current += Duration::minutes(10);
    }
    points
}

/// Ascending endpoint: oldest first from the start time, at most `limit`
fn fetch_ascending(
    data: &[DateTime<Utc>],
    params: &PaginationParameters,
    request_end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    data.iter()
        .copied()
        .filter(|ts| params.start_time.map_or(true, |start| *ts >= start))
        .filter(|ts| *ts <= params.end_time.unwrap_or(request_end))
        .take(params.limit as usize)
        .collect()
}

#[test]
fn test_ascending_time_pagination_collects_window() {
    let start = at(1, 10, 0);
    let end = at(1, 12, 0);
    let data = series(start, end);

    let mut collected = Vec::new();
    let mut page_request: Option<PageRequest> = None;
    let mut requests = 0;

    loop {
        let params = get_pagination_parameters(
            DataDirection::Ascending,
            3,
            Some(start),
            end,
            page_request.as_ref(),
            false,
            None,
        );
        assert!(params.end_time.is_none());

        let page = fetch_ascending(&data, &params, end);
        requests += 1;
        collected.extend(page.iter().copied());

        let last = page.last().copied();
        page_request = get_next_page_request(
            || last.map(|ts| next_page_from_time(&params, ts, false)),
            page.len(),
            &page,
            Some(start),
            end,
            &params,
            None,
            None,
        );
        if page_request.is_none() {
            break;
        }
    }

    assert_eq!(collected, data);
    assert_eq!(requests, 5);
}

#[test]
fn test_descending_cursor_pagination_stops_on_short_page() {
    let end = at(1, 12, 0);
    let mut data = series(at(1, 11, 0), end);
    data.reverse();
    assert_eq!(data.len(), 7);

    let mut collected = Vec::new();
    let mut page_request: Option<PageRequest> = None;

    loop {
        let params = get_pagination_parameters(
            DataDirection::Descending,
            3,
            None,
            end,
            page_request.as_ref(),
            false,
            None,
        );
        assert_eq!(params.end_time, Some(end));
        assert!(params.start_time.is_none());

        let offset: usize = params.cursor.as_deref().map_or(0, |c| c.parse().unwrap());
        let page: Vec<_> = data.iter().copied().skip(offset).take(3).collect();
        collected.extend(page.iter().copied());

        let next_cursor = (offset + page.len()).to_string();
        page_request = get_next_page_request(
            || Some(next_page_from_cursor(next_cursor)),
            page.len(),
            &page,
            None,
            end,
            &params,
            None,
            None,
        );
        match &page_request {
            Some(next) => assert_eq!(next.end_time, Some(end)),
            None => break,
        }
    }

    assert_eq!(collected, data);
}

#[test]
fn test_offset_pagination_carries_times() {
    let start = at(1, 0, 0);
    let end = at(2, 0, 0);
    let params = get_pagination_parameters(
        DataDirection::Ascending,
        2,
        Some(start),
        end,
        None,
        true,
        None,
    );
    let page = [at(1, 1, 0), at(1, 2, 0)];

    let next = get_next_page_request(
        || Some(next_page_from_offset(&params, page.len())),
        page.len(),
        &page,
        Some(start),
        end,
        &params,
        None,
        None,
    )
    .expect("full page with room left");

    assert_eq!(next.offset, Some(2));
    assert_eq!(next.start_time, Some(start));
    assert_eq!(next.end_time, Some(end));

    let params = get_pagination_parameters(
        DataDirection::Ascending,
        2,
        Some(start),
        end,
        Some(&next),
        true,
        None,
    );
    assert_eq!(params.offset, Some(2));
    assert_eq!(params.start_time, Some(start));
}

#[test]
fn test_max_period_walks_periods_until_request_end() {
    let start = at(1, 0, 0);
    let end = at(3, 0, 0);
    let period = Duration::days(1);

    let mut windows = Vec::new();
    let mut page_request: Option<PageRequest> = None;

    loop {
        let params = get_pagination_parameters(
            DataDirection::Ascending,
            100,
            Some(start),
            end,
            page_request.as_ref(),
            true,
            Some(period),
        );
        windows.push((params.start_time, params.end_time));

        // nothing traded in the window
        page_request = get_next_page_request(
            || None,
            0,
            &[],
            Some(start),
            end,
            &params,
            Some(period),
            None,
        );
        if page_request.is_none() {
            break;
        }
    }

    assert_eq!(
        windows,
        vec![
            (Some(at(1, 0, 0)), Some(at(2, 0, 0))),
            (Some(at(2, 0, 0)), Some(at(3, 0, 0))),
        ]
    );
}

#[test]
fn test_kline_pagination_accounts_for_candle_span() {
    let start = at(1, 0, 0);
    let end = at(1, 1, 0);
    let interval = KlineInterval::Minutes15;
    let params = get_pagination_parameters(
        DataDirection::Ascending,
        3,
        Some(start),
        end,
        None,
        true,
        None,
    );

    // the 00:45 candle closes at the request end, so nothing is left
    let last_page = [at(1, 0, 15), at(1, 0, 30), at(1, 0, 45)];
    let next = get_next_page_request_klines(
        || None,
        3,
        &last_page,
        Some(start),
        end,
        &params,
        interval,
        None,
        None,
    );
    assert!(next.is_none());

    let first_page = [at(1, 0, 0), at(1, 0, 15), at(1, 0, 30)];
    let next = get_next_page_request_klines(
        || {
            Some(next_page_from_time_klines(
                DataDirection::Ascending,
                interval,
                Some(start),
                Some(end),
                at(1, 0, 30),
                3,
            ))
        },
        3,
        &first_page,
        Some(start),
        end,
        &params,
        interval,
        None,
        None,
    )
    .expect("the 00:45 candle is still missing");
    assert_eq!(next.start_time, Some(at(1, 0, 45)));
    assert_eq!(next.end_time, Some(end));
}

#[test]
fn test_endpoint_options_reject_before_io() {
    let options = PaginatedEndpointOptions::new(true, false, true, 1000)
        .with_max_age(Duration::days(7));

    assert!(options
        .validate(DataDirection::Ascending, None, Some(500))
        .is_ok());
    assert!(matches!(
        options.validate(DataDirection::Descending, None, None),
        Err(ExchangeError::ArgumentError(_))
    ));
    assert!(matches!(
        options.validate(DataDirection::Ascending, None, Some(1001)),
        Err(ExchangeError::ArgumentError(_))
    ));
    assert!(matches!(
        options.validate(
            DataDirection::Ascending,
            Some(Utc::now() - Duration::days(30)),
            None
        ),
        Err(ExchangeError::ArgumentError(_))
    ));

    assert!(validate_max_age(Utc::now() - Duration::hours(1), Duration::days(1)).is_ok());
    assert!(validate_max_age(Utc::now() - Duration::days(2), Duration::days(1)).is_err());
}
