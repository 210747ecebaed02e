mod common;

use common::{endpoint, rest_options, setup_mock_server};
use exchange_net::core::config::ApiCredentials;
use exchange_net::core::errors::ExchangeError;
use exchange_net::core::kernel::{
    ArrayParametersSerialization, DataRequester, ErrorInfo, ErrorMapping, ErrorType,
    GovernorRateLimiter, RateLimitingBehaviour, RequestData, RestDataRequesterBuilder,
    UrlParametersSerializer,
};
use exchange_net::core::result::WebCallResult;
use hmac::{Hmac, Mac};
use nonzero_ext::nonzero;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct Ticker {
    symbol: String,
    price: String,
}

#[tokio::test]
async fn test_get_success_carries_response_info() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-request-weight", "2")
                .set_body_json(json!({"price": "65000.10", "symbol": "BTCUSDT"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new("test", rest_options()).build());
    let data = RequestData::new(
        Method::GET,
        endpoint(&server, "/api/v3/ticker"),
        json!({"symbol": "BTCUSDT"}),
    )
    .with_request_id(42);

    let result: WebCallResult<Ticker> = requester.request(&data).await;
    assert!(result.is_success());
    assert_eq!(
        result.data(),
        Some(&Ticker {
            symbol: "BTCUSDT".to_string(),
            price: "65000.10".to_string(),
        })
    );

    let info = result.response().expect("response info is attached");
    assert_eq!(info.status, StatusCode::OK);
    assert_eq!(info.method, Method::GET);
    assert_eq!(info.request_id, 42);
    assert!(!info.from_cache);
    assert!(info.address.ends_with("/api/v3/ticker?symbol=BTCUSDT"));
    assert_eq!(
        info.headers.get("x-request-weight").and_then(|v| v.to_str().ok()),
        Some("2")
    );
    assert!(result.original_data().is_none());
}

#[tokio::test]
async fn test_empty_collection_is_success() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/trades"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new("test", rest_options()).build());
    let data = RequestData::new(Method::GET, endpoint(&server, "/trades"), ());
    let result: WebCallResult<Vec<Value>> = requester.request(&data).await;

    assert!(result.is_success());
    assert_eq!(result.data().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_array_parameters_in_query() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let payload = json!({"ids": [1, 2], "symbol": "ETHUSDT"});

    let multiple = assert_ok!(RestDataRequesterBuilder::new("test", rest_options()).build());
    let data = RequestData::new(Method::GET, endpoint(&server, "/orders"), payload.clone());
    let result: WebCallResult<Value> = multiple.request(&data).await;
    assert!(result.is_success());

    let array = assert_ok!(RestDataRequesterBuilder::new("test", rest_options())
        .with_url_serializer(Arc::new(UrlParametersSerializer::new(
            ArrayParametersSerialization::Array,
        )))
        .build());
    let result: WebCallResult<Value> = array.request(&data).await;
    assert!(result.is_success());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url.query(), Some("ids=1&ids=2&symbol=ETHUSDT"));
    assert_eq!(
        requests[1].url.query(),
        Some("ids%5B%5D=1&ids%5B%5D=2&symbol=ETHUSDT")
    );
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/order"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"qty": "0.5", "side": "BUY", "symbol": "BTCUSDT"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"orderId": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new("test", rest_options()).build());
    let data = RequestData::new(
        Method::POST,
        endpoint(&server, "/order"),
        json!({"qty": "0.5", "side": "BUY", "symbol": "BTCUSDT"}),
    );
    let result: WebCallResult<Value> = requester.request(&data).await;

    assert_eq!(result.data(), Some(&json!({"orderId": 7})));
    assert_eq!(result.response().map(|r| r.method.clone()), Some(Method::POST));
}

#[tokio::test]
async fn test_error_response_is_mapped() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/ticker"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"code": -1121, "msg": "Invalid symbol."})),
        )
        .mount(&server)
        .await;

    let mapping = ErrorMapping::new([(
        "-1121",
        ErrorInfo::new(ErrorType::UnknownSymbol, false, "Unknown symbol"),
    )]);
    let requester = assert_ok!(RestDataRequesterBuilder::new("test", rest_options())
        .with_error_mapper(Arc::new(mapping))
        .build());
    let data = RequestData::new(Method::GET, endpoint(&server, "/ticker"), ());
    let result: WebCallResult<Value> = requester.request(&data).await;

    assert!(!result.is_success());
    assert_eq!(
        result.response().map(|r| r.status),
        Some(StatusCode::BAD_REQUEST)
    );
    match result.error() {
        Some(ExchangeError::ServerError {
            code,
            message,
            info: Some(info),
        }) => {
            assert_eq!(code.as_deref(), Some("-1121"));
            assert_eq!(message, "Invalid symbol.");
            assert_eq!(info.error_type, ErrorType::UnknownSymbol);
            assert!(!info.is_transient);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unmapped_server_failure_is_transient() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/ticker"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new("test", rest_options()).build());
    let data = RequestData::new(Method::GET, endpoint(&server, "/ticker"), ());
    let result: WebCallResult<Value> = requester.request(&data).await;

    let error = result.error().expect("request fails");
    assert!(error.is_retryable());
    assert_eq!(error.to_string(), "Server error 503: HTTP status 503");
}

#[tokio::test]
async fn test_empty_body_is_distinguished() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/malformed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new("test", rest_options()).build());

    let empty: WebCallResult<Value> = requester
        .request(&RequestData::new(Method::GET, endpoint(&server, "/empty"), ()))
        .await;
    assert!(matches!(empty.error(), Some(ExchangeError::EmptyResponse)));
    assert!(empty.response().is_some());

    let malformed: WebCallResult<Value> = requester
        .request(&RequestData::new(Method::GET, endpoint(&server, "/malformed"), ()))
        .await;
    assert!(matches!(
        malformed.error(),
        Some(ExchangeError::DeserializationError(_))
    ));
}

#[tokio::test]
async fn test_original_data_is_kept() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/time"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"serverTime":1700000000000}"#))
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new(
        "test",
        rest_options().with_original_data(true)
    )
    .build());
    let result: WebCallResult<Value> = requester
        .request(&RequestData::new(Method::GET, endpoint(&server, "/time"), ()))
        .await;

    assert_eq!(
        result.original_data(),
        Some(r#"{"serverTime":1700000000000}"#)
    );
}

#[tokio::test]
async fn test_transport_failure() {
    let requester = assert_ok!(RestDataRequesterBuilder::new("test", rest_options()).build());
    let data = RequestData::new(
        Method::GET,
        url::Url::parse("http://127.0.0.1:9/unreachable").unwrap(),
        (),
    );
    let result: WebCallResult<Value> = requester.request(&data).await;

    assert!(matches!(
        result.error(),
        Some(ExchangeError::ServerError { info: None, .. })
    ));
    assert!(result.response().is_none());
}

#[tokio::test]
async fn test_request_timeout() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new(
        "test",
        rest_options().with_request_timeout(Duration::from_millis(200))
    )
    .build());
    let result: WebCallResult<Value> = requester
        .request(&RequestData::new(Method::GET, endpoint(&server, "/slow"), ()))
        .await;

    assert!(matches!(result.error(), Some(ExchangeError::Timeout(_))));
}

#[tokio::test]
async fn test_cancellation() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new("test", rest_options()).build());
    let data = RequestData::new(Method::GET, endpoint(&server, "/slow"), ());
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let result: WebCallResult<Value> = requester.request_with_cancellation(&data, &token).await;
    assert!(matches!(result.error(), Some(ExchangeError::Cancelled)));
}

#[tokio::test]
async fn test_cached_get_served_without_network() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"symbols": []})))
        .expect(1)
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new(
        "test",
        rest_options().with_caching(Duration::from_secs(60))
    )
    .build());
    let data = RequestData::new(Method::GET, endpoint(&server, "/exchangeInfo"), ());

    let first: WebCallResult<Value> = requester.request(&data).await;
    let second: WebCallResult<Value> = requester.request(&data).await;

    assert_eq!(first.response().map(|r| r.from_cache), Some(false));
    assert_eq!(second.response().map(|r| r.from_cache), Some(true));
    assert_eq!(second.data(), Some(&json!({"symbols": []})));
}

#[tokio::test]
async fn test_rate_limit_fail_behaviour() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/ticker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new(
        "test",
        rest_options().with_rate_limiting(RateLimitingBehaviour::Fail)
    )
    .with_rate_limiter(Arc::new(GovernorRateLimiter::per_minute("test", nonzero!(1u32))))
    .build());
    let data = RequestData::new(Method::GET, endpoint(&server, "/ticker"), ());

    let first: WebCallResult<Value> = requester.request(&data).await;
    assert!(first.is_success());

    let second: WebCallResult<Value> = requester.request(&data).await;
    assert!(matches!(second.error(), Some(ExchangeError::RateLimited(_))));
    assert!(second.response().is_none());
}

#[tokio::test]
async fn test_authenticated_request_is_signed() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .and(header("X-API-KEY", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"balances": []})))
        .expect(1)
        .mount(&server)
        .await;

    let requester = assert_ok!(RestDataRequesterBuilder::new(
        "test",
        rest_options().with_credentials(ApiCredentials::new("test-key", "test-secret"))
    )
    .build());
    let data = RequestData::new(
        Method::GET,
        endpoint(&server, "/account"),
        json!({"recvWindow": 5000}),
    )
    .authenticated();
    let result: WebCallResult<Value> = requester.request(&data).await;
    assert!(result.is_success(), "{:?}", result.error());

    let requests = server.received_requests().await.unwrap();
    let query = requests[0].url.query().unwrap().to_string();
    let (signed, signature) = query.rsplit_once("&signature=").unwrap();
    assert!(signed.starts_with("recvWindow=5000&timestamp="));

    let mut mac = Hmac::<Sha256>::new_from_slice(b"test-secret").unwrap();
    mac.update(signed.as_bytes());
    assert_eq!(signature, hex::encode(mac.finalize().into_bytes()));
}
