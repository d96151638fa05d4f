//! FMP client against a local mock server

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fundamentals_etl::api::{ApiGateway, FmpClient, ReportingPeriod, StatementKind};
use fundamentals_etl::ApiError;

fn client(server: &MockServer) -> FmpClient {
    FmpClient::new("test-key", 300, Duration::from_secs(60))
        .expect("client builds")
        .with_base_url(server.uri())
        .with_retry_backoff(Duration::from_millis(10))
}

#[tokio::test]
async fn test_fetch_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(query_param("symbol", "AAPL"))
        .and(query_param("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "symbol": "AAPL",
            "companyName": "Apple Inc.",
            "sector": "Technology",
            "industry": "Consumer Electronics",
            "exchange": "NASDAQ",
            "marketCap": 3.1e12
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let profile = client(&server).fetch_profile("AAPL").await.unwrap().expect("profile");

    assert_eq!(profile.company_name.as_deref(), Some("Apple Inc."));
    assert_eq!(profile.market_cap, Some(3.1e12));
}

#[tokio::test]
async fn test_unknown_symbol_has_no_profile() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert_eq!(client(&server).fetch_profile("ZZZZ").await.unwrap(), None);
}

#[tokio::test]
async fn test_fetch_statements_sends_period_and_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/income-statement"))
        .and(query_param("symbol", "AAPL"))
        .and(query_param("period", "quarter"))
        .and(query_param("limit", "8"))
        .and(query_param("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "date": "2023-12-30",
            "symbol": "AAPL",
            "period": "Q1",
            "fillingDate": "2024-02-02",
            "acceptedDate": "2024-02-01 18:03:17",
            "revenue": 119575000000i64,
            "netIncome": 33916000000i64,
            "epsdiluted": 2.18
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let lines = client(&server)
        .fetch_statements("AAPL", StatementKind::Income, ReportingPeriod::Quarter, 8)
        .await
        .unwrap();

    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line.filed_on(), Some("2024-02-02"));
    assert_eq!(line.accepted_date.as_deref(), Some("2024-02-01 18:03:17"));
    assert_eq!(line.revenue, Some(119_575_000_000.0));
    assert_eq!(line.eps_diluted, Some(2.18));
}

#[tokio::test]
async fn test_fetch_prices_accepts_wrapped_history() {
    let server = MockServer::start().await;
    Mock::given(path("/historical-price-eod/full"))
        .and(query_param("from", "2024-03-01"))
        .and(query_param("to", "2024-03-31"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "AAPL",
            "historical": [
                {"date": "2024-03-01", "open": 179.5, "high": 180.5, "low": 177.4, "close": 179.7, "volume": 73488000},
                {"date": "2024-03-04", "close": 175.1}
            ]
        })))
        .mount(&server)
        .await;

    let bars = client(&server)
        .fetch_prices(
            "AAPL",
            chrono::NaiveDate::from_ymd_opt(2024, 3, 1),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 31),
        )
        .await
        .unwrap();

    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].volume, Some(73_488_000.0));
    assert_eq!(bars[1].open, None);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"symbol": "MSFT"}])))
        .expect(1)
        .mount(&server)
        .await;

    let profile = client(&server).fetch_profile("MSFT").await.unwrap();

    assert_eq!(profile.map(|p| p.symbol), Some("MSFT".to_string()));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).fetch_profile("MSFT").await.unwrap_err();

    assert_matches!(err, ApiError::Status { status: 403, .. });
}

#[tokio::test]
async fn test_error_message_payload_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Error Message": "Invalid API KEY."})))
        .mount(&server)
        .await;

    let err = client(&server).fetch_profile("AAPL").await.unwrap_err();

    assert_matches!(err, ApiError::Payload(message) if message == "Invalid API KEY.");
}
