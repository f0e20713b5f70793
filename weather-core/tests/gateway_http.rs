//! Integration tests for WeatherGateway using wiremock.
//!
//! These tests run the full HTTP path: request building, status
//! classification, retry/breaker policies, parsing and caching.

use chrono::{Duration as ChronoDuration, Utc};
use weather_core::{CircuitState, Config, Endpoint, GatewayError, WeatherCondition, WeatherGateway};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Defaults pointed at the mock server, with millisecond backoff.
fn test_config(server: &MockServer) -> Config {
    let mut cfg = Config::default().with_base_url(&server.uri());
    cfg.retry.base_delay_ms = 1;
    cfg.upstream.attempt_timeout_secs = 2;
    cfg
}

fn gateway(cfg: Config) -> WeatherGateway {
    WeatherGateway::from_config(cfg).expect("client should build")
}

fn london() -> serde_json::Value {
    serde_json::json!({
        "results": [
            { "id": 2643743, "name": "London", "latitude": 51.50853, "longitude": -0.12574,
              "country": "United Kingdom", "admin1": "England" },
            { "id": 6058560, "name": "London", "latitude": 42.98339, "longitude": -81.23304,
              "country": "Canada", "admin1": "Ontario" }
        ],
        "generationtime_ms": 0.7
    })
}

fn daily_body(days: usize) -> serde_json::Value {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let time: Vec<String> = (0..days)
        .map(|i| (start + ChronoDuration::days(i as i64)).format("%Y-%m-%d").to_string())
        .collect();

    serde_json::json!({
        "latitude": 51.5, "longitude": -0.12, "utc_offset_seconds": 3600, "timezone": "Europe/London",
        "daily": {
            "time": time,
            "weather_code": vec![3; days],
            "temperature_2m_max": (0..days).map(|i| 15.0 + i as f64).collect::<Vec<_>>(),
            "temperature_2m_min": vec![8.0; days],
            "precipitation_sum": vec![0.2; days],
            "wind_speed_10m_max": vec![18.5; days]
        }
    })
}

/// 48 hourly unix timestamps where index 10 is the first not in the past.
fn hourly_body() -> serde_json::Value {
    let now = Utc::now();
    let time: Vec<i64> = (0..48i64)
        .map(|i| (now + ChronoDuration::minutes(60 * (i - 10) + 30)).timestamp())
        .collect();

    serde_json::json!({
        "utc_offset_seconds": 3600,
        "hourly": {
            "time": time,
            "weather_code": vec![61; 48],
            "temperature_2m": (0..48).map(f64::from).collect::<Vec<_>>(),
            "precipitation": vec![0.5; 48],
            "wind_speed_10m": vec![10.0; 48]
        }
    })
}

#[tokio::test]
async fn test_search_sends_expected_params_and_caches_by_lowercase_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("name", "London"))
        .and(query_param("count", "5"))
        .and(query_param("language", "en"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway(test_config(&mock_server));

    let first = gateway.search_cities("London").await.unwrap();
    let second = gateway.search_cities("london").await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(first[1].country.as_deref(), Some("Canada"));
    assert_eq!(first[1].region.as_deref(), Some("Ontario"));
    assert!(!first[0].same_place(&first[1]));
}

#[tokio::test]
async fn test_search_with_no_matches_returns_empty() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "generationtime_ms": 0.2 })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let cities = gateway(test_config(&mock_server)).search_cities("Xyzzyville").await.unwrap();

    assert!(cities.is_empty());
}

#[tokio::test]
async fn test_daily_forecast_returns_first_five_days() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "51.5074"))
        .and(query_param("longitude", "-0.1278"))
        .and(query_param(
            "daily",
            "weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max",
        ))
        .and(query_param("timezone", "auto"))
        .and(query_param("forecast_days", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(daily_body(7)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway(test_config(&mock_server));
    let days = gateway.daily_forecast(51.5074, -0.1278).await.unwrap();

    assert_eq!(days.len(), 5);
    assert_eq!(days[0].date.to_string(), "2024-05-01");
    assert_eq!(days[4].date.to_string(), "2024-05-05");
    assert_eq!(days[4].max_temp_c, 19.0);
    assert_eq!(days[0].condition, WeatherCondition::PartlyCloudy);

    // Cached: no second upstream call.
    assert_eq!(gateway.daily_forecast(51.5074, -0.1278).await.unwrap(), days);
}

#[tokio::test]
async fn test_hourly_forecast_skips_past_hours_and_caps_at_twelve() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("hourly", "weather_code,temperature_2m,precipitation,wind_speed_10m"))
        .and(query_param("forecast_days", "2"))
        .and(query_param("timezone", "auto"))
        .and(query_param("timeformat", "unixtime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hourly_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway(test_config(&mock_server));
    let hours = gateway.hourly_forecast(40.7128, -74.006).await.unwrap();

    assert_eq!(hours.len(), 12);
    // temperature_2m carries the provider index.
    let indices: Vec<f64> = hours.iter().map(|h| h.temperature_c).collect();
    assert_eq!(indices, (10..22).map(f64::from).collect::<Vec<_>>());
    assert!(hours.iter().all(|h| h.timestamp.with_timezone(&Utc) >= Utc::now()));
    assert_eq!(hours[0].condition, WeatherCondition::Rain);
    assert_eq!(hours[0].timestamp.offset().local_minus_utc(), 3600);

    let again = gateway.hourly_forecast(40.7128, -74.006).await.unwrap();
    assert_eq!(again.len(), 12);
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .with_priority(1)
        .expect(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london()))
        .with_priority(2)
        .expect(1)
        .mount(&mock_server)
        .await;

    let cities = gateway(test_config(&mock_server)).search_cities("London").await.unwrap();

    assert_eq!(cities.len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_surface_as_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(4)
        .mount(&mock_server)
        .await;

    let err = gateway(test_config(&mock_server)).daily_forecast(10.0, 20.0).await.unwrap_err();

    match &err {
        GatewayError::UpstreamUnavailable { endpoint, attempts, status, request, .. } => {
            assert_eq!(*endpoint, Endpoint::Forecast);
            assert_eq!(*attempts, 4);
            assert_eq!(*status, Some(500));
            assert!(request.contains("latitude=10.0000"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_request_timeout_status_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(408))
        .expect(4)
        .mount(&mock_server)
        .await;

    let err = gateway(test_config(&mock_server)).search_cities("Oslo").await.unwrap_err();

    assert!(matches!(err, GatewayError::UpstreamUnavailable { attempts: 4, status: Some(408), .. }));
}

#[tokio::test]
async fn test_client_error_is_rejected_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": true,
            "reason": "Parameter 'daily' is invalid"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway(test_config(&mock_server));
    let err = gateway.daily_forecast(10.0, 20.0).await.unwrap_err();

    match err {
        GatewayError::UpstreamRejected { status, reason, .. } => {
            assert_eq!(status, 400);
            assert_eq!(reason, "Parameter 'daily' is invalid");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(gateway.breaker(Endpoint::Forecast).consecutive_failures(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_data_corrupt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = gateway(test_config(&mock_server)).search_cities("Rome").await.unwrap_err();

    assert!(matches!(err, GatewayError::DataCorrupt { endpoint: Endpoint::Geocoding, .. }));
}

#[tokio::test]
async fn test_breaker_opens_per_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut cfg = test_config(&mock_server);
    cfg.retry.max_retries = 0;
    cfg.breaker.failure_threshold = 2;
    let gateway = gateway(cfg);

    for _ in 0..2 {
        let err = gateway.daily_forecast(1.0, 1.0).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable { attempts: 1, .. }));
    }

    let err = gateway.hourly_forecast(1.0, 1.0).await.unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen { endpoint: Endpoint::Forecast, .. }));
    assert_eq!(gateway.breaker(Endpoint::Forecast).state(), CircuitState::Open);

    // Geocoding has its own breaker.
    assert_eq!(gateway.search_cities("London").await.unwrap().len(), 2);
    assert_eq!(gateway.breaker(Endpoint::Geocoding).state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_slow_upstream_hits_attempt_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(london())
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let mut cfg = test_config(&mock_server);
    cfg.retry.max_retries = 0;
    cfg.upstream.attempt_timeout_secs = 1;

    let err = gateway(cfg).search_cities("Lima").await.unwrap_err();

    assert!(matches!(err, GatewayError::UpstreamUnavailable { attempts: 1, .. }));
}

#[tokio::test]
async fn test_concurrent_searches_for_same_city_both_succeed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london()))
        .mount(&mock_server)
        .await;

    let gateway = gateway(test_config(&mock_server));
    let (a, b) = tokio::join!(gateway.search_cities("London"), gateway.search_cities("LONDON"));

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(gateway.caches().cities.len(), 1);
}
