use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::router::schedule_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockStorageResponses, TestConfig, TestUser};

fn create_test_app(config: AppConfig) -> Router {
    schedule_routes(Arc::new(config))
}

fn config_for(mock_server: &MockServer) -> AppConfig {
    TestConfig::with_storage_url(&mock_server.uri()).to_app_config()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn public_slots_endpoint_needs_no_token() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    let service_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_schedules"))
        .and(query_param("day_of_week", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStorageResponses::weekly_schedule_row(&provider_id, &service_id, 1, "09:00:00", "12:00:00")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(config_for(&mock_server));

    // 2025-03-10 is a Monday
    let request = Request::builder()
        .method("GET")
        .uri(format!("/providers/{}/services/{}/slots?date=2025-03-10", provider_id, service_id))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["total_slots"], json!(6));
    assert_eq!(body["available_slots"][0]["time"], json!("09:00:00"));
    assert_eq!(body["available_slots"][0]["duration_minutes"], json!(30));
}

#[tokio::test]
async fn schedule_edits_require_a_token() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(config_for(&mock_server));

    let request = Request::builder()
        .method("PUT")
        .uri("/providers/someone/services/anything/week")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "days": {} }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forged_tokens_are_rejected() {
    let mock_server = MockServer::start().await;
    let app = create_test_app(config_for(&mock_server));

    let user = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_invalid_signature_token(&user);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/providers/{}/services/s-1/week", user.id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn providers_cannot_edit_someone_elses_week() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_storage_url(&mock_server.uri());
    let app = create_test_app(test_config.to_app_config());

    let intruder = TestUser::doctor("other@example.com");
    let token = JwtTestUtils::create_test_token(&intruder, &test_config.jwt_secret, Some(24));

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/providers/{}/services/s-1/week", Uuid::new_v4()))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(json!({ "days": {} }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn patients_cannot_edit_a_week_keyed_to_their_own_id() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_storage_url(&mock_server.uri());

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;

    let patient = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient, &test_config.jwt_secret, Some(24));

    let app = create_test_app(test_config.to_app_config());

    let body = json!({
        "days": {
            "1": {
                "is_available": true,
                "start_time": "09:00:00",
                "end_time": "17:00:00",
                "slot_minutes": 30
            }
        }
    });

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/providers/{}/services/s-1/week", patient.id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn provider_replaces_their_own_week() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_storage_url(&mock_server.uri());

    let provider = TestUser::doctor("doctor@example.com");
    let service_id = Uuid::new_v4().to_string();
    let token = JwtTestUtils::create_test_token(&provider, &test_config.jwt_secret, Some(24));

    let week_rows: Vec<Value> = (0u8..7)
        .map(|day| {
            let mut row = MockStorageResponses::weekly_schedule_row(
                &provider.id, &service_id, day, "09:00:00", "17:00:00",
            );
            row["is_available"] = json!(day == 1);
            row
        })
        .collect();

    Mock::given(method("POST"))
        .and(path("/rest/v1/weekly_schedules"))
        .and(query_param("on_conflict", "provider_id,service_id,day_of_week"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!(week_rows)))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());

    let body = json!({
        "days": {
            "1": {
                "is_available": true,
                "start_time": "09:00:00",
                "end_time": "17:00:00",
                "slot_minutes": 30
            }
        }
    });

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/providers/{}/services/{}/week", provider.id, service_id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["week"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn bad_day_windows_map_to_bad_request() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_storage_url(&mock_server.uri());

    let provider = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(&provider, &test_config.jwt_secret, Some(24));

    let app = create_test_app(test_config.to_app_config());

    let body = json!({
        "days": {
            "1": {
                "is_available": true,
                "start_time": "17:00:00",
                "end_time": "09:00:00",
                "slot_minutes": 30
            }
        }
    });

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/providers/{}/services/s-1/week", provider.id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("start time"));
}

#[tokio::test]
async fn duplicate_override_maps_to_conflict() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_storage_url(&mock_server.uri());

    let provider = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(&provider, &test_config.jwt_secret, Some(24));

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_overrides"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(MockStorageResponses::unique_violation()),
        )
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());

    let body = json!({
        "override_date": "2025-12-24",
        "is_available": false
    });

    let request = Request::builder()
        .method("POST")
        .uri(format!("/providers/{}/services/s-1/overrides", provider.id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn admins_manage_any_providers_schedule() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_storage_url(&mock_server.uri());

    let admin = TestUser::admin("admin@example.com");
    let provider_id = Uuid::new_v4().to_string();
    let service_id = Uuid::new_v4().to_string();
    let token = JwtTestUtils::create_test_token(&admin, &test_config.jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_schedules"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStorageResponses::weekly_schedule_row(&provider_id, &service_id, 2, "08:00:00", "12:00:00")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());

    let request = Request::builder()
        .method("GET")
        .uri(format!("/providers/{}/services/{}/week", provider_id, service_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["week"].as_array().unwrap().len(), 1);
    assert_eq!(body["week"][0]["day_of_week"], json!(2));
}

#[tokio::test]
async fn deleting_an_override_reports_success() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_storage_url(&mock_server.uri());

    let provider = TestUser::center("clinic@example.com");
    let service_id = Uuid::new_v4().to_string();
    let token = JwtTestUtils::create_test_token(&provider, &test_config.jwt_secret, Some(24));

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/schedule_overrides"))
        .and(query_param("override_date", "eq.2025-12-24"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStorageResponses::schedule_override_row(&provider.id, &service_id, "2025-12-24", false)
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/providers/{}/services/{}/overrides/2025-12-24", provider.id, service_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn overrides_are_listed_within_the_requested_window() {
    let mock_server = MockServer::start().await;
    let test_config = TestConfig::with_storage_url(&mock_server.uri());

    let provider = TestUser::doctor("doctor@example.com");
    let service_id = Uuid::new_v4().to_string();
    let token = JwtTestUtils::create_test_token(&provider, &test_config.jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_overrides"))
        .and(query_param("provider_id", format!("eq.{}", provider.id)))
        .and(query_param("override_date", "gte.2025-12-01"))
        .and(query_param("override_date", "lte.2025-12-31"))
        .and(query_param("order", "override_date.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStorageResponses::schedule_override_row(&provider.id, &service_id, "2025-12-24", false),
            MockStorageResponses::schedule_override_row(&provider.id, &service_id, "2025-12-31", true),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_config.to_app_config());

    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/providers/{}/services/{}/overrides?from=2025-12-01&to=2025-12-31",
            provider.id, service_id
        ))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["total"], json!(2));
    assert_eq!(body["overrides"][0]["override_date"], json!("2025-12-24"));
    assert_eq!(body["overrides"][1]["is_available"], json!(true));
}
