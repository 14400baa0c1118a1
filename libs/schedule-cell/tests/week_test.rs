use std::collections::BTreeMap;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{header, headers, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::models::{CreateOverrideRequest, DayConfigInput, ScheduleError, SwitchServiceRequest};
use schedule_cell::services::{OverrideService, ScheduleService};
use shared_config::AppConfig;
use shared_utils::test_utils::{MockStorageResponses, TestConfig};

fn config_for(mock_server: &MockServer) -> AppConfig {
    TestConfig::with_storage_url(&mock_server.uri()).to_app_config()
}

fn open_day(start: &str, end: &str, slot_minutes: i32) -> DayConfigInput {
    DayConfigInput {
        is_available: true,
        start_time: Some(NaiveTime::parse_from_str(start, "%H:%M:%S").unwrap()),
        end_time: Some(NaiveTime::parse_from_str(end, "%H:%M:%S").unwrap()),
        break_start: None,
        break_end: None,
        slot_minutes: Some(slot_minutes),
        notes: None,
    }
}

fn full_week_rows(provider_id: &str, service_id: &str, open_days: &[u8]) -> Value {
    let rows: Vec<Value> = (0u8..7)
        .map(|day| {
            let mut row = MockStorageResponses::weekly_schedule_row(
                provider_id, service_id, day, "09:00:00", "17:00:00",
            );
            row["is_available"] = json!(open_days.contains(&day));
            row
        })
        .collect();
    Value::Array(rows)
}

#[tokio::test]
async fn replace_week_always_writes_seven_rows() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    let service_id = Uuid::new_v4().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/weekly_schedules"))
        .and(query_param("on_conflict", "provider_id,service_id,day_of_week"))
        .and(headers("Prefer", vec!["return=representation", "resolution=merge-duplicates"]))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(full_week_rows(&provider_id, &service_id, &[1, 3])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut days = BTreeMap::new();
    days.insert(1, open_day("09:00:00", "17:00:00", 30));
    days.insert(3, open_day("10:00:00", "14:00:00", 20));

    let service = ScheduleService::new(&config_for(&mock_server));
    let week = service
        .replace_week(&provider_id, &service_id, &days, "test-token")
        .await
        .unwrap();

    assert_eq!(week.len(), 7);
    assert!(week.windows(2).all(|pair| pair[0].day_of_week <= pair[1].day_of_week));

    let requests = mock_server.received_requests().await.unwrap();
    let upsert = requests.iter().find(|r| r.method.as_str() == "POST").unwrap();
    let body: Value = serde_json::from_slice(&upsert.body).unwrap();
    let rows = body.as_array().unwrap();

    assert_eq!(rows.len(), 7);
    // Submitted days keep their window, every omitted day is written closed.
    assert_eq!(rows[1]["is_available"], json!(true));
    assert_eq!(rows[1]["start_time"], json!("09:00:00"));
    assert_eq!(rows[3]["slot_minutes"], json!(20));
    for day in [0usize, 2, 4, 5, 6] {
        assert_eq!(rows[day]["is_available"], json!(false), "day {} should be closed", day);
        assert_eq!(rows[day]["start_time"], json!(null));
    }
}

#[tokio::test]
async fn replace_week_rejects_bad_windows_before_writing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut days = BTreeMap::new();
    days.insert(1, open_day("17:00:00", "09:00:00", 30));

    let service = ScheduleService::new(&config_for(&mock_server));
    let err = service
        .replace_week("provider", "service", &days, "test-token")
        .await
        .unwrap_err();

    assert_matches!(err, ScheduleError::InvalidConfig(_));
}

#[tokio::test]
async fn replace_week_rejects_out_of_range_days() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut days = BTreeMap::new();
    days.insert(9, open_day("09:00:00", "17:00:00", 30));

    let service = ScheduleService::new(&config_for(&mock_server));
    let err = service
        .replace_week("provider", "service", &days, "test-token")
        .await
        .unwrap_err();

    assert_matches!(err, ScheduleError::InvalidConfig(message) if message.contains("out of range"));
}

#[tokio::test]
async fn switch_service_reports_a_failed_autosave_but_still_switches() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    let from_service = Uuid::new_v4().to_string();
    let to_service = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/weekly_schedules"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(MockStorageResponses::error_response("storage down", "500")),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_schedules"))
        .and(query_param("service_id", format!("eq.{}", to_service)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(full_week_rows(&provider_id, &to_service.to_string(), &[2])),
        )
        .mount(&mock_server)
        .await;

    let mut pending = BTreeMap::new();
    pending.insert(1, open_day("09:00:00", "12:00:00", 30));

    let service = ScheduleService::new(&config_for(&mock_server));
    let response = service
        .switch_service(
            &provider_id,
            &from_service,
            SwitchServiceRequest { to_service_id: to_service, pending_days: Some(pending) },
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(response.week.len(), 7);
    let warning = response.autosave_warning.unwrap();
    assert!(warning.contains("not saved"), "unexpected warning: {}", warning);
}

#[tokio::test]
async fn switch_service_without_pending_changes_writes_nothing() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    let to_service = Uuid::new_v4();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_schedules"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(full_week_rows(&provider_id, &to_service.to_string(), &[1])),
        )
        .mount(&mock_server)
        .await;

    let service = ScheduleService::new(&config_for(&mock_server));
    let response = service
        .switch_service(
            &provider_id,
            "ignored-service",
            SwitchServiceRequest { to_service_id: to_service, pending_days: None },
            "test-token",
        )
        .await
        .unwrap();

    assert!(response.autosave_warning.is_none());
    assert_eq!(response.week.len(), 7);
}

#[tokio::test]
async fn create_override_returns_the_inserted_row() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    let service_id = Uuid::new_v4().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_overrides"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockStorageResponses::schedule_override_row(&provider_id, &service_id, "2025-12-24", false)
        ])))
        .mount(&mock_server)
        .await;

    let request = CreateOverrideRequest {
        override_date: NaiveDate::from_ymd_opt(2025, 12, 24).unwrap(),
        is_available: false,
        start_time: None,
        end_time: None,
        break_start: None,
        break_end: None,
        slot_minutes: None,
        notes: Some("Christmas Eve".to_string()),
    };

    let service = OverrideService::new(&config_for(&mock_server));
    let created = service
        .create_override(&provider_id, &service_id, request, "test-token")
        .await
        .unwrap();

    assert_eq!(created.override_date, NaiveDate::from_ymd_opt(2025, 12, 24).unwrap());
    assert!(!created.is_available);
}

#[tokio::test]
async fn duplicate_override_surfaces_as_a_conflict() {
    let mock_server = MockServer::start().await;
    let date = NaiveDate::from_ymd_opt(2025, 12, 24).unwrap();

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_overrides"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(MockStorageResponses::unique_violation()),
        )
        .mount(&mock_server)
        .await;

    let request = CreateOverrideRequest {
        override_date: date,
        is_available: false,
        start_time: None,
        end_time: None,
        break_start: None,
        break_end: None,
        slot_minutes: None,
        notes: None,
    };

    let service = OverrideService::new(&config_for(&mock_server));
    let err = service
        .create_override("provider", "service", request, "test-token")
        .await
        .unwrap_err();

    assert_matches!(err, ScheduleError::DuplicateOverride(d) if d == date);
}

#[tokio::test]
async fn create_override_validates_the_window_before_writing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&mock_server)
        .await;

    // Available but with no working window.
    let request = CreateOverrideRequest {
        override_date: NaiveDate::from_ymd_opt(2025, 12, 24).unwrap(),
        is_available: true,
        start_time: None,
        end_time: None,
        break_start: None,
        break_end: None,
        slot_minutes: Some(30),
        notes: None,
    };

    let service = OverrideService::new(&config_for(&mock_server));
    let err = service
        .create_override("provider", "service", request, "test-token")
        .await
        .unwrap_err();

    assert_matches!(err, ScheduleError::InvalidConfig(_));
}

#[tokio::test]
async fn delete_override_removes_the_exception() {
    let mock_server = MockServer::start().await;
    let provider_id = Uuid::new_v4().to_string();
    let service_id = Uuid::new_v4().to_string();
    let date = NaiveDate::from_ymd_opt(2025, 12, 24).unwrap();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/schedule_overrides"))
        .and(query_param("override_date", format!("eq.{}", date)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStorageResponses::schedule_override_row(&provider_id, &service_id, "2025-12-24", false)
        ])))
        .mount(&mock_server)
        .await;

    let service = OverrideService::new(&config_for(&mock_server));
    let result = service
        .delete_override(&provider_id, &service_id, date, "test-token")
        .await;

    assert!(result.is_ok());
}
