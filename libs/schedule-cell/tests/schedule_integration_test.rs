use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::{
    CreateScheduleRequest, ScheduleAssignerService, ScheduleError, ShiftGroup,
    UpdateScheduleRangeRequest,
};
use shared_config::AppConfig;

const TEST_TOKEN: &str = "test-token";

fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        supabase_url: base_url.to_string(),
        supabase_anon_key: "test-anon-key".to_string(),
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn assignment_row(doctor_id: Uuid, shift_id: Uuid, from: &str, to: Option<&str>) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "shift_id": shift_id,
        "effective_from": from,
        "effective_to": to,
        "status": "active"
    })
}

async fn mount_lock_mocks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn batch_create_skips_conflicting_doctor_and_creates_the_rest() {
    let mock_server = MockServer::start().await;
    mount_lock_mocks(&mock_server).await;

    let shift_id = Uuid::new_v4();
    let busy_doctor = Uuid::new_v4();
    let free_doctor = Uuid::new_v4();

    // The busy doctor already holds this shift for an overlapping range.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_shifts"))
        .and(query_param("doctor_id", format!("eq.{}", busy_doctor)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assignment_row(busy_doctor, shift_id, "2024-06-10", Some("2024-06-20"))
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_shifts"))
        .and(query_param("doctor_id", format!("eq.{}", free_doctor)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_shifts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            assignment_row(free_doctor, shift_id, "2024-06-01", Some("2024-06-30"))
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = ScheduleAssignerService::new(&test_config(&mock_server.uri()));
    let response = service
        .create_schedule(
            CreateScheduleRequest {
                from_date: d(2024, 6, 1),
                to_date: d(2024, 6, 30),
                shift_groups: vec![ShiftGroup {
                    shift_id,
                    doctor_ids: vec![busy_doctor, free_doctor],
                }],
            },
            TEST_TOKEN,
        )
        .await
        .expect("batch create should succeed even with conflicts");

    assert_eq!(response.created_count, 1);
    assert_eq!(response.skipped.len(), 1);
    assert_eq!(response.skipped[0].doctor_id, busy_doctor);
    assert_eq!(response.skipped[0].shift_id, shift_id);
}

#[tokio::test]
async fn daily_create_writes_one_assignment_per_day() {
    let mock_server = MockServer::start().await;
    mount_lock_mocks(&mock_server).await;

    let shift_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_shifts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // Three days in range, so exactly three inserts.
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_shifts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            assignment_row(doctor_id, shift_id, "2024-06-01", Some("2024-06-01"))
        ])))
        .expect(3)
        .mount(&mock_server)
        .await;

    let service = ScheduleAssignerService::new(&test_config(&mock_server.uri()));
    let response = service
        .create_daily_schedule(
            CreateScheduleRequest {
                from_date: d(2024, 6, 1),
                to_date: d(2024, 6, 3),
                shift_groups: vec![ShiftGroup {
                    shift_id,
                    doctor_ids: vec![doctor_id],
                }],
            },
            TEST_TOKEN,
        )
        .await
        .expect("daily create should succeed");

    assert_eq!(response.created_count, 3);
    assert!(response.skipped.is_empty());
}

#[tokio::test]
async fn inverted_range_is_rejected_before_any_write() {
    let mock_server = MockServer::start().await;

    let service = ScheduleAssignerService::new(&test_config(&mock_server.uri()));
    let result = service
        .create_schedule(
            CreateScheduleRequest {
                from_date: d(2024, 6, 30),
                to_date: d(2024, 6, 1),
                shift_groups: vec![],
            },
            TEST_TOKEN,
        )
        .await;

    assert_matches!(result, Err(ScheduleError::InvalidDateRange(_)));
}

#[tokio::test]
async fn update_range_fails_when_no_group_matches_the_old_range() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_shifts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = ScheduleAssignerService::new(&test_config(&mock_server.uri()));
    let result = service
        .update_range(
            Uuid::new_v4(),
            UpdateScheduleRangeRequest {
                old_from: d(2024, 6, 1),
                old_to: Some(d(2024, 6, 30)),
                new_to: Some(d(2024, 7, 15)),
                add_doctor_ids: vec![],
                remove_doctor_ids: vec![],
            },
            TEST_TOKEN,
        )
        .await;

    assert_matches!(result, Err(ScheduleError::RangeNotFound));
}

#[tokio::test]
async fn board_groups_assignments_under_their_shift() {
    let mock_server = MockServer::start().await;

    let shift_id = Uuid::new_v4();
    let other_shift_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/shifts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": shift_id,
                "shift_type": "morning",
                "start_time": "08:00:00",
                "end_time": "12:00:00"
            },
            {
                "id": other_shift_id,
                "shift_type": "afternoon",
                "start_time": "12:00:00",
                "end_time": "16:00:00"
            }
        ])))
        .mount(&mock_server)
        .await;

    // One open-ended assignment on the morning shift.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_shifts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assignment_row(doctor_id, shift_id, "2024-06-01", None)
        ])))
        .mount(&mock_server)
        .await;

    let service = ScheduleAssignerService::new(&test_config(&mock_server.uri()));
    let board = service
        .get_schedule_board(d(2024, 6, 1), d(2024, 6, 30), TEST_TOKEN)
        .await
        .expect("board should load");

    assert_eq!(board.len(), 2);

    let morning = board.iter().find(|v| v.shift.id == shift_id).unwrap();
    assert_eq!(morning.doctors.len(), 1);
    assert_eq!(morning.doctors[0].doctor_id, doctor_id);
    // Open-ended ranges display as one month from their start.
    assert_eq!(morning.doctors[0].effective_to, d(2024, 7, 1));

    let afternoon = board.iter().find(|v| v.shift.id == other_shift_id).unwrap();
    assert!(afternoon.doctors.is_empty());
}
