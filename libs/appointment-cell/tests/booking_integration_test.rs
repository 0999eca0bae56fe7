use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::{
    AppointmentBookingService, AppointmentError, AppointmentStatus, BookAppointmentRequest,
};
use shared_config::AppConfig;

const TEST_TOKEN: &str = "test-token";

fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        supabase_url: base_url.to_string(),
        supabase_anon_key: "test-anon-key".to_string(),
    }
}

/// A future timestamp inside the mocked morning shift (08:00-12:00).
fn next_week_at(hour: u32) -> DateTime<Utc> {
    (Utc::now() + Duration::days(7))
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
        .and_utc()
}

fn appointment_row(
    patient_id: Uuid,
    doctor_id: Uuid,
    when: DateTime<Utc>,
    status: &str,
) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "patient_id": patient_id,
        "doctor_id": doctor_id,
        "appointment_date": when.to_rfc3339(),
        "status": status,
        "notes": null,
        "cancellation_reason": null,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": null
    })
}

/// Directory, catalog and lock mocks every booking flow needs.
async fn mount_booking_fixtures(server: &MockServer, patient_id: Uuid, doctor_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": patient_id }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": doctor_id }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/shifts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "shift_type": "morning",
            "start_time": "08:00:00",
            "end_time": "12:00:00"
        }])))
        .mount(server)
        .await;

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

/// Capacity-count mocks. Mount order matters: the (patient, doctor) pair
/// query carries both params, so it must be matched before the looser ones.
async fn mount_capacity_counts(
    server: &MockServer,
    patient_id: Uuid,
    doctor_id: Uuid,
    pair_rows: serde_json::Value,
    doctor_rows: serde_json::Value,
    patient_rows: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(pair_rows))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(doctor_rows))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(patient_rows))
        .mount(server)
        .await;
}

#[tokio::test]
async fn booking_succeeds_when_every_capacity_rule_passes() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let when = next_week_at(9);

    mount_booking_fixtures(&mock_server, patient_id, doctor_id).await;
    mount_capacity_counts(&mock_server, patient_id, doctor_id, json!([]), json!([]), json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201)
            .set_body_json(json!([appointment_row(patient_id, doctor_id, when, "pending")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let appointment = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id,
                doctor_id,
                appointment_date: when,
                notes: Some("first visit".to_string()),
            },
            TEST_TOKEN,
        )
        .await
        .expect("booking should succeed");

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.doctor_id, doctor_id);
}

#[tokio::test]
async fn sixth_booking_in_a_shift_is_rejected() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let when = next_week_at(9);

    mount_booking_fixtures(&mock_server, patient_id, doctor_id).await;

    // Five other patients already hold the morning shift that day.
    let full_shift: Vec<serde_json::Value> = (0..5)
        .map(|_| appointment_row(Uuid::new_v4(), doctor_id, next_week_at(10), "pending"))
        .collect();
    mount_capacity_counts(
        &mock_server,
        patient_id,
        doctor_id,
        json!([]),
        json!(full_shift),
        json!([]),
    ).await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let result = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id,
                doctor_id,
                appointment_date: when,
                notes: None,
            },
            TEST_TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::DoctorFullyBooked));
}

#[tokio::test]
async fn appointments_in_other_shifts_do_not_consume_capacity() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let when = next_week_at(9);

    mount_booking_fixtures(&mock_server, patient_id, doctor_id).await;

    // Four active plus one in the afternoon: the morning shift still has room.
    let mut day_rows: Vec<serde_json::Value> = (0..4)
        .map(|_| appointment_row(Uuid::new_v4(), doctor_id, next_week_at(10), "pending"))
        .collect();
    day_rows.push(appointment_row(Uuid::new_v4(), doctor_id, next_week_at(14), "pending"));
    mount_capacity_counts(
        &mock_server,
        patient_id,
        doctor_id,
        json!([]),
        json!(day_rows),
        json!([]),
    ).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201)
            .set_body_json(json!([appointment_row(patient_id, doctor_id, when, "pending")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let result = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id,
                doctor_id,
                appointment_date: when,
                notes: None,
            },
            TEST_TOKEN,
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn patient_cannot_hold_two_appointments_on_one_day() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let other_doctor = Uuid::new_v4();
    let when = next_week_at(9);

    mount_booking_fixtures(&mock_server, patient_id, doctor_id).await;

    // The patient already sees a different doctor that day.
    mount_capacity_counts(
        &mock_server,
        patient_id,
        doctor_id,
        json!([]),
        json!([]),
        json!([appointment_row(patient_id, other_doctor, next_week_at(10), "confirmed")]),
    ).await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let result = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id,
                doctor_id,
                appointment_date: when,
                notes: None,
            },
            TEST_TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::PatientAlreadyBooked));
}

#[tokio::test]
async fn patient_doctor_pair_is_capped_across_time() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let when = next_week_at(9);

    mount_booking_fixtures(&mock_server, patient_id, doctor_id).await;

    let history: Vec<serde_json::Value> = (0..5)
        .map(|i| appointment_row(patient_id, doctor_id, when - Duration::days(30 * (i + 1)), "completed"))
        .collect();
    mount_capacity_counts(
        &mock_server,
        patient_id,
        doctor_id,
        json!(history),
        json!([]),
        json!([]),
    ).await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let result = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id,
                doctor_id,
                appointment_date: when,
                notes: None,
            },
            TEST_TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::PatientDoctorLimitReached));
}

#[tokio::test]
async fn booking_outside_every_shift_window_is_rejected() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mount_booking_fixtures(&mock_server, patient_id, doctor_id).await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let result = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id,
                doctor_id,
                appointment_date: next_week_at(20),
                notes: None,
            },
            TEST_TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidBookingWindow));
}

#[tokio::test]
async fn booking_in_the_past_is_rejected_before_any_lookup() {
    let mock_server = MockServer::start().await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let result = service
        .book_appointment(
            BookAppointmentRequest {
                patient_id: Uuid::new_v4(),
                doctor_id: Uuid::new_v4(),
                appointment_date: Utc::now() - Duration::hours(1),
                notes: None,
            },
            TEST_TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::PastAppointmentDate));
}

#[tokio::test]
async fn cancellation_needs_four_hours_notice() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    let mut row = appointment_row(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Utc::now() + Duration::hours(3),
        "confirmed",
    );
    row["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let result = service
        .cancel_appointment(appointment_id, Some("sick".to_string()), TEST_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::CancellationWindowPassed));
}

#[tokio::test]
async fn cancellation_with_enough_notice_succeeds() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let when = Utc::now() + Duration::hours(6);

    let mut row = appointment_row(patient_id, doctor_id, when, "confirmed");
    row["id"] = json!(appointment_id);
    let mut cancelled = appointment_row(patient_id, doctor_id, when, "cancelled");
    cancelled["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let appointment = service
        .cancel_appointment(appointment_id, None, TEST_TOKEN)
        .await
        .expect("cancellation with notice should succeed");

    assert_eq!(appointment.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn completed_appointments_cannot_be_cancelled() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    let mut row = appointment_row(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Utc::now() - Duration::days(1),
        "completed",
    );
    row["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let result = service
        .cancel_appointment(appointment_id, None, TEST_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidStatusTransition(_)));
}

#[tokio::test]
async fn reschedule_excludes_the_appointment_from_its_own_counts() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let new_date = next_week_at(10);

    let mut existing = appointment_row(patient_id, doctor_id, next_week_at(9), "pending");
    existing["id"] = json!(appointment_id);
    let mut moved = appointment_row(patient_id, doctor_id, new_date, "pending");
    moved["id"] = json!(appointment_id);

    mount_booking_fixtures(&mock_server, patient_id, doctor_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([existing])))
        .mount(&mock_server)
        .await;

    mount_capacity_counts(&mock_server, patient_id, doctor_id, json!([]), json!([]), json!([])).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([moved])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = AppointmentBookingService::new(&test_config(&mock_server.uri()));
    let appointment = service
        .reschedule_appointment(appointment_id, new_date, TEST_TOKEN)
        .await
        .expect("reschedule should succeed");

    assert_eq!(appointment.appointment_date, new_date);
}
