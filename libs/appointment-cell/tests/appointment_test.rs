use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{CreateAppointmentRequest, RescheduleAppointmentRequest};
use appointment_cell::{
    appointment_cron_routes, AppointmentCronState, AppointmentError, AppointmentService, AppointmentSweeper,
};
use notification_cell::test_utils::RecordingNotifier;
use notification_cell::{ExpoPushClient, NotificationService, NotificationTarget};
use security_cell::CronGuard;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestIdentity};

// ==============================================================================
// MISSED SWEEP
// ==============================================================================

#[tokio::test]
async fn missed_transition_happens_at_most_once_across_sweeps() {
    let server = MockServer::start().await;
    let (appointment_id, doctor_id, session_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let now = Utc.with_ymd_and_hms(2025, 1, 10, 11, 0, 0).unwrap();
    let scheduled_at = now - Duration::minutes(30);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(booked,confirmed)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::appointment(
            appointment_id,
            doctor_id,
            session_id,
            scheduled_at,
            "confirmed",
            &[]
        )])))
        .mount(&server)
        .await;
    // The first conditional update wins; any later one matches no row.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(booked,confirmed)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::appointment(
            appointment_id,
            doctor_id,
            session_id,
            scheduled_at,
            "missed",
            &[]
        )])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let first = AppointmentSweeper::new(&config, notifier.clone());
    let second = AppointmentSweeper::new(&config, notifier.clone());

    let (a, b) = tokio::join!(first.mark_missed(now), second.mark_missed(now));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.transitioned.len() + b.transitioned.len(), 1);
    assert_eq!(notifier.count_titled("Appointment Missed"), 2);

    let targets = notifier.targets_titled("Appointment Missed");
    assert!(targets.contains(&NotificationTarget::User(doctor_id)));
    assert!(targets.contains(&NotificationTarget::Session(session_id)));
}

#[tokio::test]
async fn appointments_inside_grace_period_are_left_alone() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 1, 10, 10, 10, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            now - Duration::minutes(10),
            "booked",
            &[]
        )])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let report = AppointmentSweeper::new(&config, notifier.clone())
        .mark_missed(now)
        .await
        .unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.skipped, 1);
    assert!(notifier.sent().is_empty());
}

// ==============================================================================
// REMINDERS
// ==============================================================================

#[tokio::test]
async fn reminder_is_sent_then_label_recorded() {
    let server = MockServer::start().await;
    let (appointment_id, doctor_id, session_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let now = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("reminders_sent", "not.cs.{1h}"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::appointment(
            appointment_id,
            doctor_id,
            session_id,
            now + Duration::minutes(62),
            "confirmed",
            &["24h"]
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({ "reminders_sent": ["24h", "1h"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let report = AppointmentSweeper::new(&config, notifier.clone())
        .send_reminders(now)
        .await
        .unwrap();

    assert_eq!(report.sent, vec![("1h".to_string(), appointment_id)]);
    assert_eq!(notifier.count_titled("Appointment Reminder"), 2);
}

#[tokio::test]
async fn reminder_label_waits_for_persisted_notifications() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let now = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("reminders_sent", "not.cs.{1h}"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::appointment(
            appointment_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            now + Duration::minutes(62),
            "confirmed",
            &["24h"]
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "message": "unavailable" })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(NotificationService::new(&config, Arc::new(ExpoPushClient::new(&config))));
    let report = AppointmentSweeper::new(&config, notifier)
        .send_reminders(now)
        .await
        .unwrap();

    assert!(report.sent.is_empty());
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn reminder_already_recorded_is_not_repeated() {
    let server = MockServer::start().await;
    let now = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("reminders_sent", "not.cs.{15min}"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            now + Duration::minutes(15),
            "confirmed",
            &["24h", "1h", "15min"]
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let report = AppointmentSweeper::new(&config, notifier.clone())
        .send_reminders(now)
        .await
        .unwrap();

    assert!(report.sent.is_empty());
    assert!(notifier.sent().is_empty());
}

// ==============================================================================
// RESCHEDULE
// ==============================================================================

#[tokio::test]
async fn reschedule_creates_replacement_and_notifies_patient_once() {
    let server = MockServer::start().await;
    let doctor = TestIdentity::doctor();
    let session_id = Uuid::new_v4();
    let (original_id, replacement_id) = (Uuid::new_v4(), Uuid::new_v4());
    let now = Utc.with_ymd_and_hms(2025, 1, 9, 8, 0, 0).unwrap();
    let original_at = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();
    let new_at = Utc.with_ymd_and_hms(2025, 1, 12, 10, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", original_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::appointment(
            original_id,
            doctor.id(),
            session_id,
            original_at,
            "confirmed",
            &[]
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor.id())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reschedule_appointment"))
        .and(body_partial_json(json!({ "p_appointment_id": original_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "original_appointment_id": original_id,
            "new_appointment_id": replacement_id
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let outcome = AppointmentService::new(&config, notifier.clone())
        .reschedule(
            &doctor.to_identity(),
            original_id,
            RescheduleAppointmentRequest {
                new_scheduled_at: new_at,
                reason: Some("Doctor unavailable".to_string()),
            },
            now,
        )
        .await
        .unwrap();

    assert_eq!(outcome.original_appointment_id, original_id);
    assert_eq!(outcome.new_appointment_id, replacement_id);
    assert_eq!(
        notifier.targets_titled("Appointment Rescheduled"),
        vec![NotificationTarget::Session(session_id)]
    );
    let sent = notifier.sent();
    assert!(sent[0].body.contains("2025-01-12 10:00 UTC"));
    assert!(sent[0].body.contains("Doctor unavailable"));
}

#[tokio::test]
async fn only_the_owning_doctor_may_reschedule() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::appointment(
            appointment_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() + Duration::days(1),
            "confirmed",
            &[]
        )])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reschedule_appointment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let result = AppointmentService::new(&config, notifier.clone())
        .reschedule(
            &TestIdentity::doctor().to_identity(),
            appointment_id,
            RescheduleAppointmentRequest {
                new_scheduled_at: Utc::now() + Duration::days(2),
                reason: None,
            },
            Utc::now(),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized));
    assert!(notifier.sent().is_empty());
}

// ==============================================================================
// CREATE
// ==============================================================================

#[tokio::test]
async fn patient_booking_is_created_as_booked() {
    let server = MockServer::start().await;
    let patient = TestIdentity::patient();
    let doctor_id = Uuid::new_v4();
    let scheduled_at = Utc::now() + Duration::days(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/patient_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::patient_session(
            patient.id(),
            Utc::now() + Duration::hours(10)
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::doctor(doctor_id, &["gp"])])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "booked", "doctor_id": doctor_id })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([MockSupabaseResponses::appointment(
            Uuid::new_v4(),
            doctor_id,
            patient.id(),
            scheduled_at,
            "booked",
            &[]
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let appointment = AppointmentService::new(&config, notifier.clone())
        .create(
            &patient.to_identity(),
            CreateAppointmentRequest {
                patient_session_id: None,
                doctor_id: Some(doctor_id),
                consultation_id: None,
                scheduled_at,
                grace_period_minutes: None,
                notes: None,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(appointment.doctor_id, doctor_id);
    assert_eq!(
        notifier.targets_titled("New Appointment Request"),
        vec![NotificationTarget::User(doctor_id)]
    );
}

#[tokio::test]
async fn booking_in_the_past_is_rejected() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();

    let result = AppointmentService::new(&config, Arc::new(RecordingNotifier::default()))
        .create(
            &TestIdentity::patient().to_identity(),
            CreateAppointmentRequest {
                patient_session_id: None,
                doctor_id: Some(Uuid::new_v4()),
                consultation_id: None,
                scheduled_at: Utc::now() - Duration::hours(1),
                grace_period_minutes: None,
                notes: None,
            },
            Utc::now(),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidTime(_)));
}

// ==============================================================================
// CRON GUARD
// ==============================================================================

#[tokio::test]
async fn sweeps_require_the_cron_secret() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let app = appointment_cron_routes(AppointmentCronState {
        cron: CronGuard::new(&config),
        config,
        notifier: Arc::new(RecordingNotifier::default()),
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/missed")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
