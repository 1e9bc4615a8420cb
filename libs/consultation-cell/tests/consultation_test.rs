use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use consultation_cell::models::CreateConsultationRequest;
use consultation_cell::{consultation_routes, ConsultationError, ConsultationService, ConsultationState};
use notification_cell::test_utils::RecordingNotifier;
use notification_cell::NotificationTarget;
use security_cell::{AdmissionGate, RateLimiter};
use shared_models::ServiceType;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestIdentity};

fn nurse_chat_request() -> CreateConsultationRequest {
    CreateConsultationRequest {
        service_type: "nurse".to_string(),
        consultation_type: "chat".to_string(),
        chief_complaint: "Persistent headache for three days".to_string(),
        doctor_id: None,
    }
}

async fn mount_access(server: &MockServer, session_id: Uuid, granted: bool) {
    let rows = if granted {
        json!([MockSupabaseResponses::service_access_grant(
            session_id,
            "nurse",
            Utc::now() + Duration::hours(20)
        )])
    } else {
        json!([])
    };

    Mock::given(method("GET"))
        .and(path("/rest/v1/service_access_payments"))
        .and(query_param("patient_session_id", format!("eq.{}", session_id)))
        .and(query_param("access_granted", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

async fn mount_open_consultation(server: &MockServer, session_id: Uuid, open: Option<Value>) {
    let rows = match open {
        Some(row) => json!([row]),
        None => json!([]),
    };
    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("patient_session_id", format!("eq.{}", session_id)))
        .and(query_param("status", "in.(pending,active,in_progress)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_without_paid_access_is_rejected() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    mount_access(&server, session_id, false).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = ConsultationService::new(&config, notifier.clone());

    let result = service.create(session_id, nurse_chat_request(), Utc::now()).await;
    assert_matches!(result, Err(ConsultationError::NoActiveAccess(ServiceType::Nurse)));
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn create_returns_existing_open_consultation() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let existing_id = Uuid::new_v4();
    mount_access(&server, session_id, true).await;
    mount_open_consultation(
        &server,
        session_id,
        Some(MockSupabaseResponses::consultation(existing_id, session_id, None, "nurse", "chat", "pending")),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = ConsultationService::new(&config, notifier.clone());

    let outcome = service
        .create(session_id, nurse_chat_request(), Utc::now())
        .await
        .unwrap();
    assert!(!outcome.created);
    assert_eq!(outcome.consultation.id, existing_id);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn create_after_payment_broadcasts_to_eligible_doctors() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let consultation_id = Uuid::new_v4();
    mount_access(&server, session_id, true).await;
    mount_open_consultation(&server, session_id, None).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([MockSupabaseResponses::consultation(
            consultation_id,
            session_id,
            None,
            "nurse",
            "chat",
            "pending"
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = ConsultationService::new(&config, notifier.clone());

    let outcome = service
        .create(session_id, nurse_chat_request(), Utc::now())
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.consultation.id, consultation_id);
    assert_eq!(
        notifier.targets_titled("New Consultation Request"),
        vec![NotificationTarget::Doctors(ServiceType::Nurse)]
    );
}

#[tokio::test]
async fn concurrent_insert_falls_back_to_the_winner() {
    let server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let winner_id = Uuid::new_v4();
    mount_access(&server, session_id, true).await;

    // First lookup sees nothing, the refetch after the unique violation sees the winner.
    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("patient_session_id", format!("eq.{}", session_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_open_consultation(
        &server,
        session_id,
        Some(MockSupabaseResponses::consultation(winner_id, session_id, None, "nurse", "chat", "pending")),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::error_response(
            "duplicate key value violates unique constraint",
            "23505",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = Arc::new(RecordingNotifier::default());
    let outcome = ConsultationService::new(&config, notifier.clone())
        .create(session_id, nurse_chat_request(), Utc::now())
        .await
        .unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.consultation.id, winner_id);
    assert!(notifier.sent().is_empty());
}

fn state_for(server: &MockServer, notifier: Arc<RecordingNotifier>) -> ConsultationState {
    let config = TestConfig::with_supabase_url(&server.uri()).to_arc();
    ConsultationState {
        gate: Arc::new(AdmissionGate::new(&config, RateLimiter::in_memory())),
        config,
        notifier,
    }
}

#[tokio::test]
async fn second_doctor_to_accept_gets_conflict() {
    let server = MockServer::start().await;
    let doctor = TestIdentity::doctor();
    let consultation_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("id", format!("eq.{}", consultation_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::consultation(
            consultation_id,
            Uuid::new_v4(),
            None,
            "nurse",
            "chat",
            "pending"
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::doctor(doctor.id(), &["nurse"])])),
        )
        .mount(&server)
        .await;
    // Another doctor already claimed it, so the conditional update matches nothing.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/consultations"))
        .and(query_param("doctor_id", "is.null"))
        .and(query_param("status", "in.(pending)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let response = consultation_routes(state_for(&server, notifier.clone()))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/accept", consultation_id))
                .header("authorization", JwtTestUtils::bearer(&doctor))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn accepted_consultation_notifies_the_patient() {
    let server = MockServer::start().await;
    let doctor = TestIdentity::doctor();
    let session_id = Uuid::new_v4();
    let consultation_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::consultation(
            consultation_id,
            session_id,
            None,
            "nurse",
            "chat",
            "pending"
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::doctor(doctor.id(), &["nurse"])])),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::consultation(
            consultation_id,
            session_id,
            Some(doctor.id()),
            "nurse",
            "chat",
            "active"
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let response = consultation_routes(state_for(&server, notifier.clone()))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/accept", consultation_id))
                .header("authorization", JwtTestUtils::bearer(&doctor))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["status"], "active");
    assert_eq!(
        notifier.targets_titled("Consultation Accepted"),
        vec![NotificationTarget::Session(session_id)]
    );
}

#[tokio::test]
async fn patients_cannot_accept_or_read_others_consultations() {
    let server = MockServer::start().await;
    let consultation_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/consultations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::consultation(
            consultation_id,
            Uuid::new_v4(),
            None,
            "nurse",
            "chat",
            "pending"
        )])))
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let app = consultation_routes(state_for(&server, notifier));
    let patient = TestIdentity::patient();

    let accept = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/accept", consultation_id))
                .header("authorization", JwtTestUtils::bearer(&patient))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(accept.status(), StatusCode::FORBIDDEN);

    let read = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/{}", consultation_id))
                .header("authorization", JwtTestUtils::bearer(&patient))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(read.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_requires_a_credential() {
    let server = MockServer::start().await;
    let response = consultation_routes(state_for(&server, Arc::new(RecordingNotifier::default())))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "service_type": "nurse",
                        "consultation_type": "chat",
                        "chief_complaint": "Persistent headache for three days"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
