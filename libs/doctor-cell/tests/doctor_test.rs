use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::{doctor_cron_routes, DoctorError, DoctorService, DoctorState};
use notification_cell::test_utils::RecordingNotifier;
use notification_cell::NotificationTarget;
use security_cell::{CronGuard, CRON_SECRET_HEADER};
use shared_models::ServiceType;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TEST_CRON_SECRET};

#[tokio::test]
async fn verify_can_serve_checks_tier() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([MockSupabaseResponses::doctor(doctor_id, &["gp"])])),
        )
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let service = DoctorService::new(&config);

    assert!(service.verify_can_serve(doctor_id, ServiceType::Gp).await.is_ok());
    assert_matches!(
        service.verify_can_serve(doctor_id, ServiceType::Specialist).await,
        Err(DoctorError::DoesNotServe(ServiceType::Specialist))
    );
}

#[tokio::test]
async fn unverified_doctor_cannot_serve() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let mut doctor = MockSupabaseResponses::doctor(doctor_id, &["nurse"]);
    doctor["is_verified"] = json!(false);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor])))
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let result = DoctorService::new(&config)
        .verify_can_serve(doctor_id, ServiceType::Nurse)
        .await;
    assert_matches!(result, Err(DoctorError::NotVerified));
}

#[tokio::test]
async fn lifting_suspensions_notifies_each_doctor() {
    let server = MockServer::start().await;
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("is_suspended", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor(first, &["gp"]),
            MockSupabaseResponses::doctor(second, &["nurse"])
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let notifier = RecordingNotifier::default();

    let lifted = DoctorService::new(&config)
        .lift_expired_suspensions(Utc::now() + Duration::minutes(1), &notifier)
        .await
        .unwrap();

    assert_eq!(lifted.len(), 2);
    assert_eq!(
        notifier.targets_titled("Account Reinstated"),
        vec![NotificationTarget::User(first), NotificationTarget::User(second)]
    );
}

#[tokio::test]
async fn suspension_cron_requires_secret() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_arc();
    let app = doctor_cron_routes(DoctorState {
        cron: CronGuard::new(&config),
        config,
        notifier: Arc::new(RecordingNotifier::default()),
    });

    let response = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/suspensions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/suspensions")
                .header(CRON_SECRET_HEADER, TEST_CRON_SECRET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
