use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_cell::models::DeviceBindingError;
use auth_cell::{auth_routes, AuthState, DeviceBindingService};
use security_cell::{AdmissionGate, RateLimiter};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestIdentity};

fn binding_row(doctor_id: Uuid, fingerprint: &str) -> Value {
    json!({
        "doctor_id": doctor_id,
        "device_fingerprint": fingerprint,
        "bound_at": "2025-01-01T00:00:00Z",
        "is_active": true
    })
}

fn create_test_app(server: &MockServer) -> Router {
    let config = TestConfig::with_supabase_url(&server.uri()).to_arc();
    auth_routes(AuthState {
        gate: Arc::new(AdmissionGate::new(&config, RateLimiter::in_memory())),
        config,
    })
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn whoami_returns_resolved_identity() {
    let server = MockServer::start().await;
    let doctor = TestIdentity::doctor();

    let response = create_test_app(&server)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/me")
                .header("authorization", JwtTestUtils::bearer(&doctor))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["data"]["role"], "doctor");
    assert_eq!(json["data"]["user_id"], doctor.id().to_string());
}

#[tokio::test]
async fn binding_second_fingerprint_conflicts() {
    let server = MockServer::start().await;
    let doctor = TestIdentity::doctor();
    let doctor_id = doctor.id();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_devices"))
        .and(query_param("device_fingerprint", "eq.phone-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_devices"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([binding_row(doctor_id, "phone-a")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_devices"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let service = DeviceBindingService::new(&config);

    let result = service.bind(&doctor.to_identity(), doctor_id, "phone-b").await;
    assert_matches!(result, Err(DeviceBindingError::DoctorAlreadyBound));
}

#[tokio::test]
async fn fingerprint_of_another_doctor_conflicts_over_http() {
    let server = MockServer::start().await;
    let doctor = TestIdentity::doctor();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_devices"))
        .and(query_param("device_fingerprint", "eq.shared-phone"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([binding_row(Uuid::new_v4(), "shared-phone")])),
        )
        .mount(&server)
        .await;

    let response = create_test_app(&server)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/devices/bind")
                .header("authorization", JwtTestUtils::bearer(&doctor))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "doctor_id": doctor.id(), "device_fingerprint": "shared-phone" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn unique_violation_during_insert_is_conflict() {
    let server = MockServer::start().await;
    let doctor = TestIdentity::doctor();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_devices"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "details": "Key (device_fingerprint)=(phone-a) already exists.",
            "message": "duplicate key value violates unique constraint \"doctor_devices_device_fingerprint_key\""
        })))
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let service = DeviceBindingService::new(&config);

    let result = service.bind(&doctor.to_identity(), doctor.id(), "phone-a").await;
    assert_matches!(result, Err(DeviceBindingError::FingerprintTaken));
}

#[tokio::test]
async fn concurrent_bind_of_another_device_is_doctor_already_bound() {
    let server = MockServer::start().await;
    let doctor = TestIdentity::doctor();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_devices"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "details": format!("Key (doctor_id)=({}) already exists.", doctor.id()),
            "message": "duplicate key value violates unique constraint \"doctor_devices_pkey\""
        })))
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let service = DeviceBindingService::new(&config);

    let result = service.bind(&doctor.to_identity(), doctor.id(), "phone-b").await;
    assert_matches!(result, Err(DeviceBindingError::DoctorAlreadyBound));
}

#[tokio::test]
async fn doctors_cannot_bind_for_someone_else() {
    let server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let service = DeviceBindingService::new(&config);

    let result = service
        .bind(&TestIdentity::doctor().to_identity(), Uuid::new_v4(), "phone-a")
        .await;
    assert_matches!(result, Err(DeviceBindingError::NotOwner));
}

#[tokio::test]
async fn check_reports_bound_and_match() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_devices"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([binding_row(doctor_id, "phone-a")])))
        .mount(&server)
        .await;

    let response = create_test_app(&server)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/devices/check")
                .header("content-type", "application/json")
                .header("x-forwarded-for", "10.1.2.3")
                .body(Body::from(
                    json!({ "doctor_id": doctor_id, "device_fingerprint": "phone-b" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["data"], json!({ "bound": true, "matches": false }));
}

#[tokio::test]
async fn check_without_binding_is_unbound() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let check = DeviceBindingService::new(&config)
        .check(Uuid::new_v4(), "phone-a")
        .await
        .unwrap();
    assert!(!check.bound);
    assert!(!check.matches);
}

#[tokio::test]
async fn deauthorize_requires_admin() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/doctor_devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([binding_row(doctor_id, "phone-a")])))
        .expect(1)
        .mount(&server)
        .await;

    let app = create_test_app(&server);
    let request = |identity: &TestIdentity| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/devices/{}", doctor_id))
            .header("authorization", JwtTestUtils::bearer(identity))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(request(&TestIdentity::doctor())).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.oneshot(request(&TestIdentity::admin())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["data"]["removed"], 1);
}
