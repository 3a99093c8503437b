//! # Integration Tests for dplus-api
//!
//! Drives the assembled router over an in-memory directory: institution
//! access outcomes and their HTTP mapping, swallowed audit failures, the
//! authority fallback, dossiers, directive and code management, documents,
//! the auth relay without a platform, authentication, and metrics.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use zeroize::Zeroizing;

use dplus_api::directory::{Directory, MemoryDirectory};
use dplus_api::middleware::rate_limit::{RateLimitConfig, WindowPolicy};
use dplus_api::state::{AppConfig, AppState};
use dplus_core::{
    Directive, DirectiveId, DocumentId, DocumentKind, MedicalDocument, Profile, UserId,
};

const SECRET: &str = "test-secret";

struct Seeded {
    directory: MemoryDirectory,
    farid: UserId,
    directive_id: DirectiveId,
    recent_doc: DocumentId,
}

/// Helper: directory with FARID AREZKI, code 9E5CUV7X, two documents, and an
/// expired code EXP1RED0 belonging to another patient.
fn seeded() -> Seeded {
    let directory = MemoryDirectory::new();
    let farid = UserId::new();
    directory.insert_profile(Profile {
        id: farid,
        first_name: Some("FARID".into()),
        last_name: Some("AREZKI".into()),
        birth_date: Some("1963-08-13".into()),
        email: Some("farid@example.fr".into()),
        phone: None,
        address: None,
    });
    let directive_id = DirectiveId::new();
    directory.insert_directive(Directive {
        id: directive_id,
        user_id: farid,
        content: json!({"reanimation": "non"}),
        institution_code: Some("9E5CUV7X".into()),
        institution_code_expires_at: Some(Utc::now() + Duration::days(30)),
        created_at: Utc::now() - Duration::days(3),
        updated_at: None,
    });

    let recent_doc = DocumentId::new();
    directory.insert_document(MedicalDocument {
        id: DocumentId::new(),
        user_id: farid,
        file_name: "bilan-2024.pdf".into(),
        file_path: "medical/bilan-2024.pdf".into(),
        content_type: Some("application/pdf".into()),
        kind: DocumentKind::Medical,
        created_at: Utc::now() - Duration::days(200),
    });
    directory.insert_document(MedicalDocument {
        id: recent_doc,
        user_id: farid,
        file_name: "directives.pdf".into(),
        file_path: "pdf/directives.pdf".into(),
        content_type: Some("application/pdf".into()),
        kind: DocumentKind::Directive,
        created_at: Utc::now() - Duration::days(1),
    });

    let other = UserId::new();
    directory.insert_profile(Profile {
        id: other,
        first_name: Some("Claire".into()),
        last_name: Some("Dubois".into()),
        birth_date: Some("1950-02-01".into()),
        email: None,
        phone: None,
        address: None,
    });
    directory.insert_directive(Directive {
        id: DirectiveId::new(),
        user_id: other,
        content: json!({}),
        institution_code: Some("EXP1RED0".into()),
        institution_code_expires_at: Some(Utc::now() - Duration::hours(2)),
        created_at: Utc::now() - Duration::days(40),
        updated_at: None,
    });

    Seeded {
        directory,
        farid,
        directive_id,
        recent_doc,
    }
}

/// Helper: build the app over `directory` with auth disabled.
fn test_app(directory: &MemoryDirectory) -> axum::Router {
    test_app_with_config(directory, AppConfig::default())
}

/// Helper: build the app with auth enabled.
fn test_app_with_auth(directory: &MemoryDirectory) -> axum::Router {
    let config = AppConfig {
        auth_token: Some(SECRET.into()),
        ..AppConfig::default()
    };
    test_app_with_config(directory, config)
}

fn test_app_with_config(directory: &MemoryDirectory, config: AppConfig) -> axum::Router {
    let state = AppState::with_directory(config, Arc::new(directory.clone())).unwrap();
    dplus_api::app(state)
}

/// Helper: read response body as string.
async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {token}").parse().unwrap(),
    );
    request
}

fn submission(code: &str, last_name: &str) -> Value {
    json!({
        "code": code,
        "firstName": "Farid",
        "lastName": last_name,
        "birthDate": "1963-08-13",
        "accessor_name": "Dr Martin",
        "accessor_institution": "CHU de Lyon"
    })
}

const VALIDATE: &str = "/v1/institution-access/validate";

// -- Health Checks ------------------------------------------------------------

#[tokio::test]
async fn test_liveness_and_readiness() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health/liveness").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");

    let response = app
        .oneshot(Request::builder().uri("/health/readiness").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ready");
}

// -- Institution Access -------------------------------------------------------

#[tokio::test]
async fn test_matching_submission_is_granted() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let response = app
        .oneshot(post_json(VALIDATE, submission("9e5cuv7x", "Arezki")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["outcome"], "granted");
    assert_eq!(body["validation_path"], "authority");
    assert_eq!(body["audit_recorded"], true);

    let dossier = &body["dossiers"][0];
    assert_eq!(dossier["patient"]["first_name"], "FARID");
    assert_eq!(dossier["code"], "9E5C****");
    assert_eq!(dossier["directives"][0]["content"]["reanimation"], "non");
    assert_eq!(dossier["documents"][0]["file_name"], "directives.pdf");
    assert_eq!(dossier["documents"][1]["file_name"], "bilan-2024.pdf");

    let logs = seeded.directory.access_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_id, Some(seeded.farid));
    assert_eq!(logs[0].accessor_institution.as_deref(), Some("CHU de Lyon"));
}

#[tokio::test]
async fn test_typo_in_last_name_is_mismatch_with_hints() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let response = app
        .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezk")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "PROFILE_MISMATCH");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Aucune correspondance exacte"));
    assert_eq!(body["error"]["details"]["hints"].as_array().unwrap().len(), 4);
    assert_eq!(body["error"]["details"]["outcome"], "profile_mismatch");
}

#[tokio::test]
async fn test_expired_code_is_gone() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let mut req = submission("EXP1RED0", "Dubois");
    req["firstName"] = json!("Claire");
    req["birthDate"] = json!("1950-02-01");
    let response = app.oneshot(post_json(VALIDATE, req)).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "EXPIRED_CODE");
}

#[tokio::test]
async fn test_unknown_and_malformed_codes_are_invalid() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    for code in ["ZZZZ9999", "9E5C-UV7"] {
        let response = app
            .clone()
            .oneshot(post_json(VALIDATE, submission(code, "Arezki")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "code {code}");
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_CODE");
    }
    assert_eq!(seeded.directory.access_logs().len(), 2);
}

#[tokio::test]
async fn test_missing_fields_are_rejected_before_validation() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let response = app
        .oneshot(post_json(VALIDATE, json!({"code": "9E5CUV7X", "firstName": "Farid"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(seeded.directory.access_logs().is_empty());
}

#[tokio::test]
async fn test_repeated_attempts_are_rate_limited() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezk")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let response = app
        .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezki")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert!(body["error"]["message"].as_str().unwrap().contains("Trop de tentatives"));
}

#[tokio::test]
async fn test_audit_failure_does_not_block_access() {
    let seeded = seeded();
    seeded.directory.set_audit_failing(true);
    let app = test_app(&seeded.directory);

    let response = app
        .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezki")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "granted");
    assert_eq!(body["audit_recorded"], false);
}

#[tokio::test]
async fn test_failing_authority_falls_back() {
    let seeded = seeded();
    seeded.directory.set_authority_failing(true);
    let app = test_app(&seeded.directory);

    let response = app
        .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezki")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["validation_path"], "fallback");
}

#[tokio::test]
async fn test_storage_outage_is_generic_technical_error() {
    let seeded = seeded();
    seeded.directory.set_storage_failing(true);
    let app = test_app(&seeded.directory);

    let response = app
        .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezki")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(response).await;
    assert!(body.contains("TECHNICAL_ERROR"));
    assert!(!body.contains("storage"));
}

// -- Dossiers -----------------------------------------------------------------

#[tokio::test]
async fn test_dossier_is_retrievable_by_id() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let response = app
        .clone()
        .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezki")))
        .await
        .unwrap();
    let body = body_json(response).await;
    let id = body["dossiers"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/dossiers/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id.as_str());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/dossiers/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let seeded = seeded();
    let app = test_app_with_auth(&seeded.directory);

    let response = app
        .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezki")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(seeded.directory.access_logs().is_empty());
}

#[tokio::test]
async fn test_institution_may_validate_but_not_manage() {
    let seeded = seeded();
    let app = test_app_with_auth(&seeded.directory);
    let token = format!("institution::{SECRET}");

    let response = app
        .clone()
        .oneshot(with_bearer(
            post_json(VALIDATE, submission("9E5CUV7X", "Arezki")),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(with_bearer(
            Request::builder()
                .uri(format!("/v1/directives?user_id={}", seeded.farid))
                .body(Body::empty())
                .unwrap(),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// -- Directives & Institution Codes -------------------------------------------

#[tokio::test]
async fn test_patient_regenerates_code_and_old_code_stops_working() {
    let seeded = seeded();
    let app = test_app_with_auth(&seeded.directory);
    let patient = format!("patient:{}:{SECRET}", seeded.farid);

    let response = app
        .clone()
        .oneshot(with_bearer(
            post_json(
                &format!("/v1/directives/{}/institution-code", seeded.directive_id),
                json!({}),
            ),
            &patient,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let card = body_json(response).await;
    assert_eq!(card["patient_name"], "FARID AREZKI");
    assert_eq!(card["birth_date"], "1963-08-13");
    let code = card["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);
    assert_ne!(code, "9E5CUV7X");

    let institution = format!("institution::{SECRET}");
    let response = app
        .clone()
        .oneshot(with_bearer(
            post_json(VALIDATE, submission(&code, "Arezki")),
            &institution,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(with_bearer(
            post_json(VALIDATE, submission("9E5CUV7X", "Arezki")),
            &institution,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_patient_cannot_regenerate_code() {
    let seeded = seeded();
    let app = test_app_with_auth(&seeded.directory);
    let intruder = format!("patient:{}:{SECRET}", UserId::new());

    let response = app
        .oneshot(with_bearer(
            post_json(
                &format!("/v1/directives/{}/institution-code", seeded.directive_id),
                json!({}),
            ),
            &intruder,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_directives_are_encrypted_at_rest_when_key_is_set() {
    let seeded = seeded();
    let config = AppConfig {
        auth_token: Some(SECRET.into()),
        dossier_key_hex: Some(Zeroizing::new("2a".repeat(32))),
        ..AppConfig::default()
    };
    let app = test_app_with_config(&seeded.directory, config);
    let patient = format!("patient:{}:{SECRET}", seeded.farid);

    let response = app
        .clone()
        .oneshot(with_bearer(
            post_json("/v1/directives", json!({"content": {"sonde": "non"}})),
            &patient,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["sealed"], false);
    assert_eq!(created["content"]["sonde"], "non");

    let response = app
        .oneshot(with_bearer(
            Request::builder()
                .uri("/v1/directives")
                .body(Body::empty())
                .unwrap(),
            &patient,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);

    let id: DirectiveId = created["id"].as_str().unwrap().parse().unwrap();
    let stored = seeded.directory.directive(id).await.unwrap().unwrap();
    assert_eq!(stored.content["alg"], "A256GCM");
    assert!(stored.content.get("sonde").is_none());
}

#[tokio::test]
async fn test_operator_must_name_user_when_listing() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/v1/directives").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/directives?user_id={}", seeded.farid))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

// -- Documents ----------------------------------------------------------------

#[tokio::test]
async fn test_documents_listing_and_deletion() {
    let seeded = seeded();
    let app = test_app_with_auth(&seeded.directory);
    let owner = format!("patient:{}:{SECRET}", seeded.farid);
    let intruder = format!("patient:{}:{SECRET}", UserId::new());

    let response = app
        .clone()
        .oneshot(with_bearer(
            Request::builder()
                .uri(format!("/v1/users/{}/documents", seeded.farid))
                .body(Body::empty())
                .unwrap(),
            &owner,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let docs = body_json(response).await;
    assert_eq!(docs[0]["file_name"], "directives.pdf");

    let delete = |token: &str, kind: &str| {
        with_bearer(
            Request::builder()
                .method("DELETE")
                .uri(format!("/v1/documents/{kind}/{}", seeded.recent_doc))
                .body(Body::empty())
                .unwrap(),
            token,
        )
    };

    let response = app.clone().oneshot(delete(&intruder, "directive")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.clone().oneshot(delete(&owner, "scan")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app.clone().oneshot(delete(&owner, "medical")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(delete(&owner, "directive")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(delete(&owner, "directive")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Auth Relay -----------------------------------------------------------------

#[tokio::test]
async fn test_auth_relay_returns_503_without_platform() {
    let seeded = seeded();
    let app = test_app_with_auth(&seeded.directory);

    for (uri, body) in [
        ("/v1/auth/otp", json!({"email": "farid@example.fr"})),
        ("/v1/auth/otp/verify", json!({"email": "farid@example.fr", "token": "123456"})),
        ("/v1/auth/refresh", json!({"refresh_token": "rt"})),
        ("/v1/auth/password", json!({"email": "farid@example.fr", "password": "pw"})),
    ] {
        // No bearer token: the relay is reachable before sign-in.
        let response = app.clone().oneshot(post_json(uri, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
    }
}

#[tokio::test]
async fn test_auth_relay_validates_email() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let response = app
        .oneshot(post_json("/v1/auth/otp", json!({"email": "not-an-email"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// -- Metrics & OpenAPI ----------------------------------------------------------

#[tokio::test]
async fn test_metrics_count_access_attempts() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    app.clone()
        .oneshot(post_json(VALIDATE, submission("9E5CUV7X", "Arezki")))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("dplus_access_attempts_total"));
    assert!(body.contains("outcome=\"granted\""));
    assert!(body.contains("dplus_dossiers_active 1"));
}

#[tokio::test]
async fn test_metrics_scrape_reclaims_idle_rate_limit_keys() {
    let seeded = seeded();
    let one_second = WindowPolicy::new(1000, 1);
    let config = AppConfig {
        rate_limits: RateLimitConfig {
            institution_code: one_second,
            otp_email: one_second,
            request: one_second,
        },
        ..AppConfig::default()
    };
    let app = test_app_with_config(&seeded.directory, config);

    for i in 0..3 {
        let mut request = post_json(VALIDATE, submission(&format!("ZZZZZZZ{i}"), "Arezki"));
        request
            .headers_mut()
            .insert("x-forwarded-for", format!("10.0.0.{i}").parse().unwrap());
        app.clone().oneshot(request).await.unwrap();
    }

    let scrape = || Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let body = body_string(app.clone().oneshot(scrape()).await.unwrap()).await;
    assert!(body.contains("dplus_rate_limit_keys"));
    assert!(!body.contains("dplus_rate_limit_keys 0"));

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let body = body_string(app.oneshot(scrape()).await.unwrap()).await;
    assert!(body.contains("dplus_rate_limit_keys 0"));
}

#[tokio::test]
async fn test_metrics_endpoint_can_be_disabled() {
    let seeded = seeded();
    let config = AppConfig {
        metrics_enabled: false,
        ..AppConfig::default()
    };
    let app = test_app_with_config(&seeded.directory, config);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_json_served() {
    let seeded = seeded();
    let app = test_app(&seeded.directory);

    let response = app
        .oneshot(Request::builder().uri("/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["info"]["title"], "DirectivesPlus API");
}
