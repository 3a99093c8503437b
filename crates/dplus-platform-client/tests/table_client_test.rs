//! Contract tests for the table sub-clients.
//!
//! ## Endpoints Tested
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | GET    | `/rest/v1/profiles` | `get_profile_*` |
//! | GET    | `/rest/v1/directives` | `find_by_code_*`, `list_directives_*` |
//! | POST   | `/rest/v1/directives` | `create_directive_*` |
//! | PATCH  | `/rest/v1/directives` | `set_institution_code_*` |
//! | GET    | `/rest/v1/{pdf,medical}_documents` | `list_documents_*` |
//! | DELETE | `/rest/v1/medical_documents` | `delete_document_*` |
//! | POST   | `/rest/v1/institution_access_logs` | `insert_access_log_*` |

use chrono::{TimeZone, Utc};
use dplus_core::{
    AccessLogEntry, AccessLogId, AccessOutcome, DirectiveId, DocumentId, DocumentKind,
    InstitutionCode, NewDirective, UserId,
};
use dplus_platform_client::{PlatformClient, PlatformConfig, PlatformError};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "550e8400-e29b-41d4-a716-446655440000";
const DIRECTIVE: &str = "6f1c2a9e-3b7d-4c1e-9a55-0d2f6b8e4c11";

fn test_client(mock_server: &MockServer) -> PlatformClient {
    let config = PlatformConfig::local_mock(&mock_server.uri(), "anon-key").unwrap();
    PlatformClient::new(config).unwrap()
}

fn directive_row(code: &str, expires_at: &str) -> serde_json::Value {
    serde_json::json!({
        "id": DIRECTIVE,
        "user_id": USER,
        "content": {"resuscitation": "no"},
        "institution_code": code,
        "institution_code_expires_at": expires_at,
        "created_at": "2026-01-15T12:00:00Z",
        "updated_at": null
    })
}

// ── profiles ─────────────────────────────────────────────────────────

#[tokio::test]
async fn get_profile_filters_by_id_and_sends_keys() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{USER}")))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "id": USER,
            "first_name": "FARID",
            "last_name": "AREZKI",
            "birth_date": "1963-08-13"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let profile = client
        .profiles()
        .get(USER.parse().unwrap())
        .await
        .unwrap()
        .expect("profile present");
    assert_eq!(profile.last_name.as_deref(), Some("AREZKI"));
    assert_eq!(profile.birth_date.as_deref(), Some("1963-08-13"));
}

#[tokio::test]
async fn get_profile_returns_none_on_empty_rows() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    assert!(client.profiles().get(UserId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn get_profile_handles_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    match client.profiles().get(UserId::new()).await.unwrap_err() {
        PlatformError::Api { status, body, .. } => {
            assert_eq!(status, 401);
            assert_eq!(body, "invalid key");
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn service_key_replaces_anon_key_for_tables() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(header("apikey", "service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = PlatformConfig::local_mock(&mock_server.uri(), "anon-key").unwrap();
    config.service_key = Some(zeroize::Zeroizing::new("service-key".into()));
    let client = PlatformClient::new(config).unwrap();
    client.profiles().get(UserId::new()).await.unwrap();
}

// ── directives ───────────────────────────────────────────────────────

#[tokio::test]
async fn find_by_code_requires_non_null_expiry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/directives"))
        .and(query_param("institution_code", "eq.9E5CUV7X"))
        .and(query_param("institution_code_expires_at", "not.is.null"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([directive_row("9E5CUV7X", "2026-02-14T12:00:00Z")])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let code = InstitutionCode::parse("9e5cuv7x").unwrap();
    let rows = client.directives().find_by_institution_code(&code).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].institution_code.as_deref(), Some("9E5CUV7X"));
    assert_eq!(
        rows[0].institution_code_expires_at,
        Some(Utc.with_ymd_and_hms(2026, 2, 14, 12, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn list_directives_orders_newest_first() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/directives"))
        .and(query_param("user_id", format!("eq.{USER}")))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let rows = client.directives().list_for_user(USER.parse().unwrap()).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn create_directive_asks_for_representation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/directives"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(serde_json::json!({"user_id": USER})))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!([directive_row("9E5CUV7X", "2026-02-14T12:00:00Z")])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let created = client
        .directives()
        .create(&NewDirective {
            user_id: USER.parse().unwrap(),
            content: serde_json::json!({"resuscitation": "no"}),
        })
        .await
        .unwrap();
    assert_eq!(created.id, DIRECTIVE.parse::<DirectiveId>().unwrap());
}

#[tokio::test]
async fn create_directive_reports_empty_representation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/directives"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let err = client
        .directives()
        .create(&NewDirective {
            user_id: UserId::new(),
            content: serde_json::json!({}),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::EmptyResult { .. }));
}

#[tokio::test]
async fn set_institution_code_patches_row() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/directives"))
        .and(query_param("id", format!("eq.{DIRECTIVE}")))
        .and(body_partial_json(serde_json::json!({"institution_code": "ABCD1234"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([directive_row("ABCD1234", "2026-03-01T00:00:00Z")])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let code = InstitutionCode::parse("ABCD1234").unwrap();
    let expires = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let updated = client
        .directives()
        .set_institution_code(DIRECTIVE.parse().unwrap(), &code, expires)
        .await
        .unwrap()
        .expect("row updated");
    assert_eq!(updated.institution_code.as_deref(), Some("ABCD1234"));
}

// ── documents ────────────────────────────────────────────────────────

#[tokio::test]
async fn list_documents_merges_tables_newest_first() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/pdf_documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "id": "00000000-0000-0000-0000-000000000001",
            "user_id": USER,
            "file_name": "directives.pdf",
            "file_path": "data:application/pdf;base64,AAAA",
            "content_type": "application/pdf",
            "created_at": "2026-01-10T09:00:00Z"
        }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/medical_documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "00000000-0000-0000-0000-000000000002",
                "user_id": USER,
                "file_name": "ordonnance.pdf",
                "file_path": "https://storage.example/ordonnance.pdf",
                "created_at": "2026-01-12T09:00:00Z"
            },
            {
                "id": "00000000-0000-0000-0000-000000000003",
                "user_id": USER,
                "file_name": "radio.png",
                "file_path": "https://storage.example/radio.png",
                "created_at": "2026-01-05T09:00:00Z"
            }
        ])))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let docs = client.documents().list_for_user(USER.parse().unwrap()).await.unwrap();
    let names: Vec<&str> = docs.iter().map(|d| d.file_name.as_str()).collect();
    assert_eq!(names, ["ordonnance.pdf", "directives.pdf", "radio.png"]);
    assert_eq!(docs[1].kind, DocumentKind::Directive);
    assert_eq!(docs[0].kind, DocumentKind::Medical);
}

#[tokio::test]
async fn delete_document_reports_whether_row_existed() {
    let mock_server = MockServer::start().await;
    let id = "00000000-0000-0000-0000-000000000002";

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/medical_documents"))
        .and(query_param("id", format!("eq.{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": id}])))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let removed = client
        .documents()
        .delete(DocumentKind::Medical, id.parse::<DocumentId>().unwrap())
        .await
        .unwrap();
    assert!(removed);
}

// ── access logs ──────────────────────────────────────────────────────

#[tokio::test]
async fn insert_access_log_posts_row() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/institution_access_logs"))
        .and(header("prefer", "return=minimal"))
        .and(body_partial_json(serde_json::json!({
            "code_used": "9E5C****",
            "outcome": "granted"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let entry = AccessLogEntry {
        id: AccessLogId::new(),
        user_id: Some(USER.parse().unwrap()),
        code_used: "9E5C****".into(),
        accessor_name: Some("Dr Martin".into()),
        accessor_institution: Some("CHU Lyon".into()),
        outcome: AccessOutcome::Granted,
        ip_address: None,
        user_agent: None,
        accessed_at: Utc::now(),
        details: serde_json::json!({}),
    };
    client.access_logs().insert(&entry).await.unwrap();
}
