use std::sync::Arc;

use portal_core::backend::{Backend, Query, RestBackend};
use portal_core::config::PortalSettings;
use portal_core::datetime::DatePolicy;
use portal_core::error::PortalError;
use portal_core::facade::DataAccess;
use portal_core::filter::MachineFilter;
use portal_core::host::MemoryHost;
use portal_core::prefs::Preferences;
use portal_core::session::SessionManager;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANON: &str = "anon-key";

fn user_body() -> serde_json::Value {
    json!({
        "id": "u1",
        "email": "teknik@glohe.test",
        "user_metadata": {"full_name": "Teknik Ekip"}
    })
}

async fn backend_with_token(server: &MockServer, token: Option<&str>) -> RestBackend {
    let settings = PortalSettings {
        backend_url: Some(server.uri()),
        anon_key: Some(ANON.to_string()),
        token: token.map(str::to_string),
        ..PortalSettings::default()
    };
    RestBackend::from_settings(&settings).expect("configured backend")
}

#[tokio::test]
async fn stored_token_recovers_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("apikey", ANON))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_with_token(&server, Some("tok-1")).await;
    let session = backend
        .get_session()
        .await
        .expect("session lookup")
        .expect("session present");
    assert_eq!(session.access_token, "tok-1");
    assert_eq!(session.user.id, "u1");
}

#[tokio::test]
async fn rejected_token_means_no_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"msg": "invalid JWT"})))
        .mount(&server)
        .await;

    let backend = backend_with_token(&server, Some("stale")).await;
    assert!(backend.get_session().await.expect("lookup").is_none());
    let none = backend_with_token(&server, None).await;
    assert!(none.get_session().await.expect("lookup").is_none());
}

#[tokio::test]
async fn select_translates_filters_and_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/machines"))
        .and(query_param("status", "eq.active"))
        .and(query_param("order", "machine_no.asc"))
        .and(query_param("select", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m1", "machine_no": "ÜK-01", "machine_name": "Pres"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_with_token(&server, None).await;
    let rows = backend
        .select(
            &Query::table("machines")
                .eq("status", "active")
                .order("machine_no", true),
        )
        .await
        .expect("select");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["machine_no"], "ÜK-01");
}

#[tokio::test]
async fn count_reads_the_content_range_total() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/maintenance_records"))
        .and(header("prefer", "count=exact"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-0/42"))
        .mount(&server)
        .await;

    let backend = backend_with_token(&server, None).await;
    let total = backend
        .count(&Query::table("maintenance_records").eq("status", "overdue"))
        .await
        .expect("count");
    assert_eq!(total, 42);
}

#[tokio::test]
async fn error_statuses_map_to_portal_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "permission denied"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let backend = backend_with_token(&server, None).await;
    let denied = backend
        .select(&Query::table("forbidden"))
        .await
        .expect_err("403");
    assert_eq!(
        denied,
        PortalError::Authorization {
            status: 403,
            message: "permission denied".to_string()
        }
    );
    let broken = backend
        .select(&Query::table("broken"))
        .await
        .expect_err("500");
    assert_eq!(broken.status(), Some(500));
    assert!(broken.to_string().contains("upstream down"));
}

#[tokio::test]
async fn calendar_rpc_posts_the_year() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/generate_maintenance_calendar"))
        .and(body_json(json!({"p_year": 2026})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_with_token(&server, None).await;
    let value = backend
        .rpc("generate_maintenance_calendar", json!({"p_year": 2026}))
        .await
        .expect("rpc");
    assert!(value.is_null());
}

#[tokio::test]
async fn facade_reads_machines_through_a_recovered_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/machines"))
        .and(header("authorization", "Bearer tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m1", "machine_no": "ÜK-01", "machine_name": "Pres", "category": "ÜK", "status": "active"},
            {"id": "m2", "machine_no": "TD-02", "machine_name": "Kompresör", "category": "TD", "status": "active"}
        ])))
        .mount(&server)
        .await;

    let backend = Arc::new(backend_with_token(&server, Some("tok-2")).await);
    let settings = PortalSettings::default();
    let session = SessionManager::new(
        backend.clone(),
        Arc::new(Preferences::in_memory()),
        Arc::new(MemoryHost::new()),
        settings.session,
    );
    session.init().await;
    assert!(session.is_authenticated());
    assert_eq!(session.display_name(), "Teknik Ekip");

    let data = DataAccess::new(backend, session, &settings, DatePolicy::default());
    let machines = data
        .get_machines(&MachineFilter::default(), &CancellationToken::new())
        .await
        .expect("machines");
    assert_eq!(machines.len(), 2);
    assert_eq!(machines[1].display(), "TD-02 - Kompresör");
}
