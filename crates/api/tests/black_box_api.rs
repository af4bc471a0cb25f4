use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use tenantnotes_api::{AuditRuntime, InMemoryBackends, build_router};
use tenantnotes_auth::{PolicyTable, TOKEN_ISSUER};
use tenantnotes_core::OrganizationId;
use tenantnotes_events::AuditAction;
use tenantnotes_infra::AuditSettings;

const JWT_SECRET: &str = "test-secret";

const POLICY: &str = "
p, blocked_user, *, /api/notes, POST, deny
p, *, *, /api/whoami, GET
p, *, *, /api/notes, GET|POST
p, *, *, /api/notes/:id, GET
";

struct TestServer {
    base_url: String,
    backends: InMemoryBackends,
    handle: tokio::task::JoinHandle<()>,
    // Held so the audit consumer keeps running for the server's lifetime.
    _audit: AuditRuntime,
}

impl TestServer {
    async fn spawn(policy: &str) -> Self {
        let table = PolicyTable::parse(policy).expect("test policy parses");
        let settings = AuditSettings {
            publish_timeout: Duration::from_millis(500),
            ..AuditSettings::default()
        };
        let (services, audit, backends) =
            tenantnotes_api::app::services::build_in_memory_services(JWT_SECRET, table, &settings);

        // Same router as prod, bound to an ephemeral port.
        let app = build_router(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            backends,
            handle,
            _audit: audit,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(secret: &str, user_id: &str, org_id: &str, issued: chrono::DateTime<Utc>) -> String {
    let claims = json!({
        "user_id": user_id,
        "org_id": org_id,
        "role": "member",
        "iat": issued.timestamp(),
        "exp": (issued + ChronoDuration::hours(24)).timestamp(),
        "iss": TOKEN_ISSUER,
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn login(client: &reqwest::Client, srv: &TestServer, user_id: &str, org_id: &str) -> String {
    let res = client
        .post(srv.url("/login"))
        .json(&json!({ "user_id": user_id, "org_id": org_id, "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("Bearer"));
    body["token"].as_str().unwrap().to_string()
}

async fn create_note(client: &reqwest::Client, srv: &TestServer, token: &str, title: &str) -> reqwest::Response {
    client
        .post(srv.url("/api/notes"))
        .bearer_auth(token)
        .json(&json!({ "title": title, "content": "body" }))
        .send()
        .await
        .unwrap()
}

async fn error_code(res: reqwest::Response) -> String {
    let body: serde_json::Value = res.json().await.unwrap();
    body["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn(POLICY).await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_requires_all_fields() {
    let srv = TestServer::spawn(POLICY).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/login"))
        .json(&json!({ "user_id": "u1", "org_id": "" , "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "validation_error");

    let res = client
        .post(srv.url("/login"))
        .json(&json!({ "user_id": "u1", "org_id": "orgA" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn credentials_are_required_and_checked() {
    let srv = TestServer::spawn(POLICY).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/api/notes")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "unauthorized");

    let res = client
        .get(srv.url("/api/notes"))
        .header("Authorization", "Token abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "unauthorized");

    let forged = mint_jwt("someone-elses-secret", "u1", "orgA", Utc::now());
    let res = client.get(srv.url("/api/notes")).bearer_auth(forged).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "invalid_token");

    let stale = mint_jwt(JWT_SECRET, "u1", "orgA", Utc::now() - ChronoDuration::hours(25));
    let res = client.get(srv.url("/api/notes")).bearer_auth(stale).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "token_expired");
}

#[tokio::test]
async fn identity_comes_from_the_token_not_headers() {
    let srv = TestServer::spawn(POLICY).await;
    let client = reqwest::Client::new();
    let token = login(&client, &srv, "u1", "orgA").await;

    let res = client
        .get(srv.url("/api/whoami"))
        .bearer_auth(&token)
        .header("X-Organization-ID", "orgB")
        .header("X-User-ID", "intruder")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["organization_id"], "orgA");
    assert_eq!(body["user_id"], "u1");
    assert_eq!(body["role"], "admin");

    let res = client
        .post(srv.url("/api/notes"))
        .bearer_auth(&token)
        .header("X-Organization-ID", "orgB")
        .json(&json!({ "title": "mine", "organization_id": "orgB", "user_id": "intruder" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["organization_id"], "orgA");
    assert_eq!(body["data"]["user_id"], "u1");
}

#[tokio::test]
async fn created_note_is_audited_eventually() {
    let srv = TestServer::spawn(POLICY).await;
    let client = reqwest::Client::new();
    let token = login(&client, &srv, "u1", "orgA").await;

    let res = create_note(&client, &srv, &token, "hi").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["organization_id"], "orgA");
    assert_eq!(body["data"]["title"], "hi");
    let note_id = body["data"]["id"].as_i64().unwrap();

    // The audit trail is eventually consistent; poll briefly.
    let org = OrganizationId::new("orgA").unwrap();
    for _ in 0..100 {
        let records = srv.backends.audit_sink.records_for(&org);
        if !records.is_empty() {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].action(), AuditAction::CreateNote);
            assert_eq!(records[0].note_id().get(), note_id);
            assert_eq!(records[0].user_id().as_str(), "u1");
            assert_eq!(records[0].details(), "Note created with title: hi");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("audit record did not arrive within timeout");
}

#[tokio::test]
async fn notes_are_isolated_per_organization() {
    let srv = TestServer::spawn(POLICY).await;
    let client = reqwest::Client::new();
    let token_a = login(&client, &srv, "u1", "orgA").await;
    let token_b = login(&client, &srv, "u2", "orgB").await;

    let res = create_note(&client, &srv, &token_b, "b secret").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let b_id = body["data"]["id"].as_i64().unwrap();

    let res = client
        .get(srv.url(&format!("/api/notes/{b_id}")))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(res).await, "not_found");

    let res = client.get(srv.url("/api/notes")).bearer_auth(&token_a).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());

    let res = client
        .get(srv.url(&format!("/api/notes/{b_id}")))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_input_is_rejected() {
    let srv = TestServer::spawn(POLICY).await;
    let client = reqwest::Client::new();
    let token = login(&client, &srv, "u1", "orgA").await;

    let res = create_note(&client, &srv, &token, "   ").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "validation_error");

    let res = client
        .get(srv.url("/api/notes/not-a-number"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_id");
}

#[tokio::test]
async fn policy_denies_are_forbidden() {
    let srv = TestServer::spawn(POLICY).await;
    let client = reqwest::Client::new();
    let token = login(&client, &srv, "blocked_user", "orgA").await;

    let res = create_note(&client, &srv, &token, "nope").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("POST /api/notes"));
    assert!(message.contains("blocked_user"));
    assert!(message.contains("orgA"));
    assert!(!message.contains("role"));

    // Spoofed identity headers do not change the decision.
    let res = client
        .post(srv.url("/api/notes"))
        .bearer_auth(&token)
        .header("X-User-ID", "u1")
        .header("X-Organization-ID", "orgB")
        .json(&json!({ "title": "nope", "user_id": "u1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "forbidden");

    // The same user may still read.
    let res = client.get(srv.url("/api/notes")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Anything the table does not mention is denied.
    let res = client
        .delete(srv.url("/api/notes/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn per_note_rules_cannot_be_sidestepped_by_id_spelling() {
    let policy = "
p, u1, orgA, /api/notes/1, GET, deny
p, *, *, /api/notes, POST
p, *, *, /api/notes/:id, GET
";
    let srv = TestServer::spawn(policy).await;
    let client = reqwest::Client::new();
    let token = login(&client, &srv, "u1", "orgA").await;

    let res = create_note(&client, &srv, &token, "first").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["data"]["id"], 1);

    let res = client.get(srv.url("/api/notes/1")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    for spelling in ["01", "0001", "+1"] {
        let res = client
            .get(srv.url(&format!("/api/notes/{spelling}")))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "spelling {spelling}");
        assert_eq!(error_code(res).await, "invalid_id");
    }
}

#[tokio::test]
async fn overlong_identities_are_refused() {
    let srv = TestServer::spawn(POLICY).await;
    let client = reqwest::Client::new();
    let long_id = "x".repeat(60);

    let res = client
        .post(srv.url("/login"))
        .json(&json!({ "user_id": long_id, "org_id": "orgA", "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "validation_error");

    let res = client
        .post(srv.url("/login"))
        .json(&json!({ "user_id": "u1", "org_id": long_id, "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // A correctly signed token carrying such an id is still not trusted.
    let token = mint_jwt(JWT_SECRET, &long_id, "orgA", Utc::now());
    let res = client.get(srv.url("/api/notes")).bearer_auth(token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "invalid_token");
}

#[tokio::test]
async fn policy_evaluation_failure_is_a_server_error() {
    let mut policy = String::from("p, *, *, /api/notes, GET\n");
    policy.push_str("g, deep_user, r0\n");
    for i in 0..12 {
        policy.push_str(&format!("g, r{i}, r{}\n", i + 1));
    }

    let srv = TestServer::spawn(&policy).await;
    let client = reqwest::Client::new();
    let token = login(&client, &srv, "deep_user", "orgA").await;

    let res = client.get(srv.url("/api/notes")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(res).await, "policy_error");
}

#[tokio::test]
async fn audit_outage_never_fails_the_write() {
    let srv = TestServer::spawn(POLICY).await;
    srv.backends.audit_queue.set_offline(true);

    let client = reqwest::Client::new();
    let token = login(&client, &srv, "u1", "orgA").await;

    let res = create_note(&client, &srv, &token, "still saved").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["data"]["id"].as_i64().unwrap();

    let res = client
        .get(srv.url(&format!("/api/notes/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(srv.backends.audit_sink.is_empty());
}
