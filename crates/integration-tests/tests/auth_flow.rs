//! Password and federated login flows through the HTTP surface.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use dongne_core::Email;
use dongne_integration_tests::{APP_BASE_URL, TestApp, TestResponse};

/// Start the browser flow and return `(state, session cookie)`.
async fn begin_oauth(app: &TestApp) -> (String, String) {
    let res = app.get("/auth/kakao/login", None).await;
    assert!(res.status.is_redirection(), "{}", res.status);

    let location = url::Url::parse(res.header("location").expect("location")).expect("url");
    let params: Vec<(String, String)> = location.query_pairs().into_owned().collect();
    let param = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .expect("query parameter")
    };
    assert_eq!(param("client_id"), "mock-client");
    assert_eq!(
        param("redirect_uri"),
        format!("{APP_BASE_URL}/auth/kakao/callback")
    );

    let cookie = res
        .header(header::SET_COOKIE.as_str())
        .expect("session cookie")
        .split(';')
        .next()
        .expect("cookie pair")
        .to_owned();
    (param("state"), cookie)
}

async fn callback(app: &TestApp, code: &str, state: &str, cookie: &str) -> TestResponse {
    app.send(
        Request::get(format!("/auth/kakao/callback?code={code}&state={state}"))
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .expect("request builds"),
    )
    .await
}

#[tokio::test]
async fn test_password_login_and_whoami() {
    let app = TestApp::new();
    let (id, token) = app.register_and_login("Owner@Dongne.test").await;

    let me = app.get("/api/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    let body = me.json();
    assert_eq!(body["id"], id);
    assert_eq!(body["email"], "owner@dongne.test");
    assert_eq!(body["account_type"], "local");
    assert_eq!(body["role"], "user");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.register_and_login("a@dongne.test").await;

    let res = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            &json!({ "email": "a@dongne.test", "password": "not the password" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let unknown = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            &json!({ "email": "nobody@dongne.test", "password": "not the password" }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.text(), unknown.text());
}

#[tokio::test]
async fn test_duplicate_and_weak_registration() {
    let app = TestApp::new();
    app.register_and_login("dup@dongne.test").await;

    let dup = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            &json!({ "email": "DUP@dongne.test", "password": "another password" }),
        )
        .await;
    assert_eq!(dup.status, StatusCode::CONFLICT);

    let weak = app
        .json(
            Method::POST,
            "/auth/register",
            None,
            &json!({ "email": "weak@dongne.test", "password": "short" }),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_routes_need_a_valid_token() {
    let app = TestApp::new();

    let missing = app.get("/api/me", None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.header("www-authenticate"), Some("Bearer"));

    let forged = app.get("/api/me", Some("not.a.token")).await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_legacy_password_then_change() {
    let app = TestApp::new();
    let email = Email::parse("old@dongne.test").expect("email");
    let _legacy = app.db.insert_legacy_user(email, "plain-legacy-pw");

    let login = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            &json!({ "email": "old@dongne.test", "password": "plain-legacy-pw" }),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK, "{}", login.text());
    let token = login.json()["token"].as_str().expect("token").to_owned();

    let change = app
        .json(
            Method::PUT,
            "/api/me/password",
            Some(&token),
            &json!({ "current_password": "plain-legacy-pw", "new_password": "a proper passphrase" }),
        )
        .await;
    assert_eq!(change.status, StatusCode::NO_CONTENT);

    let old = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            &json!({ "email": "old@dongne.test", "password": "plain-legacy-pw" }),
        )
        .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);

    let new = app
        .json(
            Method::POST,
            "/auth/login",
            None,
            &json!({ "email": "old@dongne.test", "password": "a proper passphrase" }),
        )
        .await;
    assert_eq!(new.status, StatusCode::OK);
    assert_eq!(new.json()["user"]["must_reset"], false);
}

#[tokio::test]
async fn test_first_federated_login_creates_principal() {
    let app = TestApp::with_provider().await;
    let (state, cookie) = begin_oauth(&app).await;

    let res = callback(&app, "1001", &state, &cookie).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    let body = res.json();
    assert_eq!(body["user"]["account_type"], "kakao");
    assert_eq!(body["user"]["nickname"], "kakao-1001");

    let token = body["token"].as_str().expect("token");
    let me = app.get("/api/me", Some(token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["id"], body["user"]["id"]);
}

#[tokio::test]
async fn test_returning_federated_login_reuses_token() {
    let app = TestApp::with_provider().await;

    let first = app
        .json(Method::POST, "/auth/kakao/token", None, &json!({ "code": "2002" }))
        .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.text());
    let writes = app.db.session_writes();

    let second = app
        .json(Method::POST, "/auth/kakao/token", None, &json!({ "code": "2002" }))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.json()["token"], first.json()["token"]);
    assert_eq!(second.json()["user"]["id"], first.json()["user"]["id"]);
    assert_eq!(app.db.session_writes(), writes);
}

#[tokio::test]
async fn test_callback_rejects_wrong_or_replayed_state() {
    let app = TestApp::with_provider().await;
    let (state, cookie) = begin_oauth(&app).await;

    let forged = callback(&app, "1001", "forged-state", &cookie).await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);

    // The failed attempt consumed the pending state.
    let replay = callback(&app, "1001", &state, &cookie).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.provider.as_ref().expect("provider").profile_calls(), 0);
}

#[tokio::test]
async fn test_provider_failures_create_nothing() {
    let app = TestApp::with_provider().await;

    let exchange = app
        .json(Method::POST, "/auth/kakao/token", None, &json!({ "code": "bad" }))
        .await;
    assert_eq!(exchange.status, StatusCode::BAD_GATEWAY);

    let profile = app
        .json(Method::POST, "/auth/kakao/token", None, &json!({ "code": "9001" }))
        .await;
    assert_eq!(profile.status, StatusCode::BAD_GATEWAY);
    assert_eq!(app.db.session_writes(), 0);
}

#[tokio::test]
async fn test_federated_email_links_local_account() {
    let app = TestApp::with_provider().await;
    let (id, _) = app.register_and_login("kim@dongne.test").await;

    let res = app
        .json(
            Method::POST,
            "/auth/kakao/token",
            None,
            &json!({ "code": "3003~kim@dongne.test" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    assert_eq!(res.json()["user"]["id"], id);
}

#[tokio::test]
async fn test_unverified_federated_email_does_not_link() {
    let app = TestApp::with_provider().await;
    let (id, _) = app.register_and_login("admin@dongne.test").await;

    let res = app
        .json(
            Method::POST,
            "/auth/kakao/token",
            None,
            &json!({ "code": "4004!admin@dongne.test" }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.text());
    let body = res.json();
    assert_ne!(body["user"]["id"], id);
    assert_eq!(body["user"]["account_type"], "kakao");
    assert!(body["user"]["email"].is_null());

    let token = body["token"].as_str().expect("token");
    let me = app.get("/api/me", Some(token)).await.json();
    assert_ne!(me["id"], id);
}

#[tokio::test]
async fn test_unconfigured_and_unknown_providers() {
    let app = TestApp::with_provider().await;

    assert_eq!(
        app.get("/auth/naver/login", None).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/auth/myspace/login", None).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();
    let live = app.get("/health", None).await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.text(), "ok");
    assert!(live.header("x-request-id").is_some());

    assert_eq!(app.get("/health/ready", None).await.status, StatusCode::OK);
}
