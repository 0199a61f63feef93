//! End-to-end test harness for the Dongne API.
//!
//! [`TestApp`] builds the real router over the in-memory database, an
//! in-memory object store and an in-memory OAuth session store, and drives it
//! with `tower::ServiceExt::oneshot`. [`MockProvider`] serves a Kakao-shaped
//! token and profile endpoint on an ephemeral local port.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p dongne-integration-tests
//! ```
//!
//! No database or network access is needed.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use dongne_api::config::{ApiConfig, StorageBackend, StorageConfig, TokenConfig};
use dongne_api::db::MemoryDatabase;
use dongne_api::federation::{FederationGateway, Provider, ProviderConfig, ProviderEndpoints};
use dongne_api::state::{AppState, Stores};
use dongne_api::storage::{BlobStore, ObjectBlobStore};
use dongne_core::ShopId;

/// Base URL the app believes it is served from.
pub const APP_BASE_URL: &str = "http://dongne.test";

/// Prefix of public image URLs.
pub const BLOB_BASE_URL: &str = "http://blobs.dongne.test";

/// The one shop seeded into every [`TestApp`].
pub const SHOP_ID: i32 = 1;

const TEST_TOKEN_SECRET: &str = "k3Y9-qT7vLx2Rp8Zs4Wm6Nd1Fh5Jb0Gc";

const MULTIPART_BOUNDARY: &str = "dongne-test-boundary";

// =============================================================================
// Responses
// =============================================================================

/// A fully buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Body parsed as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the body is not JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "expected JSON body, got {:?} ({e})",
                String::from_utf8_lossy(&self.body)
            )
        })
    }

    /// Body as text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Value of a response header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// =============================================================================
// Application
// =============================================================================

/// The API router wired to in-memory backends.
pub struct TestApp {
    router: Router,
    pub db: MemoryDatabase,
    objects: Arc<InMemory>,
    blobs: ObjectBlobStore,
    pub provider: Option<MockProvider>,
}

impl TestApp {
    /// App without any identity provider.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// App with Kakao served by a local [`MockProvider`].
    pub async fn with_provider() -> Self {
        Self::build(Some(MockProvider::start().await))
    }

    fn build(provider: Option<MockProvider>) -> Self {
        let providers: Vec<ProviderConfig> = provider.iter().map(MockProvider::config).collect();
        let config = ApiConfig {
            database_url: SecretString::from("postgres://unused"),
            host: [127, 0, 0, 1].into(),
            port: 0,
            base_url: APP_BASE_URL.to_owned(),
            token: TokenConfig {
                secret: SecretString::from(TEST_TOKEN_SECRET),
                ttl: Some(Duration::from_secs(60 * 60)),
            },
            providers: providers.clone(),
            provider_timeout: Duration::from_secs(5),
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                public_base_url: BLOB_BASE_URL.to_owned(),
                timeout: Duration::from_secs(5),
            },
            rate_limit: false,
            sentry_dsn: None,
            sentry_environment: None,
        };

        let db = MemoryDatabase::new();
        db.insert_shop(ShopId::new(SHOP_ID));
        let objects = Arc::new(InMemory::new());
        let blobs = ObjectBlobStore::new(objects.clone(), BLOB_BASE_URL, Duration::from_secs(5))
            .with_content_type_attributes();
        let gateway = FederationGateway::new(providers, Duration::from_secs(5))
            .expect("gateway builds");

        let state = AppState::new(
            config,
            Stores::memory(&db),
            Arc::new(gateway),
            Arc::new(blobs.clone()),
            None,
        );
        let router = dongne_api::app(state, tower_sessions::MemoryStore::default());

        Self {
            router,
            db,
            objects,
            blobs,
            provider,
        }
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response: Response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        TestResponse {
            status,
            headers,
            body,
        }
    }

    fn request(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    /// `GET` with an optional bearer token.
    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(
            Self::request(Method::GET, uri, token)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
    }

    /// `DELETE` with an optional bearer token.
    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(
            Self::request(Method::DELETE, uri, token)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
    }

    /// Send `body` as JSON.
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: &Value,
    ) -> TestResponse {
        self.send(
            Self::request(method, uri, token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
    }

    /// `PUT` a multipart body with one `image` file field.
    pub async fn upload(
        &self,
        uri: &str,
        token: Option<&str>,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> TestResponse {
        let mut body = format!(
            "--{MULTIPART_BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\n"
        )
        .into_bytes();
        if let Some(content_type) = content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

        self.send(
            Self::request(Method::PUT, uri, token)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
                )
                .body(Body::from(body))
                .expect("request builds"),
        )
        .await
    }

    /// Register a password account and log in, returning `(user id, token)`.
    pub async fn register_and_login(&self, email: &str) -> (i64, String) {
        let password = "correct horse battery";
        let res = self
            .json(
                Method::POST,
                "/auth/register",
                None,
                &json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text());

        let res = self
            .json(
                Method::POST,
                "/auth/login",
                None,
                &json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.text());

        let body = res.json();
        let id = body["user"]["id"].as_i64().expect("user id");
        let token = body["token"].as_str().expect("token").to_owned();
        (id, token)
    }

    /// Create a review as `token` and return its id.
    pub async fn create_review(&self, token: &str, body: &str) -> i64 {
        let res = self
            .json(
                Method::POST,
                "/api/reviews",
                Some(token),
                &json!({ "shop_id": SHOP_ID, "body": body }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.text());
        res.json()["id"].as_i64().expect("review id")
    }

    /// Whether the object behind a public image URL exists.
    pub async fn blob_exists(&self, url: &str) -> bool {
        let Some(key) = self.blobs.key_for_url(url) else {
            return false;
        };
        let path = ObjectPath::parse(key).expect("valid key");
        self.objects.head(&path).await.is_ok()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Mock identity provider
// =============================================================================

/// A Kakao-compatible provider on `127.0.0.1`.
///
/// Authorization codes encode the identity: `"{id}"`, `"{id}~{email}"` for a
/// verified email or `"{id}!{email}"` for an unverified one.
/// The code `bad` is rejected by the token endpoint, and ids starting with
/// `9` make the profile endpoint fail.
pub struct MockProvider {
    pub base_url: String,
    profile_calls: Arc<AtomicUsize>,
}

impl MockProvider {
    /// Bind an ephemeral port and start serving.
    pub async fn start() -> Self {
        let profile_calls = Arc::new(AtomicUsize::new(0));
        let calls = profile_calls.clone();

        let router = Router::new()
            .route("/oauth/token", post(mock_token))
            .route(
                "/v2/user/me",
                get(move |headers: HeaderMap| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    mock_profile(headers)
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock provider");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("mock provider");
        });

        Self {
            base_url: format!("http://{addr}"),
            profile_calls,
        }
    }

    /// Number of profile requests served so far.
    #[must_use]
    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    fn config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: Provider::Kakao,
            client_id: "mock-client".to_owned(),
            client_secret: None,
            redirect_uri: format!("{APP_BASE_URL}/auth/kakao/callback"),
            endpoints: ProviderEndpoints {
                authorize_url: format!("{}/oauth/authorize", self.base_url),
                token_url: format!("{}/oauth/token", self.base_url),
                profile_url: format!("{}/v2/user/me", self.base_url),
            },
        }
    }
}

async fn mock_token(Form(form): Form<Vec<(String, String)>>) -> Response {
    let code = form
        .iter()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();

    if code == "bad" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "code expired" })),
        )
            .into_response();
    }
    Json(json!({ "access_token": format!("at.{code}"), "expires_in": 21599 })).into_response()
}

async fn mock_profile(headers: HeaderMap) -> Response {
    let code = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer at."))
        .unwrap_or_default()
        .to_owned();
    let (id, email, verified) = if let Some((id, email)) = code.split_once('~') {
        (id.to_owned(), Some(email.to_owned()), true)
    } else if let Some((id, email)) = code.split_once('!') {
        (id.to_owned(), Some(email.to_owned()), false)
    } else {
        (code, None, false)
    };

    if id.starts_with('9') {
        return (StatusCode::INTERNAL_SERVER_ERROR, "profile backend down").into_response();
    }
    let Ok(id) = id.parse::<i64>() else {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    };

    Json(json!({
        "id": id,
        "kakao_account": {
            "email": email,
            "is_email_valid": email.is_some(),
            "is_email_verified": verified,
            "profile": { "nickname": format!("kakao-{id}") }
        }
    }))
    .into_response()
}
