#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use jobboard_auth::auth::SessionPolicy;
use jobboard_auth::db::Database;
use jobboard_auth::jwt::{SigningKeys, TokenCodec, TokenTtls};
use jobboard_auth::notifier::{Notifier, NotifyError};
use jobboard_auth::password::Argon2Hasher;
use jobboard_auth::rate_limit::RateLimitSettings;
use jobboard_auth::{ServerConfig, create_app};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-at-least-32-bytes-long";

/// A message captured by `RecordingNotifier`.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl SentMessage {
    /// The token is the last word of every message body.
    pub fn token(&self) -> String {
        self.body
            .rsplit(' ')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

/// Notifier that keeps every message in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn last(&self) -> SentMessage {
        self.messages
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no message was sent")
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("mail relay down".into()));
        }
        self.messages.lock().unwrap().push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Argon2 with minimal cost so tests stay fast.
pub fn cheap_hasher() -> Arc<Argon2Hasher> {
    Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap())
}

/// Codec sharing the test app's signing secret.
pub fn test_codec() -> TokenCodec {
    TokenCodec::new(Arc::new(SigningKeys::new(TEST_SECRET)), TokenTtls::default())
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn test_app() -> TestApp {
    test_app_with(RateLimitSettings::generous(), SessionPolicy::default()).await
}

pub async fn test_app_with(rate_limits: RateLimitSettings, policy: SessionPolicy) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let notifier = RecordingNotifier::new();

    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: TEST_SECRET.to_vec(),
        token_ttls: TokenTtls::default(),
        session_policy: policy,
        notifier: notifier.clone(),
        hasher: cheap_hasher(),
        rate_limits,
        ip_extractor: None,
    };

    TestApp {
        app: create_app(&config),
        db,
        notifier,
    }
}

fn json_request(uri: &str, body: &Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, mut request: Request<Body>, with_ip: bool) -> (StatusCode, Value) {
    if with_ip {
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    }

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// POST a JSON body from 127.0.0.1.
pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, json_request(uri, &body, None), true).await
}

/// POST a JSON body with an `Authorization: Bearer` header.
pub async fn post_json_with_bearer(
    app: &Router,
    uri: &str,
    body: Value,
    token: &str,
) -> (StatusCode, Value) {
    send(app, json_request(uri, &body, Some(token)), true).await
}

/// POST without connection info, as if the client address were unknown.
pub async fn post_json_without_ip(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, json_request(uri, &body, None), false).await
}

pub async fn register(app: &Router, email: &str, password: &str) -> Value {
    let (status, body) = post_json(
        app,
        "/api/auth/register",
        serde_json::json!({
            "full_name": "Alice",
            "email": email,
            "phone": "+1",
            "password": password,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body
}

/// Log in and return (access_token, refresh_token).
pub async fn login(app: &Router, email: &str, password: &str) -> (String, String) {
    let (status, body) = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}
