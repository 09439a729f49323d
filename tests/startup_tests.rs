//! Startup validation of the binary and serving over a real socket.

mod common;

use std::process::{Command, Output, Stdio};

use common::{RecordingNotifier, cheap_hasher, TEST_SECRET};
use jobboard_auth::auth::SessionPolicy;
use jobboard_auth::db::Database;
use jobboard_auth::jwt::TokenTtls;
use jobboard_auth::rate_limit::RateLimitSettings;
use jobboard_auth::{ServerConfig, start_server};

fn run_binary(command: &mut Command) -> String {
    let output: Output = command
        .env_remove("EXTERNAL_AUTH_URL")
        .env_remove("EXTERNAL_AUTH_SCOPE")
        .stderr(Stdio::piped())
        .stdout(Stdio::piped())
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success(), "binary should have exited with an error");

    // tracing logs to stdout by default
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{}{}", stdout, stderr)
}

#[test]
fn test_missing_jwt_secret_exits_with_error() {
    let combined = run_binary(
        Command::new(env!("CARGO_BIN_EXE_jobboard-auth")).env_remove("JWT_SECRET"),
    );
    assert!(
        combined.contains("JWT_SECRET") && combined.contains("required"),
        "Should mention JWT_SECRET is required, got: {}",
        combined
    );
}

#[test]
fn test_short_jwt_secret_exits_with_error() {
    let combined = run_binary(
        Command::new(env!("CARGO_BIN_EXE_jobboard-auth")).env("JWT_SECRET", "too-short"),
    );
    assert!(
        combined.contains("shorter than"),
        "Should reject a short secret, got: {}",
        combined
    );
}

#[test]
fn test_external_auth_without_key_exits_with_error() {
    let combined = run_binary(
        Command::new(env!("CARGO_BIN_EXE_jobboard-auth"))
            .env("JWT_SECRET", "test-secret-that-is-long-enough!!")
            .env_remove("EXTERNAL_AUTH_KEY")
            .args([
                "--external-auth-url",
                "http://127.0.0.1:9/oauth",
                "--external-auth-scope",
                "TEST_SCOPE",
            ]),
    );
    assert!(
        combined.contains("EXTERNAL_AUTH_KEY"),
        "Should mention EXTERNAL_AUTH_KEY, got: {}",
        combined
    );
}

#[tokio::test]
async fn test_start_server_serves_auth_routes() {
    let db = Database::open(":memory:").await.unwrap();
    let config = ServerConfig {
        db,
        jwt_secret: TEST_SECRET.to_vec(),
        token_ttls: TokenTtls::default(),
        session_policy: SessionPolicy::default(),
        notifier: RecordingNotifier::new(),
        hasher: cheap_hasher(),
        rate_limits: RateLimitSettings::generous(),
        ip_extractor: None,
    };

    let (handle, addr) = start_server(config, 0).await.unwrap();
    let client = reqwest::Client::new();
    let base = format!("http://{}/api/auth", addr);

    let response = client
        .post(format!("{}/register", base))
        .json(&serde_json::json!({
            "full_name": "Alice",
            "email": "a@x.com",
            "phone": "+1",
            "password": "pw12345678",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = client
        .post(format!("{}/login", base))
        .json(&serde_json::json!({ "email": "a@x.com", "password": "pw12345678" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let pair: serde_json::Value = response.json().await.unwrap();
    assert_eq!(pair["role"], "APPLICANT");

    handle.abort();
}
