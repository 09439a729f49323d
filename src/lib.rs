pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod external;
pub mod jwt;
pub mod notifier;
pub mod password;
pub mod rate_limit;

use api::create_api_router;
use auth::{SessionOrchestrator, SessionPolicy};
use axum::Router;
use db::Database;
use external::{
    CredentialRefreshError, ExternalAuthConfig, ExternalTokenCache, HttpCredentialSource,
};
use jwt::{SigningKeys, TokenCodec, TokenTtls};
use notifier::Notifier;
use password::PasswordHasher;
use rate_limit::{RateLimitConfig, RateLimitSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Lifetimes of stateless tokens per purpose
    pub token_ttls: TokenTtls,
    pub session_policy: SessionPolicy,
    /// Delivers verification and reset messages
    pub notifier: Arc<dyn Notifier>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub rate_limits: RateLimitSettings,
    /// IP extraction strategy (requires running behind a proxy)
    pub ip_extractor: Option<cli::IpExtractor>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let keys = Arc::new(SigningKeys::new(&config.jwt_secret));
    let codec = Arc::new(TokenCodec::new(keys, config.token_ttls));

    let sessions = SessionOrchestrator::new(
        config.db.clone(),
        codec.clone(),
        config.hasher.clone(),
        config.notifier.clone(),
        config.session_policy,
    );

    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.rate_limits,
        config.ip_extractor.clone(),
    ));

    Router::new().nest(
        "/api",
        create_api_router(sessions, codec, rate_limit_config),
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Build the outbound credential cache, fetch the first credential, and keep
/// it warm in the background. Fails if the first fetch fails.
pub async fn init_external_credentials(
    config: &ExternalAuthConfig,
    refresh_skew: Duration,
    keep_warm: Duration,
) -> Result<Arc<ExternalTokenCache<HttpCredentialSource>>, CredentialRefreshError> {
    let source = HttpCredentialSource::new(config)?;
    let cache = Arc::new(ExternalTokenCache::new(
        source,
        refresh_skew,
        config.timeout,
    ));

    cache.get_credential().await?;
    info!(url = %config.auth_url, "External credential acquired");

    cache.clone().spawn_keep_warm(keep_warm);
    Ok(cache)
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    // Run cleanup tasks on startup
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
