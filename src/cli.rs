//! CLI argument parsing, validation, and startup helpers.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use clap::Parser;
use tracing::{error, info};
use url::Url;

use crate::ServerConfig;
use crate::auth::SessionPolicy;
use crate::db::Database;
use crate::external::ExternalAuthConfig;
use crate::jwt::TokenTtls;
use crate::notifier::LogNotifier;
use crate::password::Argon2Hasher;
use crate::rate_limit::RateLimitSettings;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Reads the client IP from a trusted proxy header.
#[derive(Clone, Debug)]
pub struct IpExtractor {
    pub header_name: HeaderName,
}

impl IpExtractor {
    pub fn new(header: &str) -> Result<Self, String> {
        let header_name = HeaderName::from_bytes(header.trim().as_bytes())
            .map_err(|e| format!("Invalid header name '{}': {}", header, e))?;
        Ok(Self { header_name })
    }

    /// Parse the first address of a comma-separated header value.
    pub fn extract(&self, value: &str) -> Result<String, &'static str> {
        let first = value.split(',').next().unwrap_or_default().trim();
        first
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header does not contain a valid IP address")
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "jobboard-auth",
    about = "Credential and session service for the job board"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "jobboard.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, default_value = "900")]
    pub access_ttl: u64,

    /// Refresh session lifetime in seconds
    #[arg(long, default_value = "604800")]
    pub refresh_ttl: u64,

    /// Email verification token lifetime in seconds
    #[arg(long, default_value = "1800")]
    pub email_verify_ttl: u64,

    /// Password reset token lifetime in seconds
    #[arg(long, default_value = "900")]
    pub password_reset_ttl: u64,

    /// Timeout for a single notification send, in seconds
    #[arg(long, default_value = "10")]
    pub notifier_timeout: u64,

    /// Keep refresh sessions alive when a rotated refresh token is replayed
    #[arg(long)]
    pub no_revoke_on_replay: bool,

    /// Revoke all refresh sessions of an identity after a password reset
    #[arg(long)]
    pub revoke_on_password_reset: bool,

    /// Remote authorization endpoint for the outbound API credential.
    /// The client secret is read from EXTERNAL_AUTH_KEY
    #[arg(long, env = "EXTERNAL_AUTH_URL")]
    pub external_auth_url: Option<Url>,

    /// Scope requested from the remote authorization endpoint
    #[arg(long, env = "EXTERNAL_AUTH_SCOPE", requires = "external_auth_url")]
    pub external_auth_scope: Option<String>,

    /// PEM bundle of extra root certificates for the authorization endpoint
    #[arg(long, requires = "external_auth_url")]
    pub external_ca_bundle: Option<PathBuf>,

    /// Refresh the outbound credential this many seconds before it expires
    #[arg(long, default_value = "60")]
    pub external_refresh_skew: u64,

    /// Timeout for a single authorization request, in seconds
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub external_timeout: u64,

    /// Interval of the background credential refresh, in seconds
    #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
    pub external_keep_warm: u64,

    /// Read the client IP from this header (e.g. X-Forwarded-For) instead of the socket.
    /// Only use behind a proxy that sets it
    #[arg(long, value_parser = IpExtractor::new)]
    pub ip_header: Option<IpExtractor>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a secret from an environment variable and remove it from the environment.
fn take_env_secret(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    // SAFETY: We're single-threaded at this point during startup,
    // and no other code is reading this environment variable.
    unsafe { std::env::remove_var(name) };
    Some(value)
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Some(secret) = take_env_secret("JWT_SECRET") {
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build the outbound credential configuration, if an endpoint is configured.
/// Fails when the endpoint is set but the scope or client secret is missing.
pub fn external_auth_config(args: &Args) -> Result<Option<ExternalAuthConfig>, &'static str> {
    let Some(auth_url) = args.external_auth_url.clone() else {
        return Ok(None);
    };

    let scope = args
        .external_auth_scope
        .clone()
        .ok_or("--external-auth-scope is required with --external-auth-url")?;

    let auth_key = take_env_secret("EXTERNAL_AUTH_KEY")
        .ok_or("EXTERNAL_AUTH_KEY must be set when --external-auth-url is used")?;

    Ok(Some(ExternalAuthConfig {
        auth_url,
        auth_key,
        scope,
        timeout: Duration::from_secs(args.external_timeout),
        ca_bundle: args.external_ca_bundle.clone(),
    }))
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        token_ttls: TokenTtls {
            access: args.access_ttl,
            email_verify: args.email_verify_ttl,
            password_reset: args.password_reset_ttl,
        },
        session_policy: SessionPolicy {
            notifier_timeout: Duration::from_secs(args.notifier_timeout),
            revoke_on_replay: !args.no_revoke_on_replay,
            revoke_on_password_reset: args.revoke_on_password_reset,
        },
        notifier: Arc::new(LogNotifier),
        hasher: Arc::new(Argon2Hasher::new()),
        rate_limits: RateLimitSettings::default(),
        ip_extractor: args.ip_header.clone(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str, refresh_ttl: u64) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db.with_refresh_ttl(refresh_ttl))
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_defaults() {
        let args = Args::try_parse_from(["jobboard-auth"]).unwrap();
        assert_eq!(args.access_ttl, 900);
        assert_eq!(args.refresh_ttl, 604800);
        assert_eq!(args.email_verify_ttl, 1800);
        assert_eq!(args.password_reset_ttl, 900);
        assert!(args.ip_header.is_none());
    }

    #[test]
    fn test_ip_header_parsing() {
        let args =
            Args::try_parse_from(["jobboard-auth", "--ip-header", "X-Real-IP"]).unwrap();
        let extractor = args.ip_header.unwrap();
        assert_eq!(extractor.header_name.as_str(), "x-real-ip");

        assert_eq!(extractor.extract("198.51.100.4").unwrap(), "198.51.100.4");
        assert_eq!(
            extractor.extract(" 2001:db8::1 , 10.0.0.1").unwrap(),
            "2001:db8::1"
        );
        assert!(extractor.extract("unknown").is_err());
    }

    #[test]
    fn test_zero_external_intervals_rejected() {
        assert!(Args::try_parse_from(["jobboard-auth", "--external-keep-warm", "0"]).is_err());
        assert!(Args::try_parse_from(["jobboard-auth", "--external-timeout", "0"]).is_err());

        let args = Args::try_parse_from(["jobboard-auth", "--external-keep-warm", "1"]).unwrap();
        assert_eq!(args.external_keep_warm, 1);
    }

    #[test]
    fn test_invalid_ip_header_rejected() {
        assert!(Args::try_parse_from(["jobboard-auth", "--ip-header", "bad header"]).is_err());
    }

    #[tokio::test]
    async fn test_build_config() {
        let args = Args::try_parse_from([
            "jobboard-auth",
            "--access-ttl",
            "60",
            "--no-revoke-on-replay",
        ])
        .unwrap();
        let db = Database::open(":memory:").await.unwrap();

        let config = build_config(&args, db, "x".repeat(32));
        assert_eq!(config.token_ttls.access, 60);
        assert_eq!(config.token_ttls.email_verify, 1800);
        assert!(!config.session_policy.revoke_on_replay);
        assert!(!config.session_policy.revoke_on_password_reset);
    }

    #[tokio::test]
    async fn test_build_config_revoke_on_password_reset() {
        let args =
            Args::try_parse_from(["jobboard-auth", "--revoke-on-password-reset"]).unwrap();
        let db = Database::open(":memory:").await.unwrap();

        let config = build_config(&args, db, "x".repeat(32));
        assert!(config.session_policy.revoke_on_replay);
        assert!(config.session_policy.revoke_on_password_reset);
    }
}
