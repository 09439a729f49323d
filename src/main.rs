use std::time::Duration;

use clap::Parser;
use jobboard_auth::cli::{
    Args, build_config, external_auth_config, init_logging, load_jwt_secret, open_database,
};
use jobboard_auth::{init_cleanup, init_external_credentials, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let external = external_auth_config(&args).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });

    let Some(db) = open_database(&args.database, args.refresh_ttl).await else {
        std::process::exit(1);
    };

    // Held for the lifetime of the process; the keep-warm task shares it.
    let _external_credentials = match external {
        Some(config) => {
            match init_external_credentials(
                &config,
                Duration::from_secs(args.external_refresh_skew),
                Duration::from_secs(args.external_keep_warm),
            )
            .await
            {
                Ok(cache) => Some(cache),
                Err(e) => {
                    error!(error = %e, "Failed to acquire external credential");
                    std::process::exit(1);
                }
            }
        }
        None => {
            info!("External authorization not configured");
            None
        }
    };

    init_cleanup(&db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let config = build_config(&args, db, jwt_secret);
    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
