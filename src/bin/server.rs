use chrono::{TimeDelta, Utc};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use dockwarden::db;
use dockwarden::db::services::{SqliteAuditStore, SqliteUserStore};
use dockwarden::runtime::docker::DockerRuntime;
use dockwarden::server::config::ServerConfig;
use dockwarden::server::dispatcher::GatewayDispatcher;
use dockwarden::services::audit_logger::AuditLogger;
use dockwarden::services::auth_service::{Authenticator, provision_default_accounts};
use dockwarden::services::host_service::UnconfiguredHostServices;
use dockwarden::services::rate_limiter::LoginRateLimiter;
use dockwarden::services::session_service::SessionKeys;
use dockwarden::version::{VERSION, banner};
use dockwarden::web;

const HOUSEKEEPING_INTERVAL_SECS: u64 = 60;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "dockwarden.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sqlx=warn` if RUST_LOG is not set.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Config comes first so logging knows where to write.
    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting {}.", banner());

    // --- Persistence ---
    let pool = db::connect(&server_config.database_url).await?;
    let user_store = Arc::new(SqliteUserStore::new(pool.clone()));
    let audit_store = Arc::new(SqliteAuditStore::new(pool));

    provision_default_accounts(
        user_store.as_ref(),
        server_config.admin_password.as_deref(),
        server_config.user_password.as_deref(),
        server_config.bcrypt_cost,
    )
    .await?;

    // --- Container engine ---
    let runtime = Arc::new(
        DockerRuntime::connect(
            server_config.docker_host.as_deref(),
            server_config.docker_api_version.as_deref(),
            server_config.runtime_timeout(),
        )
        .inspect_err(|e| error!(error = %e, "Failed to set up the container engine client."))?,
    );

    // --- Services ---
    let limiter = Arc::new(LoginRateLimiter::new(
        server_config.login_max_attempts,
        TimeDelta::seconds(server_config.login_window_secs),
    ));
    let authenticator =
        Arc::new(Authenticator::new(user_store, limiter.clone(), server_config.bcrypt_cost).await?);
    let session_keys = Arc::new(SessionKeys::new(&server_config.secret_key));
    let audit_logger = Arc::new(AuditLogger::new(audit_store, server_config.audit_timeout()));
    let dispatcher = GatewayDispatcher::new(
        runtime,
        Arc::new(UnconfiguredHostServices),
        audit_logger,
        server_config.runtime_timeout(),
    );

    // --- Housekeeping: idle rate-limit windows and expired revocations ---
    let limiter_for_sweep = limiter.clone();
    let keys_for_sweep = session_keys.clone();
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(HOUSEKEEPING_INTERVAL_SECS));
        info!("Housekeeping task started.");

        loop {
            interval.tick().await;
            let now = Utc::now();
            let windows = limiter_for_sweep.sweep(now);
            let revocations = keys_for_sweep.purge_revoked(now);
            if windows > 0 || revocations > 0 {
                info!(windows, revocations, "Housekeeping removed stale entries.");
            }
        }
    });

    let app = web::create_axum_router(
        dispatcher,
        authenticator,
        session_keys,
        server_config.clone(),
    );

    let addr: SocketAddr = server_config.listen_addr.parse()?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_keepalive(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    info!(address = %addr, "HTTP server listening.");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(Box::new)?;

    info!("Server stopped.");
    Ok(())
}
