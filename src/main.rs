use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod routes;
mod services;

use config::{Config, RateLimitConfig};
use services::init;
use services::rate_limiter::RateLimiter;
use services::tracker::TickReport;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub tracker_enabled: bool,
    pub tracker_report: Arc<RwLock<Option<TickReport>>>,
    pub limiter: Arc<RateLimiter>,
    pub admin_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "match_tracker=debug,tower_http=info".into());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting match tracker {}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let pool = init::init_db(&config).await?;

    // Initialize services
    let (tracker, limiter) = init::build_tracker(&config, pool.clone())?;

    let app_state = Arc::new(AppState {
        db: pool,
        tracker_enabled: config.tracker.enabled,
        tracker_report: tracker.reports(),
        limiter: limiter.clone(),
        admin_token: config.server.admin_token.clone(),
    });
    if app_state.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set, admin routes are unauthenticated");
    }

    // Every supervised task stops when this token fires.
    let cancel = CancellationToken::new();

    let mut bg_handles = init::spawn_background_workers(&config, tracker, cancel.clone());

    #[cfg(unix)]
    bg_handles.push(tokio::spawn(reload_on_sighup(limiter, cancel.clone())));
    #[cfg(not(unix))]
    drop(limiter);

    // Build router
    let app = routes::router(app_state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping background workers");
    cancel.cancel();

    // Give background workers some time to finish their work.
    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );

    bg_handles.push(server);
    let bg_wait = async {
        for h in bg_handles {
            if let Err(e) = h.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
    };
    if tokio::time::timeout(shutdown_wait, bg_wait).await.is_err() {
        tracing::warn!("Background workers did not exit in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to bind SIGTERM: {}", e);
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Re-read the rate limit settings on SIGHUP and swap the limiter's buckets.
#[cfg(unix)]
async fn reload_on_sighup(limiter: Arc<RateLimiter>, cancel: CancellationToken) {
    let mut hup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!("Failed to bind SIGHUP, configuration reload disabled: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = hup.recv() => {
                if received.is_none() {
                    break;
                }
                dotenvy::dotenv_override().ok();
                match RateLimitConfig::from_env() {
                    Ok(rate_limit) => limiter.reload(&rate_limit).await,
                    Err(e) => tracing::warn!("Ignoring invalid rate limit configuration: {}", e),
                }
            }
        }
    }
}
