use anyhow::Result;
use axum::serve;
use relay_core::{config::AppConfig, runtime::RelayRuntime};
use server::router::{self, AppState};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATES: &str = "relay_core={lvl},server={lvl},tests={lvl}";

fn crate_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("warn,{}", CRATES.replace("{lvl}", level)))
}

/// Installs the global subscriber. `RUST_LOG=debug|trace` scopes the level to the relay crates;
/// any other `RUST_LOG` value is used verbatim, and without it `logging.level` applies.
fn init_logging(config: &AppConfig) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(level) if level == "debug" || level == "trace" => crate_filter(&level),
        Ok(_) => EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| crate_filter("info")),
        Err(_) => crate_filter(&config.logging.level),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!("Starting block explorer relay");
    debug!(
        upstream = %config.upstream.url,
        max_in_flight = config.upstream.max_in_flight,
        window_size = config.lifecycle.window_size,
        push_notifications = config.lifecycle.push_notifications,
        "Configuration loaded"
    );

    let addr: SocketAddr =
        config.socket_addr().map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;

    let mut runtime = RelayRuntime::builder().with_config(config.clone()).build()?;
    if let Err(e) = runtime.start().await {
        error!(error = %e, "Startup failed");
        runtime.shutdown().await;
        return Err(e.into());
    }

    let app = router::create_app(AppState::from_runtime(&runtime), &config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Relay listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    runtime.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
