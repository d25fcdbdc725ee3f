//! Webhooks Server
//!
//! Hosts the webhook dispatch core behind its HTTP surface:
//! - Static webhooks from the `[[webhooks]]` config entries
//! - Listing and inbound ping routes under the configured namespace
//! - Prometheus metrics at `/metrics`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wh_config::WebhooksConfig;
use wh_core::bootstrap::{ready, register_static_webhooks};
use wh_core::{Webhooks, WebhooksBuilder};

/// Webhooks Server
#[derive(Parser, Debug)]
#[command(name = "wh-server")]
#[command(about = "Event-driven outbound webhooks with an inbound ping endpoint")]
struct Args {
    /// Path to a TOML config file
    #[arg(long, env = "WH_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured listen port
    #[arg(long, env = "WH_PORT")]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long, env = "WH_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting webhooks server");

    let mut config = WebhooksConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;

    let webhooks = Webhooks::factory(Some(WebhooksBuilder::from_config(&config)), false)?;
    register_static_webhooks(&webhooks, &config);

    // A host that cannot finish setup must not keep running half-wired
    if let Err(e) = ready(&webhooks) {
        eprintln!("webhooks: fatal setup error: {}", e);
        std::process::exit(1);
    }

    let app = wh_api::create_router(webhooks.clone(), &config.routes)?
        .merge(metrics_router(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    webhooks.publish(webhooks.init_event(), &[]);
    info!(
        registered = webhooks.registry().len(),
        "Init event published"
    );

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Webhooks server shut down");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn metrics_router(handle: PrometheusHandle) -> Router {
    let handle = Arc::new(handle);
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
