//! Kiln Agent
//!
//! HTTP service that runs pipeline jobs in sandboxed containers.
//!
//! Architecture:
//! - Configuration: Load settings from the environment or an `.envrc` file
//! - Runtime: Docker-compatible CLI (podman by default)
//! - Services: Job execution engine and result callbacks
//! - API: Authenticated job submission plus health endpoints

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kiln_agent::api::{self, AppState};
use kiln_agent::config::AgentConfig;
use kiln_agent::podman::PodmanRuntime;
use kiln_agent::runtime::ContainerRuntime;
use kiln_agent::service::{CallbackNotifier, JobEngine};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Kiln Agent v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration, refusing to start without keys
    let config = AgentConfig::from_env().context("Invalid agent configuration")?;
    info!(
        "Loaded configuration: runtime={}, default_image={}, workspace_root={}",
        config.container_runtime,
        config.default_image,
        config.workspace_root.display()
    );

    // Container runtime must be reachable before jobs are accepted
    let runtime = Arc::new(PodmanRuntime::new(config.container_runtime.clone()));
    let version = runtime
        .version()
        .await
        .with_context(|| format!("Container runtime '{}' is not available", runtime.binary()))?;
    info!("Container runtime is available: {}", version);

    let api_key = SecretString::from(config.api_key.expose_secret().to_string());
    let bind_addr = config.bind_addr.clone();
    let notifier = CallbackNotifier::new(config.callback_retries);

    let engine =
        JobEngine::new(Arc::new(config), runtime).context("Failed to initialize job engine")?;
    info!("Job engine initialized");

    let app = api::create_router(AppState::new(Arc::new(engine), notifier, api_key));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Kiln Agent stopped");
    Ok(())
}

/// Initializes logging
///
/// `RUST_LOG` overrides the default filter; `KILN_LOG_FORMAT=json` switches
/// to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kiln_agent=info,tower_http=debug".into());
    let json = std::env::var("KILN_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, finishing in-flight requests");
}
