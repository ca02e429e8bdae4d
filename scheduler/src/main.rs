// Scheduler daemon entry point
//
// Startup order: configuration, observability, engine, job registration
// and schedule reconciliation, then the run loop and the management API.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod handlers;
mod routes;
mod state;

use common::config::Settings;
use common::engine::{EngineConfig, InMemoryEngine, SchedulerEngine};
use common::jobs::system_jobs;
use common::management::SchedulerAdmin;
use common::models::TriggerSpec;
use common::reconcile::reconcile;
use common::schedule::load_schedule;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scheduler=info,common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting scheduler daemon");

    // Load configuration
    let settings = Settings::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    // Install the Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    // Create the in-memory scheduling engine
    let engine = Arc::new(InMemoryEngine::new(EngineConfig {
        tick_interval_ms: settings.engine.tick_interval_ms,
        misfire_threshold_seconds: settings.engine.misfire_threshold_seconds,
    }));
    info!("Scheduling engine created");

    // Compile the declared schedule
    let triggers = compile_system_schedule(&settings)?;

    // Register jobs and declared triggers with the engine
    let report = reconcile(
        system_jobs(),
        triggers,
        engine.as_ref() as &dyn SchedulerEngine,
    )
    .await
    .context("Startup reconciliation failed")?;
    info!(
        jobs_registered = report.jobs_registered,
        triggers_added = report.triggers_added,
        "Startup reconciliation complete"
    );

    // Start the firing loop
    let engine_for_loop = Arc::clone(&engine);
    let run_loop = tokio::spawn(async move {
        engine_for_loop.start().await;
    });

    // Serve the management API
    let admin = SchedulerAdmin::new(Arc::clone(&engine) as Arc<dyn SchedulerEngine>);
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let app = routes::create_router(AppState::new(admin, settings, metrics_handle));

    info!(addr = %addr, "Starting management API");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Wind down the engine once the API has drained
    engine.stop();
    run_loop.await?;

    info!("Scheduler daemon stopped");
    Ok(())
}

/// Compile the schedule file named by configuration.
///
/// An unconfigured path is logged and treated as "no declared schedule";
/// a configured path that cannot be loaded or parsed aborts startup.
fn compile_system_schedule(settings: &Settings) -> Result<Vec<TriggerSpec>> {
    match &settings.schedule.system_file {
        None => {
            warn!("no system schedule file configured (schedule.system_file)");
            Ok(Vec::new())
        }
        Some(path) => {
            let compiler = load_schedule(path)?;
            let triggers = compiler.compile()?;
            info!(
                path = %compiler.path(),
                triggers = triggers.len(),
                "system schedule compiled"
            );
            Ok(triggers)
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
}
