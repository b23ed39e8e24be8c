//! Risk Server - obesity risk prediction and monitoring service
//!
//! Loads the fitted artifacts and the model once, then serves predictions,
//! monitoring reports, health checks and metrics over HTTP.

use anyhow::Result;
use risk_lib::{
    health::ComponentStatus,
    inference::LocalRegistry,
    observability::{ServiceMetrics, StructuredLogger},
    ServiceContext,
};
use risk_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting risk-server");

    let config = ServerConfig::load()?;
    let (settings, server) = config.into_parts();
    info!(
        instance = %server.instance_name,
        port = server.port,
        model_name = %settings.model.model_name,
        experiment_id = %settings.model.experiment_id,
        run_id = %settings.model.run_id,
        "Server configured"
    );

    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new(&server.instance_name);

    let registry = Arc::new(LocalRegistry::new(&settings.model.registry_path));
    let service = match ServiceContext::initialize(settings, registry).await {
        Ok(service) => service,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Service initialization failed");
            return Err(e);
        }
    };

    let model = service.model().model_ref();
    logger.log_model_loaded(&model.model_name, &model.flavor, &model.version);
    metrics.set_model_version(
        &model.version,
        &model.flavor,
        &service.pipeline().version().to_string(),
    );

    for (name, component) in &service.health().components {
        if component.status != ComponentStatus::Healthy {
            warn!(
                component = %name,
                status = ?component.status,
                message = ?component.message,
                "Component not healthy at startup"
            );
        }
    }

    let versions = service.versions();
    logger.log_startup(
        &versions.code_version,
        &versions.model_version,
        service.has_monitoring(),
    );

    let app_state = Arc::new(api::AppState::new(Arc::new(service), metrics, logger.clone()));

    let api_handle = tokio::spawn(api::serve(server.port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server exited"),
                Ok(Err(e)) => {
                    logger.log_shutdown("API server failed");
                    return Err(e);
                }
                Err(e) => {
                    logger.log_shutdown("API server task panicked");
                    return Err(e.into());
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
