use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inference_gateway::config::{Config, LogFormat};
use inference_gateway::handlers;
use inference_gateway::metrics::{self, MetricsMiddleware};
use inference_gateway::middleware::AuthGate;
use inference_gateway::services::{
    Catalog, GatewayService, InMemoryCatalog, ModelHandle, RankingEngine, RequestValidator,
};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.app.log_format);
    info!(env = %config.app.env, "Starting inference-gateway");

    let model = Arc::new(
        ModelHandle::new().with_version_override(config.model.version_override.clone()),
    );

    // A missing model is not fatal: the gateway serves degraded until a reload succeeds
    match model.load(&config.model.path).await {
        Ok(info) => info!(
            path = %config.model.path,
            version = ?info.version,
            "Model loaded"
        ),
        Err(e) => warn!(
            path = %config.model.path,
            error = %e,
            "Model failed to load; serving degraded until reloaded"
        ),
    }
    metrics::set_model_loaded(model.is_ready());

    let mut engine = RankingEngine::new(model.clone()).with_timeouts(
        config.ranking.inference_timeout(),
        config.ranking.catalog_timeout(),
    );

    if let Some(path) = &config.model.catalog_path {
        match InMemoryCatalog::from_path(path).await {
            Ok(catalog) => {
                info!(path = %path, items = catalog.len(), "Catalog loaded");
                let catalog: Arc<dyn Catalog> = Arc::new(catalog);
                engine = engine.with_catalog(catalog);
            }
            Err(e) => {
                error!(path = %path, error = %e, "Failed to load catalog");
                return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
            }
        }
    }

    let validator = RequestValidator::new(
        config.ranking.default_result_limit,
        config.ranking.max_result_limit,
        config.ranking.max_batch_size,
    );

    let gateway = web::Data::new(GatewayService::new(
        validator,
        engine,
        model,
        config.model.path.clone(),
    ));

    let gate = AuthGate::new(config.auth.api_key.clone());
    if gate.is_enabled() {
        info!("API key authentication enabled");
    } else {
        warn!("API_KEY not set; ranking endpoints are unauthenticated");
    }

    let bind_address = config.bind_address();
    let allowed_origins = config.cors.allowed_origins.clone();
    info!("Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in allowed_origins.split(',') {
            let origin = origin.trim();
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else if !origin.is_empty() {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        let gate = gate.clone();
        App::new()
            .app_data(gateway.clone())
            .wrap(cors)
            .wrap(MetricsMiddleware)
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(move |cfg| handlers::configure(cfg, gate))
    })
    .bind(&bind_address)?
    .run()
    .await
}
