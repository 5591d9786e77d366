pub mod model;
pub mod recommendation;

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::error::{GatewayError, ValidationError};
use crate::metrics;
use crate::middleware::{ApiKeyAuth, AuthGate};
use crate::services::gateway::SERVICE_NAME;
use crate::services::GatewayService;

pub use model::{model_info, reload_model};
pub use recommendation::{batch_recommend, recommend, recommend_for_subject, similar_items};

/// GET /health
/// Always 200; an unloaded model is reported as `degraded`
pub async fn health(gateway: web::Data<GatewayService>) -> HttpResponse {
    HttpResponse::Ok().json(gateway.health())
}

/// GET /
pub async fn root(gateway: web::Data<GatewayService>) -> HttpResponse {
    let health = gateway.health();
    HttpResponse::Ok().json(json!({
        "service": SERVICE_NAME,
        "version": health.version,
        "status": health.status,
        "endpoints": {
            "health": "GET /health",
            "metrics": "GET /metrics",
            "recommend": "POST /api/v1/recommend",
            "recommend_for_subject": "GET /api/v1/recommend/{subject_id}",
            "batch_recommend": "POST /api/v1/batch-recommend",
            "similar": "GET /api/v1/similar/{item_id}",
            "model_info": "GET /api/v1/model",
            "reload_model": "POST /api/v1/model/reload",
        }
    }))
}

fn malformed(message: String) -> actix_web::Error {
    GatewayError::from(ValidationError::Malformed(message)).into()
}

/// Register every route. `/api/v1` sits behind the API key gate.
pub fn configure(cfg: &mut web::ServiceConfig, gate: AuthGate) {
    let json = web::JsonConfig::default().error_handler(|err, _req| malformed(err.to_string()));
    let query = web::QueryConfig::default().error_handler(|err, _req| malformed(err.to_string()));
    let path = web::PathConfig::default().error_handler(|err, _req| malformed(err.to_string()));

    cfg.app_data(json)
        .app_data(query)
        .app_data(path)
        .route("/", web::get().to(root))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .service(
            web::scope("/api/v1")
                .wrap(ApiKeyAuth::new(gate))
                .service(recommend)
                .service(recommend_for_subject)
                .service(batch_recommend)
                .service(similar_items)
                .service(model_info)
                .service(reload_model),
        );
}
