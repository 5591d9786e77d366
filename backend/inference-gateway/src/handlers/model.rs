use actix_web::{get, post, web, HttpResponse};
use tracing::{error, info};

use crate::error::{GatewayError, Result, ValidationError};
use crate::models::ReloadRequest;
use crate::services::GatewayService;

/// GET /api/v1/model
#[get("/model")]
pub async fn model_info(gateway: web::Data<GatewayService>) -> HttpResponse {
    HttpResponse::Ok().json(gateway.model_info())
}

/// POST /api/v1/model/reload
/// An empty body reloads from the configured model path.
#[post("/model/reload")]
pub async fn reload_model(
    body: web::Bytes,
    gateway: web::Data<GatewayService>,
) -> Result<HttpResponse> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ReloadRequest::default()
    } else {
        serde_json::from_slice::<ReloadRequest>(&body)
            .map_err(|e| GatewayError::from(ValidationError::Malformed(e.to_string())))?
    };

    match gateway.reload_model(request.path.as_deref()).await {
        Ok(info) => {
            info!(version = ?info.version, "Model reloaded");
            Ok(HttpResponse::Ok().json(info))
        }
        Err(err) => {
            error!(error = %err, "Model reload failed");
            Err(err)
        }
    }
}
