/// Recommendation API Handlers
///
/// HTTP endpoints for personalized and item-to-item recommendations
use actix_web::{get, post, web, HttpResponse};
use tracing::debug;

use crate::error::Result;
use crate::models::{LimitQuery, RawBatchRequest, RawRecommendationRequest};
use crate::services::GatewayService;

/// POST /api/v1/recommend
#[post("/recommend")]
pub async fn recommend(
    body: web::Json<RawRecommendationRequest>,
    gateway: web::Data<GatewayService>,
) -> Result<HttpResponse> {
    let response = gateway.recommend(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/v1/recommend/{subject_id}
/// Same pipeline as the POST form with no exclusions or context
#[get("/recommend/{subject_id}")]
pub async fn recommend_for_subject(
    path: web::Path<String>,
    query: web::Query<LimitQuery>,
    gateway: web::Data<GatewayService>,
) -> Result<HttpResponse> {
    let raw = RawRecommendationRequest {
        subject_id: Some(path.into_inner()),
        result_limit: query.result_limit,
        ..Default::default()
    };

    let response = gateway.recommend(raw).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/v1/batch-recommend
/// Per-subject failures are reported inline; the request itself still succeeds
#[post("/batch-recommend")]
pub async fn batch_recommend(
    body: web::Json<RawBatchRequest>,
    gateway: web::Data<GatewayService>,
) -> Result<HttpResponse> {
    let response = gateway.batch_recommend(body.into_inner()).await?;
    debug!(
        succeeded = response.succeeded,
        failed = response.failed,
        "Batch recommendations served"
    );
    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/v1/similar/{item_id}
#[get("/similar/{item_id}")]
pub async fn similar_items(
    path: web::Path<String>,
    query: web::Query<LimitQuery>,
    gateway: web::Data<GatewayService>,
) -> Result<HttpResponse> {
    let response = gateway
        .similar(&path.into_inner(), query.result_limit)
        .await?;
    Ok(HttpResponse::Ok().json(response))
}
