//! Shared-secret authentication for ranking endpoints
//!
//! When an API key is configured, every request must present it in the `X-API-Key`
//! header. With no key configured the gate is open.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::sync::Arc;
use tracing::warn;

use crate::error::GatewayError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// `true` when no credential is expected, otherwise an exact constant-time match.
pub fn check(supplied: Option<&str>, expected: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => supplied
            .map(|supplied| constant_time_eq(supplied.as_bytes(), expected.as_bytes()))
            .unwrap_or(false),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    expected: Option<Arc<str>>,
}

impl AuthGate {
    /// An empty key disables the gate.
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected
                .filter(|key| !key.is_empty())
                .map(|key| Arc::from(key.as_str())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    pub fn check(&self, supplied: Option<&str>) -> bool {
        check(supplied, self.expected.as_deref())
    }
}

/// Middleware applying an [`AuthGate`] to every wrapped route
#[derive(Clone)]
pub struct ApiKeyAuth {
    gate: AuthGate,
}

impl ApiKeyAuth {
    pub fn new(gate: AuthGate) -> Self {
        Self { gate }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthService {
            service,
            gate: self.gate.clone(),
        }))
    }
}

pub struct ApiKeyAuthService<S> {
    service: S,
    gate: AuthGate,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let supplied = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        if !self.gate.check(supplied) {
            warn!(
                path = %req.path(),
                header_present = supplied.is_some(),
                "Rejected request with invalid API key"
            );
            let response = GatewayError::Unauthorized
                .error_response()
                .map_into_right_body();
            let (request, _payload) = req.into_parts();
            return Box::pin(async move { Ok(ServiceResponse::new(request, response)) });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn test_handler() -> HttpResponse {
        HttpResponse::Ok().body("success")
    }

    #[::core::prelude::v1::test]
    fn test_check_without_expected_credential() {
        assert!(check(None, None));
        assert!(check(Some("anything"), None));
    }

    #[::core::prelude::v1::test]
    fn test_check_exact_match() {
        assert!(check(Some("secret123"), Some("secret123")));
        assert!(!check(Some("secret12"), Some("secret123")));
        assert!(!check(Some("secret1234"), Some("secret123")));
        assert!(!check(Some("SECRET123"), Some("secret123")));
        assert!(!check(None, Some("secret123")));
    }

    #[::core::prelude::v1::test]
    fn test_empty_key_disables_gate() {
        let gate = AuthGate::new(Some(String::new()));
        assert!(!gate.is_enabled());
        assert!(gate.check(None));
    }

    #[actix_web::test]
    async fn test_missing_key_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new(AuthGate::new(Some("secret123".to_string()))))
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "unauthorized");
    }

    #[actix_web::test]
    async fn test_valid_key_allows_access() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new(AuthGate::new(Some("secret123".to_string()))))
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header((API_KEY_HEADER, "secret123"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_open_gate_allows_access() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new(AuthGate::default()))
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
}
