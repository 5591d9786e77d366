use std::rc::Rc;
use std::time::{Duration, Instant};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder,
};

/// Path label for requests that match no route
const UNMATCHED_PATH: &str = "unmatched";

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "inference_gateway_http_requests_total",
            "Total HTTP requests handled by inference-gateway",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create inference_gateway_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register inference_gateway_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "inference_gateway_http_request_duration_seconds",
            "HTTP request latency for inference-gateway",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path", "status"],
    )
    .expect("failed to create inference_gateway_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register inference_gateway_http_request_duration_seconds");
    histogram
});

static RANKINGS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "inference_gateway_rankings_total",
            "Ranking engine invocations by mode and outcome",
        ),
        &["mode", "outcome"],
    )
    .expect("failed to create inference_gateway_rankings_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register inference_gateway_rankings_total");
    counter
});

static INFERENCE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "inference_gateway_inference_duration_seconds",
            "End-to-end ranking latency including catalog lookup",
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["mode"],
    )
    .expect("failed to create inference_gateway_inference_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register inference_gateway_inference_duration_seconds");
    histogram
});

static MODEL_LOADED: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "inference_gateway_model_loaded",
        "1 when a model is published and serving, 0 otherwise",
    )
    .expect("failed to create inference_gateway_model_loaded");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register inference_gateway_model_loaded");
    gauge
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

pub fn observe_inference(mode: &str, outcome: &str, elapsed: Duration) {
    RANKINGS_TOTAL.with_label_values(&[mode, outcome]).inc();
    INFERENCE_DURATION_SECONDS
        .with_label_values(&[mode])
        .observe(elapsed.as_secs_f64());
}

pub fn set_model_loaded(loaded: bool) {
    MODEL_LOADED.set(i64::from(loaded));
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        // Route pattern keeps label cardinality bounded (no raw ids, no scanner paths)
        let path = req
            .match_pattern()
            .unwrap_or_else(|| UNMATCHED_PATH.to_string());
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let result = service.call(req).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(response) => {
                    observe_http_request(&method, &path, response.status().as_u16(), elapsed);
                }
                Err(_) => {
                    observe_http_request(&method, &path, 500, elapsed);
                }
            }
            result
        })
    }
}
