//! Tower middleware, grounded on `vex-api::middleware`: request id,
//! tracing span, security headers, CORS, body-limit, timeout, and bearer
//! auth. The per-request ingestion rate limit (spec §4.3, dual per-key/
//! per-org counters) lives in `routes::ingest` instead of here, since it
//! needs the parsed batch size and the key's plan tier, not just the
//! request line.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::AppState;

const PUBLIC_PATHS: &[&str] = &["/health", "/api-docs", "/swagger-ui"];

/// Resolves the bearer API key into an `AuthContext` and inserts it into
/// request extensions for downstream handlers. Public paths (health
/// check, OpenAPI docs) and the OTLP receiver (which has its own,
/// optional bearer check per spec §6) bypass this middleware.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path();
    if PUBLIC_PATHS.iter().any(|p| path.starts_with(p)) || path.starts_with("/v1/") {
        return Ok(next.run(request).await);
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let ctx = authenticate(&state.api_keys(), header_value).await?;
    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}

pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let tenant_id = request
        .extensions()
        .get::<crate::auth::AuthContext>()
        .map(|c| c.tenant_id.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let span = tracing::info_span!(
        "http_request",
        method = %method,
        path = %path,
        request_id = %request_id,
        tenant_id = %tenant_id,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let response = {
        let _enter = span.enter();
        next.run(request).await
    };

    let latency = start.elapsed();
    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        latency_ms = %latency.as_millis(),
        tenant_id = %tenant_id,
        "request completed"
    );

    response
}

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    response.headers_mut().insert("X-Request-ID", request_id.parse().unwrap());
    response
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert(
        "Content-Security-Policy",
        "default-src 'self'; frame-ancestors 'none'".parse().unwrap(),
    );
    headers.insert("Referrer-Policy", "strict-origin-when-cross-origin".parse().unwrap());

    response
}

/// Reads allowed origins from `AGENTLENS_CORS_ORIGINS` (comma-separated);
/// falls back to a restrictive same-origin default.
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, CorsLayer};

    let origins = std::env::var("AGENTLENS_CORS_ORIGINS").ok();
    let allow_origin = match origins {
        Some(s) if !s.is_empty() => {
            let parsed: Vec<axum::http::HeaderValue> =
                s.split(',').filter_map(|o| o.trim().parse().ok()).collect();
            if parsed.is_empty() {
                tracing::warn!("AGENTLENS_CORS_ORIGINS set but contained no valid origins");
                AllowOrigin::exact("https://localhost".parse().unwrap())
            } else {
                AllowOrigin::list(parsed)
            }
        }
        _ => AllowOrigin::exact("https://localhost".parse().unwrap()),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600))
}

#[allow(deprecated)]
pub fn timeout_layer(duration: std::time::Duration) -> tower_http::timeout::TimeoutLayer {
    tower_http::timeout::TimeoutLayer::new(duration)
}

pub fn body_limit_layer(limit: usize) -> tower_http::limit::RequestBodyLimitLayer {
    tower_http::limit::RequestBodyLimitLayer::new(limit)
}

#[cfg(test)]
mod tests {
    #[test]
    fn request_ids_are_unique() {
        let a = uuid::Uuid::new_v4().to_string();
        let b = uuid::Uuid::new_v4().to_string();
        assert_ne!(a, b);
    }
}
