use crate::api::routes::AppState;
use crate::error::{AppError, ErrorCode};
use crate::observability::get_metrics;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use redis::AsyncCommands;
use tracing::{warn, Instrument};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

const MAX_CORRELATION_ID_LENGTH: usize = 128;

/// Correlation id carried through the request extensions.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

/// Printable-ASCII only, capped length. Anything else is dropped and a
/// server-generated id takes over.
pub fn sanitize_correlation_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_graphic())
        .take(MAX_CORRELATION_ID_LENGTH)
        .collect()
}

/// Accepts or generates the correlation id, spans the request with it, and
/// echoes it on the response.
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(sanitize_correlation_id)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(CorrelationId(id.clone()));
    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %request.method(),
        path = %request.uri().path()
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

/// Strict security headers on every response.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn has_body(request: &Request) -> bool {
    match request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
    {
        Some(length) => length > 0,
        None => request.headers().contains_key(header::TRANSFER_ENCODING),
    }
}

/// Mutating requests that carry a body must declare application/json.
pub async fn require_json(request: Request, next: Next) -> Response {
    let method = request.method();
    let mutating = method == Method::POST || method == Method::PUT || method == Method::PATCH;
    if mutating && has_body(&request) {
        let is_json = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .split(';')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .eq_ignore_ascii_case("application/json")
            })
            .unwrap_or(false);
        if !is_json {
            return AppError::domain(
                ErrorCode::UnsupportedMediaType,
                "requests with a body must use application/json",
            )
            .into_response();
        }
    }
    next.run(request).await
}

/// Fixed-window limiter backed by Redis. A Redis outage logs a warning and
/// fails open; the database stays authoritative and no financial request is
/// blocked by the cache tier.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let limit = state.rate_limit.requests_per_minute;
    if limit > 0 {
        let client_key = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .unwrap_or_else(|| "global".to_string());

        match current_window_count(&state.redis_client, &client_key).await {
            Ok(count) if count > limit => {
                return AppError::domain(ErrorCode::RateLimitExceeded, "rate limit exceeded")
                    .into_response();
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "rate limiter unavailable, failing open");
            }
        }
    }
    next.run(request).await
}

async fn current_window_count(client: &redis::Client, key: &str) -> redis::RedisResult<i64> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let window = chrono::Utc::now().timestamp() / 60;
    let redis_key = format!("rl:{}:{}", key, window);
    let count: i64 = conn.incr(&redis_key, 1).await?;
    if count == 1 {
        let _: bool = conn.expire(&redis_key, 60).await?;
    }
    Ok(count)
}

/// Request counter and latency histogram around the whole stack.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let timer = crate::observability::LatencyTimer::new();

    let response = next.run(request).await;
    get_metrics().record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        timer.elapsed_ms(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_printable_ascii() {
        assert_eq!(sanitize_correlation_id("req-123"), "req-123");
        assert_eq!(sanitize_correlation_id("a b\tc"), "abc");
        assert_eq!(sanitize_correlation_id("id\r\nSet-Cookie:x"), "idSet-Cookie:x");
        assert_eq!(sanitize_correlation_id("héllo"), "hllo");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_correlation_id(&long).len(), MAX_CORRELATION_ID_LENGTH);
    }

    #[test]
    fn test_sanitize_can_empty_out() {
        assert_eq!(sanitize_correlation_id("\u{1F4B8}\u{1F4B8}"), "");
    }
}
