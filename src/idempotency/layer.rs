use crate::api::routes::AppState;
use crate::error::{AppError, ErrorCode, Result};
use crate::idempotency::store::{
    advisory_lock_key, request_fingerprint, AdvisoryLock, IdempotencyRecord, IdempotencyStore,
};
use crate::observability::get_metrics;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

const MAX_KEY_LENGTH: usize = 255;
const BODY_LIMIT: usize = 1024 * 1024;

/// HTTP-layer idempotency for the money-creating POSTs. Sub-resource POSTs
/// (freeze, reverse, ...) are out of scope.
fn in_scope(method: &Method, path: &str) -> bool {
    method == Method::POST && matches!(path, "/accounts" | "/transfers")
}

pub async fn idempotency_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !in_scope(request.method(), request.uri().path()) {
        return next.run(request).await;
    }
    match handle(state, request, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle(state: AppState, request: Request, next: Next) -> Result<Response> {
    let key = match request.headers().get(IDEMPOTENCY_KEY_HEADER) {
        None => {
            return Err(AppError::domain(
                ErrorCode::IdempotencyKeyRequired,
                "the X-Idempotency-Key header is required",
            ));
        }
        Some(value) => value
            .to_str()
            .map_err(|_| {
                AppError::domain(
                    ErrorCode::InvalidIdempotencyKey,
                    "idempotency key must be printable ASCII",
                )
            })?
            .to_string(),
    };
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(AppError::domain(
            ErrorCode::InvalidIdempotencyKey,
            format!("idempotency key must be 1-{} characters", MAX_KEY_LENGTH),
        ));
    }

    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|_| AppError::domain(ErrorCode::ValidationError, "request body too large"))?;
    let fingerprint = request_fingerprint(parts.method.as_str(), parts.uri.path(), &body_bytes);

    let store = IdempotencyStore::new(state.pool.clone());

    // First look without the lock: the common replay returns straight from
    // the cache.
    if let Some(record) = check_record(&store, &key, &fingerprint).await? {
        get_metrics().record_idempotency_replay();
        return Ok(replay(&record));
    }

    let lock = AdvisoryLock::acquire(
        &state.pool,
        advisory_lock_key(&key),
        state.idempotency.lock_timeout(),
    )
    .await?
    .ok_or_else(|| {
        AppError::domain(
            ErrorCode::IdempotencyLockTimeout,
            "another request with this idempotency key is in flight",
        )
    })?;

    // Re-check under the lock: a concurrent request may have written the
    // record while we waited.
    let rechecked = match check_record(&store, &key, &fingerprint).await {
        Ok(record) => record,
        Err(err) => {
            release_quietly(lock).await;
            return Err(err);
        }
    };
    if let Some(record) = rechecked {
        release_quietly(lock).await;
        get_metrics().record_idempotency_replay();
        return Ok(replay(&record));
    }

    let request = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let response_bytes = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(err) => {
            release_quietly(lock).await;
            return Err(AppError::Internal(anyhow::anyhow!(
                "failed to buffer response body: {}",
                err
            )));
        }
    };

    // Cache every settled outcome, but never a 5xx: a retry after an
    // infrastructure failure must reach the handler and the DB-level key.
    if parts.status.as_u16() < 500 {
        let body_json: serde_json::Value =
            serde_json::from_slice(&response_bytes).unwrap_or(serde_json::Value::Null);
        let record = IdempotencyRecord::new(
            key,
            fingerprint,
            parts.status.as_u16(),
            body_json,
            state.idempotency.ttl_seconds,
        );
        if let Err(err) = store.save(&record).await {
            warn!(error = %err, "failed to persist idempotency record");
        }
    }

    release_quietly(lock).await;
    Ok(Response::from_parts(parts, Body::from(response_bytes)))
}

async fn check_record(
    store: &IdempotencyStore,
    key: &str,
    fingerprint: &str,
) -> Result<Option<IdempotencyRecord>> {
    match store.find_by_key(key).await? {
        None => Ok(None),
        Some(record) if record.request_hash == fingerprint => Ok(Some(record)),
        Some(_) => Err(AppError::domain(
            ErrorCode::IdempotencyKeyReuse,
            "idempotency key was already used with a different request",
        )),
    }
}

fn replay(record: &IdempotencyRecord) -> Response {
    let status =
        StatusCode::from_u16(record.response_status as u16).unwrap_or(StatusCode::OK);
    let body = serde_json::to_vec(&record.response_body).unwrap_or_default();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

async fn release_quietly(lock: AdvisoryLock) {
    if let Err(err) = lock.release().await {
        warn!(error = %err, "failed to release idempotency advisory lock");
    }
}
