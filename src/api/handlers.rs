use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::requests::{
    CreateAccountRequest, CreateTransferRequest, ListQuery, StatementParams,
};
use crate::api::responses::{
    AccountResponse, ApiResponse, HealthResponse, MovementResponse, PaginatedResponse,
    StatementResponse, TransferResponse,
};
use crate::error::{AppError, DomainError, ErrorCode, Result};
use crate::idempotency::IDEMPOTENCY_KEY_HEADER;
use crate::models::TransferStatus;
use crate::observability::{HealthStatus, ServiceHealth};
use crate::services::{
    AccountService, CreateAccountCommand, InitiateTransferCommand, StatementQuery,
    StatementService, TransferService,
};

use super::routes::AppState;

fn parse_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => Err(AppError::domain(
            ErrorCode::InvalidJson,
            format!("request body is not valid JSON: {}", rejection.body_text()),
        )),
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<TransferStatus>> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse::<TransferStatus>()
            .map(Some)
            .map_err(|_| {
                AppError::domain(
                    ErrorCode::ValidationError,
                    format!(
                        "invalid status '{}'; expected pending, completed, failed or reversed",
                        value
                    ),
                )
            }),
    }
}

/// Accepts RFC 3339 with or without fractional seconds.
fn parse_timestamp(field: &str, raw: Option<&str>) -> Result<DateTime<Utc>> {
    let raw = raw.ok_or_else(|| {
        AppError::domain(
            ErrorCode::ValidationError,
            format!("'{}' is required", field),
        )
    })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| {
            AppError::domain(
                ErrorCode::ValidationError,
                format!("'{}' must be an RFC 3339 timestamp", field),
            )
        })
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// 200 healthy when the database answers, 503 degraded otherwise.
pub async fn health(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let (status, services, uptime_seconds) = match &state.health_checker {
        Some(checker) => {
            let (status, services) = checker.check_all().await;
            (status, services, checker.uptime_seconds())
        }
        None => (
            HealthStatus::Degraded,
            ServiceHealth {
                database: false,
                redis: false,
                kafka: false,
            },
            0,
        ),
    };

    let http_status = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds,
        services,
    };
    (http_status, Json(ApiResponse::success(response)))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

// ============================================================================
// Account handlers
// ============================================================================

pub async fn create_account(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<AccountResponse>>)> {
    let request = parse_body(payload)?;
    if let Err(violations) = request.validate() {
        return Err(AppError::Domain(
            DomainError::validation("request validation failed").with_violations(violations),
        ));
    }

    let account = AccountService::new(state.pool.clone())
        .create(CreateAccountCommand {
            owner_name: request.owner_name,
            currency: request.currency,
            initial_balance: request.initial_balance,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AccountResponse::from(account))),
    ))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AccountResponse>>> {
    let account = AccountService::new(state.pool.clone()).get(id).await?;
    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}

pub async fn freeze_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AccountResponse>>> {
    let account = AccountService::new(state.pool.clone()).freeze(id).await?;
    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}

pub async fn unfreeze_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AccountResponse>>> {
    let account = AccountService::new(state.pool.clone()).unfreeze(id).await?;
    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}

pub async fn close_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AccountResponse>>> {
    let account = AccountService::new(state.pool.clone()).close(id).await?;
    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}

pub async fn list_account_transfers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<TransferResponse>>>> {
    // 404 for unknown accounts instead of an empty page.
    AccountService::new(state.pool.clone()).get(id).await?;

    let status = parse_status(query.status.as_deref())?;
    let (transfers, total) = TransferService::new(state.pool.clone())
        .list_for_account(id, status, query.per_page(), query.offset())
        .await?;

    let items = transfers.into_iter().map(TransferResponse::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        query.page(),
        query.per_page(),
    ))))
}

pub async fn get_statement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<StatementParams>,
) -> Result<Json<ApiResponse<StatementResponse>>> {
    let query = StatementQuery {
        from: parse_timestamp("from", params.from.as_deref())?,
        to: parse_timestamp("to", params.to.as_deref())?,
        page: params.page.unwrap_or(1),
        per_page: params.per_page.unwrap_or(50),
    };

    let statement = StatementService::new(state.pool.clone())
        .statement(id, query)
        .await?;

    Ok(Json(ApiResponse::success(StatementResponse {
        account_id: statement.account_id,
        currency: statement.currency,
        from: statement.from,
        to: statement.to,
        opening_balance: statement.opening_balance,
        closing_balance: statement.closing_balance,
        movements: statement
            .movements
            .into_iter()
            .map(MovementResponse::from)
            .collect(),
        total: statement.total,
        page: statement.page,
        per_page: statement.per_page,
    })))
}

// ============================================================================
// Transfer handlers
// ============================================================================

pub async fn create_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CreateTransferRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<TransferResponse>>)> {
    let request = parse_body(payload)?;
    if let Err(violations) = request.validate() {
        return Err(AppError::Domain(
            DomainError::validation("request validation failed").with_violations(violations),
        ));
    }

    let transfer = TransferService::new(state.pool.clone())
        .initiate(InitiateTransferCommand {
            source_account_id: request.source_account_id,
            destination_account_id: request.destination_account_id,
            amount: request.amount,
            currency: request.currency,
            description: request.description,
            idempotency_key: idempotency_key(&headers),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(TransferResponse::from(transfer))),
    ))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TransferResponse>>> {
    let transfer = TransferService::new(state.pool.clone()).get(id).await?;
    Ok(Json(ApiResponse::success(TransferResponse::from(transfer))))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<TransferResponse>>>> {
    let status = parse_status(query.status.as_deref())?;
    let (transfers, total) = TransferService::new(state.pool.clone())
        .list(status, query.per_page(), query.offset())
        .await?;

    let items = transfers.into_iter().map(TransferResponse::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        query.page(),
        query.per_page(),
    ))))
}

pub async fn reverse_transfer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TransferResponse>>> {
    let transfer = TransferService::new(state.pool.clone()).reverse(id).await?;
    Ok(Json(ApiResponse::success(TransferResponse::from(transfer))))
}
