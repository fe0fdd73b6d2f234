use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use std::sync::Arc;
use tracing::debug;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::types::{AppState, ErrorResponse, RecordRequest, WorkingResponse};
use crate::{
    Decision, EvictionPolicy, FilterConfig, Record, Result, Snapshot,
    UniqueError, UniqueFilter,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        configure_filter,
        process_record,
        get_memory,
        reset_memory,
        get_working,
    ),
    components(
        schemas(
            RecordRequest,
            Decision,
            Snapshot,
            FilterConfig,
            EvictionPolicy,
            WorkingResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "unique-filter", description = "Windowed Deduplication Filter API")
    )
)]
struct ApiDoc;

fn error_response(e: UniqueError) -> Response {
    let status = match e {
        UniqueError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            message: e.to_string(),
        }),
    )
        .into_response()
}

/// Store calls block, so they run on the blocking pool rather than on the
/// async workers.
async fn run_blocking<T, F>(filter: Arc<UniqueFilter>, call: F) -> Result<T>
where
    F: FnOnce(&UniqueFilter) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&filter))
        .await
        .map_err(|e| UniqueError::Storage(format!("Store task failed: {e}")))?
}

/// Check API health
#[utoipa::path(
    get,
    path = "/health",
    tag = "unique-filter",
    responses(
        (status = 200, description = "API is healthy")
    )
)]
async fn health_check() -> impl IntoResponse {
    debug!("Health check");
    StatusCode::OK
}

/// Create or replace a filter's configuration
#[utoipa::path(
    put,
    path = "/filters/{id}",
    tag = "unique-filter",
    params(
        ("id" = String, Path, description = "Filter identifier")
    ),
    request_body = FilterConfig,
    responses(
        (status = 200, description = "Filter configured", body = FilterConfig),
        (status = 422, description = "Invalid configuration", body = ErrorResponse)
    )
)]
async fn configure_filter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(config): Json<FilterConfig>,
) -> Response {
    debug!("Configuring filter {}", &id);
    match state.configure(&id, config).await {
        Ok(filter) => {
            (StatusCode::OK, Json(filter.config().clone())).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Process one record and report whether it is re-emitted
#[utoipa::path(
    post,
    path = "/filters/{id}/records",
    tag = "unique-filter",
    params(
        ("id" = String, Path, description = "Filter identifier")
    ),
    request_body = RecordRequest,
    responses(
        (status = 200, description = "Record processed", body = Decision),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
async fn process_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RecordRequest>,
) -> Response {
    let filter = match state.filter(&id).await {
        Ok(filter) => filter,
        Err(e) => return error_response(e),
    };
    let record = Record::new(request.id, request.payload);
    let result =
        run_blocking(filter, move |filter| filter.process_record(&record)).await;
    match result {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Inspect the fingerprints currently remembered
#[utoipa::path(
    get,
    path = "/filters/{id}/memory",
    tag = "unique-filter",
    params(
        ("id" = String, Path, description = "Filter identifier")
    ),
    responses(
        (status = 200, description = "Current window", body = Snapshot),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
async fn get_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let result = match state.filter(&id).await {
        Ok(filter) => run_blocking(filter, |filter| filter.diagnostics()).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Forget every remembered fingerprint
#[utoipa::path(
    delete,
    path = "/filters/{id}/memory",
    tag = "unique-filter",
    params(
        ("id" = String, Path, description = "Filter identifier")
    ),
    responses(
        (status = 200, description = "State cleared"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
async fn reset_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let result = match state.filter(&id).await {
        Ok(filter) => run_blocking(filter, |filter| filter.reset_state()).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e),
    }
}

/// Report whether the filter emitted recently and without errors
#[utoipa::path(
    get,
    path = "/filters/{id}/working",
    tag = "unique-filter",
    params(
        ("id" = String, Path, description = "Filter identifier")
    ),
    responses(
        (status = 200, description = "Health status", body = WorkingResponse)
    )
)]
async fn get_working(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.filter(&id).await {
        Ok(filter) => (
            StatusCode::OK,
            Json(WorkingResponse {
                working: filter.is_working(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let openapi = ApiDoc::openapi();

    Router::new()
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi),
        )
        .route("/health", get(health_check))
        .route("/filters/{id}", put(configure_filter))
        .route("/filters/{id}/records", post(process_record))
        .route("/filters/{id}/memory", get(get_memory).delete(reset_memory))
        .route("/filters/{id}/working", get(get_working))
        .with_state(state)
}
