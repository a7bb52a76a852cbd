use std::{future::Future, sync::Arc};

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::{
    clients::health::HealthChecker,
    dispatcher::Dispatcher,
    error::DispatchError,
    models::{
        health::{ComponentHealth, HealthCheckResponse, HealthStatus},
        notification::{
            BulkNotificationRequest, NotificationIntent, NotificationType, Priority, ProviderType,
        },
        response::{AcceptReceipt, ApiResponse, BulkReceipt, ProvidersResponse},
        validation::{validate_bulk, validate_intent},
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Notify API",
        version = "1.0.0",
        description = "API for sending notifications through multiple providers"
    ),
    paths(health_check, list_providers, send_notification, send_bulk_notifications),
    components(schemas(
        NotificationIntent,
        BulkNotificationRequest,
        NotificationType,
        ProviderType,
        Priority,
        AcceptReceipt,
        BulkReceipt,
        ProvidersResponse,
        HealthCheckResponse,
        ComponentHealth,
        HealthStatus
    )),
    tags(
        (name = "notifications", description = "Queue notifications for delivery"),
        (name = "system", description = "Health and provider availability")
    )
)]
pub struct ApiDoc;

pub struct AppState {
    dispatcher: Arc<Dispatcher>,
    health_checker: HealthChecker,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = Arc::new(AppState {
        health_checker: HealthChecker::new(Arc::clone(&dispatcher)),
        dispatcher,
    });

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/providers", get(list_providers))
        .route("/notifications", post(send_notification))
        .route("/notifications/bulk", post(send_bulk_notifications))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api)
        .route("/docs", get(openapi_document))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

pub async fn run_api_server<F>(
    port: u16,
    dispatcher: Arc<Dispatcher>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(dispatcher);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Notification API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

fn error_response(error: DispatchError) -> Response {
    let status = match &error {
        DispatchError::Validation(_)
        | DispatchError::ProviderUnavailable { .. }
        | DispatchError::NoProviderConfigured(_)
        | DispatchError::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
        DispatchError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    warn!(status = %status, error = %error, "Request failed");

    (
        status,
        Json(ApiResponse::<()>::error(
            error.to_string(),
            "Notification request failed".to_string(),
        )),
    )
        .into_response()
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Broker and providers are usable", body = HealthCheckResponse),
        (status = 503, description = "Broker is down or no provider is operational", body = HealthCheckResponse)
    )
)]
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

#[utoipa::path(
    get,
    path = "/api/v1/providers",
    tag = "system",
    responses(
        (status = 200, description = "Operational providers", body = ProvidersResponse)
    )
)]
async fn list_providers(State(state): State<Arc<AppState>>) -> Response {
    match state.dispatcher.list_available_providers().await {
        Ok(available) => Json(ProvidersResponse { available }).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    tag = "notifications",
    request_body = NotificationIntent,
    responses(
        (status = 202, description = "Notification queued", body = ApiResponse<AcceptReceipt>),
        (status = 400, description = "Invalid notification or provider"),
        (status = 503, description = "Queue unavailable")
    )
)]
async fn send_notification(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NotificationIntent>, JsonRejection>,
) -> Response {
    let Json(intent) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(DispatchError::Validation(rejection.body_text())),
    };

    if let Err(e) = validate_intent(&intent) {
        return error_response(e);
    }

    match state.dispatcher.accept(intent).await {
        Ok(receipt) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(
                receipt,
                "Notification queued".to_string(),
            )),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/bulk",
    tag = "notifications",
    request_body = BulkNotificationRequest,
    responses(
        (status = 202, description = "Notifications queued", body = ApiResponse<BulkReceipt>),
        (status = 400, description = "Invalid batch or item"),
        (status = 503, description = "Queue unavailable")
    )
)]
async fn send_bulk_notifications(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BulkNotificationRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(DispatchError::Validation(rejection.body_text())),
    };

    if let Err(e) = validate_bulk(&request.notifications) {
        return error_response(e);
    }

    match state.dispatcher.accept_bulk(request.notifications).await {
        Ok(receipt) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(
                receipt,
                "Notifications queued".to_string(),
            )),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
