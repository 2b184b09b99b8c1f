use crate::infra::{AppState, Registry};
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use lifeline::error::AppError;
use lifeline::payments::{PaymentId, PaymentRequest, PaymentState};
use lifeline::registry::{registry_router, Role, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterUserRequest {
    pub(crate) user_id: String,
    pub(crate) role: Role,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaymentView {
    pub(crate) payment_id: PaymentId,
    #[serde(flatten)]
    pub(crate) state: PaymentState,
}

pub(crate) fn with_service_routes(registry: Arc<Registry>) -> Router {
    registry_router(registry)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/users", post(register_user_endpoint))
        .route("/api/v1/payments", post(submit_payment_endpoint))
        .route("/api/v1/payments/:payment_id", get(payment_status_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Self-service sign-up for donors, recipients and hospitals. Admins come from configuration.
pub(crate) async fn register_user_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Response {
    let user_id = payload.user_id.trim();
    if user_id.is_empty() {
        let body = json!({ "error": "user_id must not be blank" });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
    }
    if payload.role == Role::Admin {
        let body = json!({ "error": "admin accounts are provisioned through APP_ADMIN_IDS" });
        return (StatusCode::FORBIDDEN, Json(body)).into_response();
    }

    let user = UserId::new(user_id);
    if !state.directory.register_new(user.clone(), payload.role) {
        let body = json!({ "error": format!("user '{user}' is already registered") });
        return (StatusCode::CONFLICT, Json(body)).into_response();
    }
    info!(user = %user, role = %payload.role, "user registered");
    let body = json!({ "user_id": user, "role": payload.role });
    (StatusCode::CREATED, Json(body)).into_response()
}

pub(crate) async fn submit_payment_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentView>), AppError> {
    let ticket = state.payments.submit(payload)?;
    let view = PaymentView {
        payment_id: ticket.id(),
        state: ticket.current(),
    };
    Ok((StatusCode::ACCEPTED, Json(view)))
}

pub(crate) async fn payment_status_endpoint(
    Extension(state): Extension<AppState>,
    Path(payment_id): Path<u64>,
) -> Response {
    let payment_id = PaymentId(payment_id);
    match state.payments.status(payment_id) {
        Some(state) => Json(PaymentView { payment_id, state }).into_response(),
        None => {
            let body = json!({ "error": format!("{payment_id} not found") });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}
