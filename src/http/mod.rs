//! HTTP surface
//!
//! Thin axum handlers over the services. Caller identity arrives already
//! verified in the `x-actor-id` and `x-actor-role` headers.

mod analytics;
mod orders;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::ValidationErrors;

use crate::app::AppState;
use crate::domain::aggregates::{Actor, UserRole};
use crate::BackofficeError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "marketplace-backoffice"})) }))
        .route("/api/v1/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/status", patch(orders::transition_status))
        .route("/api/v1/orders/:id/payment", patch(orders::update_payment))
        .route("/api/v1/orders/:id/return", post(orders::request_return).patch(orders::process_return))
        .route("/api/v1/analytics/overview", get(analytics::overview))
        .route("/api/v1/analytics/range", get(analytics::range))
        .route("/api/v1/analytics/revenue", get(analytics::revenue))
        .route("/api/v1/analytics/users", get(analytics::users))
        .route("/api/v1/analytics/top-products", get(analytics::top_products))
        .route("/api/v1/analytics/snapshots", get(analytics::snapshots))
        .route("/api/v1/analytics/recompute", post(analytics::recompute))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: u64, pub page: u32 }

fn status_of(err: &BackofficeError) -> StatusCode {
    match err {
        BackofficeError::NotFound { .. } => StatusCode::NOT_FOUND,
        BackofficeError::InvalidTransition { .. } | BackofficeError::InvalidState(_) | BackofficeError::Conflict(_) => StatusCode::CONFLICT,
        BackofficeError::Validation(_) => StatusCode::BAD_REQUEST,
        BackofficeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        BackofficeError::Forbidden(_) => StatusCode::FORBIDDEN,
        BackofficeError::RecomputeFailure { .. } | BackofficeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for BackofficeError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorEnvelope<'a> { error: ErrorBody<'a> }

        #[derive(Serialize)]
        struct ErrorBody<'a> { code: &'a str, message: String }

        let status = status_of(&self);
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorEnvelope { error: ErrorBody { code: self.code(), message: self.to_string() } };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationErrors> for BackofficeError {
    fn from(errors: ValidationErrors) -> Self { Self::Validation(errors.to_string()) }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = BackofficeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts.headers.get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| BackofficeError::Unauthorized(format!("missing {name} header")))
        };
        let id = header(ACTOR_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| BackofficeError::Unauthorized(format!("malformed {ACTOR_ID_HEADER} header")))?;
        let role = header(ACTOR_ROLE_HEADER)?
            .parse::<UserRole>()
            .map_err(BackofficeError::Unauthorized)?;
        Ok(Actor::new(id, role))
    }
}

fn require_admin(actor: &Actor) -> crate::Result<()> {
    if actor.is_admin() { Ok(()) } else { Err(BackofficeError::Forbidden("admin role required".into())) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notify::LogNotifier;
    use crate::store::Stores;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    pub(super) fn test_app() -> (Router, Stores) {
        let config = Config::from_lookup(|_| None).unwrap();
        let stores = Stores::in_memory();
        let state = AppState::new(&config, stores.clone(), Arc::new(LogNotifier));
        (router(state), stores)
    }

    pub(super) async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app();
        let response = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_actor_is_unauthorized() {
        let (app, _) = test_app();
        let response = app.oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(&BackofficeError::not_found("order", 1)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(&BackofficeError::InvalidState("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(&BackofficeError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&BackofficeError::Forbidden("x".into())), StatusCode::FORBIDDEN);
    }
}
