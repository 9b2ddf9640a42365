pub mod auth;
pub mod rest;
pub mod websocket;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use crate::context::AppContext;
use crate::error::Error;

/// `/health` and `/metrics` are open; everything else needs the bearer token.
pub fn create_router(ctx: AppContext) -> Router {
    let protected = Router::new()
        .route("/available_exchanges", get(rest::available_exchanges))
        .route("/currency", get(rest::get_currency_info))
        .route("/currency_listener", get(websocket::currency_listener))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), auth::auth_middleware));

    Router::new()
        .route("/health", get(rest::health_check))
        .route("/metrics", get(rest::metrics))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(ctx)
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}
