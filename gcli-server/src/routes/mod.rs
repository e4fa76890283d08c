//! HTTP surface: OpenAI-compatible `/v1`, Gemini-native `/v1beta`, and `/admin`.

mod admin;
mod gemini;
mod openai;


use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use std::convert::Infallible;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{require_admin, require_api_key};
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/v1/models", get(openai::list_models))
        .route("/v1/chat/completions", post(openai::chat_completions))
        .route("/v1beta/models", get(gemini::list_models))
        .route("/v1beta/models/:model_action", post(gemini::model_action))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    let admin = Router::new()
        .route("/admin/credentials", get(admin::list_credentials).post(admin::import_credential))
        .route("/admin/credentials/:id", delete(admin::delete_credential))
        .route("/admin/credentials/:id/enable", post(admin::enable_credential))
        .route("/admin/credentials/:id/disable", post(admin::disable_credential))
        .route("/admin/reload", post(admin::reload))
        .route("/admin/errors", get(admin::recent_errors))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .merge(admin)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "credentials": state.pool().len(),
        })),
    )
}

/// Wrap an SSE byte stream in a `text/event-stream` response.
pub(crate) fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
