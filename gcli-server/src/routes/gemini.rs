use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::convert::Infallible;
use tracing::info;

use gcli_core::stream::sse::{data_event, error_event, KEEPALIVE};
use gcli_core::stream::ChunkStream;
use gcli_core::translate::gemini::{build_native_request, model_list};
use gcli_core::{GatewayOutput, ModelDirectives, StreamItem};

use super::sse_response;
use crate::auth::Caller;
use crate::error::{ApiError, Dialect};
use crate::state::AppState;

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(model_list(&state.gateway().list_models()))
}

/// `POST /v1beta/models/{model}:{generateContent|streamGenerateContent}`
pub async fn model_action(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(model_action): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some((model, method)) = model_action.rsplit_once(':') else {
        return ApiError::invalid_request(Dialect::Google, format!("Missing method in '{}'", model_action))
            .into_response();
    };
    let stream = match method {
        "generateContent" => false,
        "streamGenerateContent" => true,
        other => {
            return ApiError::invalid_request(Dialect::Google, format!("Unsupported method: {}", other))
                .into_response()
        },
    };
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return ApiError::invalid_request(Dialect::Google, rejection.body_text()).into_response(),
    };
    if !payload.get("contents").and_then(Value::as_array).is_some_and(|c| !c.is_empty()) {
        return ApiError::invalid_request(Dialect::Google, "contents must be a non-empty array").into_response();
    }

    let directives = ModelDirectives::parse(model);
    info!("[Gemini] {}:{} for {}", model, method, caller.scope);
    let request = build_native_request(&payload, &directives);

    match state.gateway().generate(&caller.scope, &directives, request, stream).await {
        Ok(GatewayOutput::Complete(response)) => Json(response).into_response(),
        Ok(GatewayOutput::Stream(chunks)) => sse_response(chunk_events(chunks)),
        Err(e) => ApiError::google(e).into_response(),
    }
}

fn chunk_events(mut chunks: ChunkStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(item) = chunks.next().await {
            match item {
                StreamItem::Chunk(chunk) => yield Ok(data_event(&chunk)),
                StreamItem::KeepAlive => yield Ok(Bytes::from_static(KEEPALIVE.as_bytes())),
                StreamItem::Error(e) => {
                    tracing::warn!("[Gemini] Stream failed: {}", e);
                    yield Ok(error_event(&e));
                    break;
                },
            }
        }
    }
}
