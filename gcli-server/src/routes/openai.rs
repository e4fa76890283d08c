use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::convert::Infallible;
use tracing::info;

use gcli_core::stream::sse::{data_event, DONE, KEEPALIVE};
use gcli_core::stream::ChunkStream;
use gcli_core::translate::openai::{self, ChunkMapper, OpenAIRequest};
use gcli_core::{GatewayOutput, ModelDirectives, StreamItem};

use super::sse_response;
use crate::auth::Caller;
use crate::error::{openai_error_body, ApiError, Dialect};
use crate::state::AppState;

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(openai::model_list(&state.gateway().list_models()))
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<OpenAIRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ApiError::invalid_request(Dialect::OpenAI, rejection.body_text()).into_response(),
    };
    if request.messages.is_empty() {
        return ApiError::invalid_request(Dialect::OpenAI, "messages must not be empty").into_response();
    }

    let directives = ModelDirectives::parse(&request.model);
    info!("[OpenAI] {} (stream={}) for {}", request.model, request.stream, caller.scope);
    let body = openai::to_gemini(&request, &directives);

    match state.gateway().generate(&caller.scope, &directives, body, request.stream).await {
        Ok(GatewayOutput::Complete(response)) => Json(openai::to_completion(&response, &request.model)).into_response(),
        Ok(GatewayOutput::Stream(chunks)) => sse_response(chunk_events(chunks, request.model)),
        Err(e) => ApiError::openai(e).into_response(),
    }
}

/// `chat.completion.chunk` events, keep-alive comments, then `[DONE]`. A
/// mid-stream failure becomes an error event before `[DONE]`.
fn chunk_events(
    mut chunks: ChunkStream,
    model: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut mapper = ChunkMapper::new(model);
        while let Some(item) = chunks.next().await {
            match item {
                StreamItem::Chunk(chunk) => {
                    if let Some(event) = mapper.map(&chunk) {
                        yield Ok(data_event(&event));
                    }
                },
                StreamItem::KeepAlive => yield Ok(Bytes::from_static(KEEPALIVE.as_bytes())),
                StreamItem::Error(e) => {
                    tracing::warn!("[OpenAI] Stream {} failed: {}", mapper.id(), e);
                    yield Ok(data_event(&openai_error_body(&e)));
                    break;
                },
            }
        }
        yield Ok(Bytes::from_static(DONE.as_bytes()));
    }
}
