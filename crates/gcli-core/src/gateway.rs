//! One logical request end to end: dispatch, then shape the response per the
//! requested stream mode.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use gcli_types::models::config::StreamConfig;
use gcli_types::{GatewayError, OwnerScope};

use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::pool::CredentialPool;
use crate::stream::{
    anti_truncation_stream, fake_stream, real_stream, AntiTruncationConfig, ChunkStream,
    ContinuationSource, FakeStreamConfig, StreamItem, StreamMode,
};
use crate::translate::gemini::unwrap_response;
use crate::translate::{list_models, ModelDirectives};
use crate::upstream::{BackendBody, ByteStream};

pub enum GatewayOutput {
    /// Unwrapped Gemini `GenerateContentResponse`
    Complete(Value),
    Stream(ChunkStream),
}

pub struct Gateway {
    dispatcher: Arc<Dispatcher>,
    stream_config: StreamConfig,
    base_models: Vec<String>,
}

impl Gateway {
    pub fn new(dispatcher: Arc<Dispatcher>, stream_config: StreamConfig, base_models: Vec<String>) -> Self {
        Self { dispatcher, stream_config, base_models }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        self.dispatcher.pool()
    }

    /// Every advertised model id including directive variants.
    pub fn list_models(&self) -> Vec<String> {
        list_models(&self.base_models)
    }

    /// Run a translated Gemini request for `scope`.
    ///
    /// Failures before any output (including pool exhaustion) are returned as
    /// `Err`; failures after a stream started arrive as [`StreamItem::Error`].
    /// A fake stream counts as started once its first keep-alive is due.
    pub async fn generate(
        &self,
        scope: &OwnerScope,
        directives: &ModelDirectives,
        request: Value,
        stream: bool,
    ) -> Result<GatewayOutput, GatewayError> {
        let dispatch = DispatchRequest {
            scope: scope.clone(),
            model: directives.base_model.clone(),
            body: request,
            stream: stream && directives.stream_mode != StreamMode::Fake,
        };

        if !stream {
            let response = self.dispatcher.execute(&dispatch).await?;
            return Ok(GatewayOutput::Complete(read_json(response.body).await?));
        }

        info!("[Gateway] {} stream for {} ({})", stream_label(directives.stream_mode), dispatch.model, scope);
        match directives.stream_mode {
            StreamMode::Fake => {
                let dispatcher = self.dispatcher.clone();
                let response = async move {
                    let response = dispatcher.execute(&dispatch).await?;
                    read_json(response.body).await
                }
                .boxed();
                let mut stream = fake_stream(response, FakeStreamConfig::from(&self.stream_config));
                // Nothing is sent until the first item, so an early failure still gets a status.
                match stream.next().await {
                    Some(StreamItem::Error(e)) => Err(e),
                    Some(first) => Ok(GatewayOutput::Stream(
                        futures::stream::once(async move { first }).chain(stream).boxed(),
                    )),
                    None => Ok(GatewayOutput::Stream(stream)),
                }
            },
            StreamMode::Real => {
                let response = self.dispatcher.execute(&dispatch).await?;
                Ok(GatewayOutput::Stream(real_stream(into_byte_stream(response.body))))
            },
            StreamMode::AntiTruncation => {
                let response = self.dispatcher.execute(&dispatch).await?;
                let first = real_stream(into_byte_stream(response.body));
                let source = Arc::new(DispatchContinuation {
                    dispatcher: self.dispatcher.clone(),
                    scope: dispatch.scope,
                    model: dispatch.model,
                    base_request: dispatch.body,
                    prompt: self.stream_config.continuation_prompt.clone(),
                });
                Ok(GatewayOutput::Stream(anti_truncation_stream(
                    first,
                    source,
                    AntiTruncationConfig::from(&self.stream_config),
                )))
            },
        }
    }
}

fn stream_label(mode: StreamMode) -> &'static str {
    match mode {
        StreamMode::Real => "Real",
        StreamMode::Fake => "Fake",
        StreamMode::AntiTruncation => "Anti-truncation",
    }
}

async fn read_json(body: BackendBody) -> Result<Value, GatewayError> {
    let bytes = match body {
        BackendBody::Full(bytes) => bytes,
        BackendBody::Stream(mut stream) => {
            let mut buf = Vec::new();
            while let Some(chunk) = stream.next().await {
                buf.extend_from_slice(&chunk?);
            }
            buf.into()
        },
    };
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| GatewayError::Transient {
        status: None,
        message: format!("Unparsable upstream response: {}", e),
    })?;
    Ok(unwrap_response(value))
}

fn into_byte_stream(body: BackendBody) -> ByteStream {
    match body {
        BackendBody::Stream(stream) => stream,
        BackendBody::Full(bytes) => futures::stream::once(async move { Ok(bytes) }).boxed(),
    }
}

/// Original contents, then the text delivered so far as a `model` turn, then the
/// continuation prompt as a `user` turn.
pub fn continuation_request(base: &Value, delivered: &str, prompt: &str) -> Value {
    let mut request = base.clone();
    if !request.get("contents").is_some_and(Value::is_array) {
        request["contents"] = json!([]);
    }
    if let Some(contents) = request.get_mut("contents").and_then(Value::as_array_mut) {
        contents.push(json!({"role": "model", "parts": [{"text": delivered}]}));
        contents.push(json!({"role": "user", "parts": [{"text": prompt}]}));
    }
    request
}

/// Continuations go through the dispatcher like any request, so they rotate
/// credentials and respect the retry ceiling.
struct DispatchContinuation {
    dispatcher: Arc<Dispatcher>,
    scope: OwnerScope,
    model: String,
    base_request: Value,
    prompt: String,
}

#[async_trait]
impl ContinuationSource for DispatchContinuation {
    async fn open(&self, delivered_text: &str) -> Result<ChunkStream, GatewayError> {
        debug!(
            "[Gateway] Opening continuation for {} after {} chars",
            self.model,
            delivered_text.chars().count()
        );
        let request = DispatchRequest {
            scope: self.scope.clone(),
            model: self.model.clone(),
            body: continuation_request(&self.base_request, delivered_text, &self.prompt),
            stream: true,
        };
        let response = self.dispatcher.execute(&request).await?;
        Ok(real_stream(into_byte_stream(response.body)))
    }
}
