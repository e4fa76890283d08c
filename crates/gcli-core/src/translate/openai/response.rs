//! Gemini responses → OpenAI `chat.completion` / `chat.completion.chunk`.

use serde_json::{json, Value};

use super::models::*;

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

pub fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

fn tool_call_id(call: &Value) -> String {
    call.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()))
}

/// Gemini finish reason → OpenAI.
pub fn map_finish_reason(reason: Option<&str>, has_tool_calls: bool) -> Option<&'static str> {
    if has_tool_calls {
        return Some("tool_calls");
    }
    match reason? {
        "STOP" => Some("stop"),
        "MAX_TOKENS" => Some("length"),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            Some("content_filter")
        },
        _ => Some("stop"),
    }
}

pub fn map_usage(usage: &Value) -> Option<OpenAIUsage> {
    let get = |key: &str| usage.get(key).and_then(Value::as_u64).map(|n| n as u32);
    let prompt = get("promptTokenCount")?;
    let candidates = get("candidatesTokenCount").unwrap_or(0);
    let thoughts = get("thoughtsTokenCount");
    let completion = candidates + thoughts.unwrap_or(0);
    Some(OpenAIUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: get("totalTokenCount").unwrap_or(prompt + completion),
        completion_tokens_details: thoughts
            .map(|t| CompletionTokensDetails { reasoning_tokens: Some(t) }),
    })
}

/// Text, reasoning and tool calls carried by one candidate.
struct CandidateParts {
    text: String,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
}

fn split_candidate(candidate: &Value) -> CandidateParts {
    let mut out = CandidateParts { text: String::new(), reasoning: String::new(), tool_calls: Vec::new() };
    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for part in parts {
        if let Some(call) = part.get("functionCall") {
            out.tool_calls.push(ToolCall {
                id: tool_call_id(call),
                r#type: "function".to_string(),
                function: ToolFunction {
                    name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    arguments: call.get("args").map(Value::to_string).unwrap_or_else(|| "{}".to_string()),
                },
            });
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                out.reasoning.push_str(text);
            } else {
                out.text.push_str(text);
            }
        } else if let Some(inline) = part.get("inlineData") {
            // Inline images are returned as markdown data URIs.
            let mime = inline.get("mimeType").and_then(Value::as_str).unwrap_or("image/png");
            let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
            out.text.push_str(&format!("![image](data:{};base64,{})", mime, data));
        }
    }
    out
}

/// Complete Gemini response → `chat.completion`.
pub fn to_completion(response: &Value, model: &str) -> OpenAIResponse {
    let candidates = response.get("candidates").and_then(Value::as_array);
    let choices = candidates
        .map(|list| {
            list.iter()
                .enumerate()
                .map(|(i, candidate)| {
                    let parts = split_candidate(candidate);
                    let finish = map_finish_reason(
                        candidate.get("finishReason").and_then(Value::as_str),
                        !parts.tool_calls.is_empty(),
                    );
                    let index = candidate.get("index").and_then(Value::as_u64).unwrap_or(i as u64);
                    Choice {
                        index: index as u32,
                        message: OpenAIMessage {
                            role: "assistant".to_string(),
                            content: Some(OpenAIContent::String(parts.text)),
                            reasoning_content: Some(parts.reasoning).filter(|r| !r.is_empty()),
                            tool_calls: Some(parts.tool_calls).filter(|t| !t.is_empty()),
                            tool_call_id: None,
                            name: None,
                        },
                        finish_reason: finish.map(str::to_string),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    OpenAIResponse {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: now_secs(),
        model: model.to_string(),
        choices,
        usage: response.get("usageMetadata").and_then(map_usage),
    }
}

/// Maps Gemini stream chunks to `chat.completion.chunk` objects sharing one id.
pub struct ChunkMapper {
    id: String,
    created: u64,
    model: String,
    role_sent: bool,
    tool_call_index: u32,
}

impl ChunkMapper {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            created: now_secs(),
            model: model.into(),
            role_sent: false,
            tool_call_index: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Map one Gemini chunk. Returns `None` when it carries nothing to forward.
    pub fn map(&mut self, chunk: &Value) -> Option<Value> {
        let candidate = chunk.get("candidates").and_then(Value::as_array).and_then(|c| c.first());
        let usage = chunk.get("usageMetadata").and_then(map_usage);

        let mut delta = json!({});
        let mut finish = None;
        if let Some(candidate) = candidate {
            let parts = split_candidate(candidate);
            if !self.role_sent {
                delta["role"] = json!("assistant");
                self.role_sent = true;
            }
            if !parts.text.is_empty() {
                delta["content"] = json!(parts.text);
            }
            if !parts.reasoning.is_empty() {
                delta["reasoning_content"] = json!(parts.reasoning);
            }
            let has_tool_calls = !parts.tool_calls.is_empty();
            if has_tool_calls {
                let calls: Vec<Value> = parts
                    .tool_calls
                    .into_iter()
                    .map(|tc| {
                        let index = self.tool_call_index;
                        self.tool_call_index += 1;
                        json!({
                            "index": index,
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.function.name, "arguments": tc.function.arguments }
                        })
                    })
                    .collect();
                delta["tool_calls"] = json!(calls);
            }
            finish = map_finish_reason(
                candidate.get("finishReason").and_then(Value::as_str),
                has_tool_calls || (self.tool_call_index > 0 && candidate.get("finishReason").is_some()),
            );
        }

        let delta_empty = delta.as_object().is_some_and(serde_json::Map::is_empty);
        if delta_empty && finish.is_none() {
            return None;
        }

        let mut out = json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{ "index": 0, "delta": delta, "finish_reason": finish }]
        });
        if let (Some(usage), Some(_)) = (usage, finish) {
            out["usage"] = json!(usage);
        }
        Some(out)
    }
}

/// `GET /v1/models` body.
pub fn model_list(ids: &[String]) -> Value {
    let created = now_secs();
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "id": id, "object": "model", "created": created, "owned_by": "google" }))
        .collect();
    json!({ "object": "list", "data": data })
}
