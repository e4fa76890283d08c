//! Gemini-native payload handling.

use serde_json::{json, Map, Value};

use super::ModelDirectives;

/// Request fields forwarded to the backend; everything else is dropped.
const ALLOWED_FIELDS: &[&str] = &[
    "contents",
    "systemInstruction",
    "tools",
    "toolConfig",
    "generationConfig",
    "safetySettings",
    "cachedContent",
];

/// Clean a caller-supplied `GenerateContentRequest` and apply directive flags.
pub fn build_native_request(payload: &Value, directives: &ModelDirectives) -> Value {
    let mut cleaned = Map::new();
    if let Some(obj) = payload.as_object() {
        for key in ALLOWED_FIELDS {
            if let Some(value) = obj.get(*key) {
                cleaned.insert((*key).to_string(), value.clone());
            }
        }
        if !cleaned.contains_key("systemInstruction") {
            if let Some(value) = obj.get("system_instruction") {
                cleaned.insert("systemInstruction".to_string(), value.clone());
            }
        }
        if !cleaned.contains_key("generationConfig") {
            if let Some(value) = obj.get("generation_config") {
                cleaned.insert("generationConfig".to_string(), value.clone());
            }
        }
    }
    let mut request = Value::Object(cleaned);
    directives.apply(&mut request);
    request
}

/// Strip the Code Assist `{"response": …}` envelope.
pub fn unwrap_response(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.get("response").is_some_and(Value::is_object) => {
            obj.remove("response").unwrap_or(Value::Null)
        },
        other => other,
    }
}

pub fn first_candidate(response: &Value) -> Option<&Value> {
    response.get("candidates").and_then(Value::as_array).and_then(|c| c.first())
}

pub fn finish_reason(response: &Value) -> Option<&str> {
    first_candidate(response).and_then(|c| c.get("finishReason")).and_then(Value::as_str)
}

pub fn candidate_parts(response: &Value) -> &[Value] {
    first_candidate(response)
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn is_thought(part: &Value) -> bool {
    part.get("thought").and_then(Value::as_bool).unwrap_or(false)
}

/// Visible (non-thought) text of the first candidate.
pub fn response_text(response: &Value) -> String {
    candidate_parts(response)
        .iter()
        .filter(|p| !is_thought(p))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect()
}

/// Thought text of the first candidate.
pub fn thought_text(response: &Value) -> String {
    candidate_parts(response)
        .iter()
        .filter(|p| is_thought(p))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect()
}

/// A single-candidate chunk carrying `parts`.
pub fn chunk_with_parts(parts: Vec<Value>, finish_reason: Option<&str>) -> Value {
    let mut candidate = json!({
        "content": {"role": "model", "parts": parts},
        "index": 0
    });
    if let Some(reason) = finish_reason {
        candidate["finishReason"] = json!(reason);
    }
    json!({"candidates": [candidate]})
}

pub fn text_chunk(text: &str) -> Value {
    chunk_with_parts(vec![json!({"text": text})], None)
}

/// `GET /v1beta/models` body.
pub fn model_list(ids: &[String]) -> Value {
    let models: Vec<Value> = ids
        .iter()
        .map(|id| {
            let base = ModelDirectives::parse(id).base_model;
            json!({
                "name": format!("models/{}", id),
                "version": "001",
                "displayName": id,
                "description": format!("Gateway model for {}", base),
                "inputTokenLimit": 1_048_576,
                "outputTokenLimit": 65_536,
                "supportedGenerationMethods": ["generateContent", "streamGenerateContent"],
            })
        })
        .collect();
    json!({ "models": models })
}
