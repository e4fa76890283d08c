use serde_json::{json, Value};
use std::collections::HashMap;

use super::models::*;
use crate::translate::ModelDirectives;

/// Build a Gemini `GenerateContentRequest` from an OpenAI chat request.
pub fn to_gemini(request: &OpenAIRequest, directives: &ModelDirectives) -> Value {
    let tool_id_to_name = tool_call_names(&request.messages);

    let mut system_parts: Vec<Value> = Vec::new();
    let mut contents: Vec<Value> = Vec::new();
    for msg in &request.messages {
        match msg.role.as_str() {
            "system" | "developer" => {
                let text = plain_text(msg.content.as_ref());
                if !text.is_empty() {
                    system_parts.push(json!({"text": text}));
                }
            },
            _ => {
                let content = transform_message(msg, &tool_id_to_name);
                if content["parts"].as_array().is_some_and(|p| !p.is_empty()) {
                    contents.push(content);
                }
            },
        }
    }

    let mut body = json!({
        "contents": merge_consecutive_roles(contents),
        "generationConfig": build_generation_config(request),
    });
    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({"parts": system_parts});
    }
    if let Some(tools) = request.tools.as_deref() {
        let declarations = transform_tool_declarations(tools);
        if !declarations.is_empty() {
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }
    }
    if let Some(tool_config) = request.tool_choice.as_ref().and_then(tool_config) {
        body["toolConfig"] = tool_config;
    }

    directives.apply(&mut body);
    body
}

fn tool_call_names(messages: &[OpenAIMessage]) -> HashMap<String, String> {
    messages
        .iter()
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .map(|tc| (tc.id.clone(), tc.function.name.clone()))
        .collect()
}

fn plain_text(content: Option<&OpenAIContent>) -> String {
    match content {
        Some(OpenAIContent::String(s)) => s.clone(),
        Some(OpenAIContent::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| match b {
                OpenAIContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    }
}

pub fn transform_message(msg: &OpenAIMessage, tool_id_to_name: &HashMap<String, String>) -> Value {
    let role = match msg.role.as_str() {
        "assistant" | "model" => "model",
        _ => "user",
    };
    let is_tool_role = msg.role == "tool" || msg.role == "function";

    let mut parts = Vec::new();

    if let Some(reasoning) = msg.reasoning_content.as_deref().filter(|r| !r.is_empty()) {
        // Without a thought signature the backend rejects thought parts, so
        // replayed reasoning goes back as plain text.
        parts.push(json!({"text": reasoning}));
    }

    if !is_tool_role {
        match &msg.content {
            Some(OpenAIContent::String(s)) if !s.is_empty() => parts.push(json!({"text": s})),
            Some(OpenAIContent::Array(blocks)) => {
                parts.extend(blocks.iter().filter_map(transform_content_block));
            },
            _ => {},
        }
    }

    for tc in msg.tool_calls.iter().flatten() {
        let args = serde_json::from_str::<Value>(&tc.function.arguments).unwrap_or(json!({}));
        parts.push(json!({
            "functionCall": { "name": &tc.function.name, "args": args, "id": &tc.id }
        }));
    }

    if is_tool_role {
        let name = msg
            .tool_call_id
            .as_ref()
            .and_then(|id| tool_id_to_name.get(id))
            .map(String::as_str)
            .or(msg.name.as_deref())
            .unwrap_or("unknown");
        let text = plain_text(msg.content.as_ref());
        let response = serde_json::from_str::<Value>(&text)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({ "result": text }));
        let mut part = json!({ "functionResponse": { "name": name, "response": response } });
        if let Some(id) = &msg.tool_call_id {
            part["functionResponse"]["id"] = json!(id);
        }
        parts.push(part);
    }

    json!({ "role": role, "parts": parts })
}

pub fn transform_content_block(block: &OpenAIContentBlock) -> Option<Value> {
    match block {
        OpenAIContentBlock::Text { text } => Some(json!({"text": text})),
        OpenAIContentBlock::ImageUrl { image_url } => transform_image_url(&image_url.url),
        OpenAIContentBlock::InputAudio { input_audio } => {
            let mime_type = match input_audio.format.as_str() {
                "mp3" => "audio/mp3",
                "ogg" => "audio/ogg",
                "flac" => "audio/flac",
                "m4a" | "aac" => "audio/aac",
                _ => "audio/wav",
            };
            Some(json!({ "inlineData": { "mimeType": mime_type, "data": &input_audio.data } }))
        },
    }
}

fn transform_image_url(url: &str) -> Option<Value> {
    if let Some(rest) = url.strip_prefix("data:") {
        let (meta, data) = rest.split_once(',')?;
        let mime_type = meta.split(';').next().filter(|m| !m.is_empty()).unwrap_or("image/jpeg");
        Some(json!({ "inlineData": { "mimeType": mime_type, "data": data } }))
    } else if url.starts_with("http://") || url.starts_with("https://") {
        Some(json!({ "fileData": { "fileUri": url, "mimeType": guess_image_mime(url) } }))
    } else {
        tracing::debug!("[Translate] Dropping unsupported image reference");
        None
    }
}

fn guess_image_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

pub fn merge_consecutive_roles(contents: Vec<Value>) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::new();
    for msg in contents {
        if let Some(last) = merged.last_mut() {
            if last["role"] == msg["role"] {
                if let (Some(last_parts), Some(msg_parts)) =
                    (last["parts"].as_array_mut(), msg["parts"].as_array())
                {
                    last_parts.extend(msg_parts.iter().cloned());
                    continue;
                }
            }
        }
        merged.push(msg);
    }
    merged
}

pub fn build_generation_config(request: &OpenAIRequest) -> Value {
    let mut gen_config = json!({});

    if let Some(t) = request.temperature {
        gen_config["temperature"] = json!(t);
    }
    if let Some(p) = request.top_p {
        gen_config["topP"] = json!(p);
    }
    if let Some(k) = request.top_k {
        gen_config["topK"] = json!(k);
    }
    if let Some(max_tokens) = request.max_completion_tokens.or(request.max_tokens) {
        gen_config["maxOutputTokens"] = json!(max_tokens);
    }
    if let Some(n) = request.n {
        gen_config["candidateCount"] = json!(n);
    }
    if let Some(p) = request.presence_penalty {
        gen_config["presencePenalty"] = json!(p);
    }
    if let Some(f) = request.frequency_penalty {
        gen_config["frequencyPenalty"] = json!(f);
    }
    if let Some(seed) = request.seed {
        gen_config["seed"] = json!(seed);
    }

    match &request.stop {
        Some(Value::String(s)) => gen_config["stopSequences"] = json!([s]),
        Some(Value::Array(items)) if !items.is_empty() => {
            gen_config["stopSequences"] = Value::Array(items.clone());
        },
        _ => {},
    }

    if let Some(fmt) = &request.response_format {
        if fmt.r#type == "json_object" {
            gen_config["responseMimeType"] = json!("application/json");
        }
    }

    gen_config
}

pub fn transform_tool_declarations(tools: &[Value]) -> Vec<Value> {
    let mut function_declarations: Vec<Value> = Vec::new();

    for tool in tools {
        let mut func = tool.get("function").cloned().unwrap_or_else(|| tool.clone());

        if func.get("name").and_then(Value::as_str).is_none() {
            tracing::warn!("[Translate] Skipping tool without name");
            continue;
        }

        if let Some(obj) = func.as_object_mut() {
            obj.remove("type");
            obj.remove("strict");
        }
        if let Some(params) = func.get_mut("parameters") {
            strip_unsupported_schema_keys(params);
        }
        function_declarations.push(func);
    }

    function_declarations
}

/// JSON-schema keywords the Gemini function schema rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] =
    &["$schema", "additionalProperties", "strict", "$id", "$ref", "definitions", "$defs"];

fn strip_unsupported_schema_keys(schema: &mut Value) {
    match schema {
        Value::Object(obj) => {
            for key in UNSUPPORTED_SCHEMA_KEYS {
                obj.remove(*key);
            }
            for value in obj.values_mut() {
                strip_unsupported_schema_keys(value);
            }
        },
        Value::Array(items) => items.iter_mut().for_each(strip_unsupported_schema_keys),
        _ => {},
    }
}

/// OpenAI `tool_choice` → Gemini `toolConfig`.
fn tool_config(choice: &Value) -> Option<Value> {
    let (mode, allowed) = match choice {
        Value::String(s) => match s.as_str() {
            "none" => ("NONE", None),
            "auto" => ("AUTO", None),
            "required" => ("ANY", None),
            _ => return None,
        },
        Value::Object(_) => {
            let name = choice.get("function").and_then(|f| f.get("name")).and_then(Value::as_str)?;
            ("ANY", Some(name))
        },
        _ => return None,
    };
    let mut config = json!({ "functionCallingConfig": { "mode": mode } });
    if let Some(name) = allowed {
        config["functionCallingConfig"]["allowedFunctionNames"] = json!([name]);
    }
    Some(config)
}
