//! Model-name directives.
//!
//! A requested model name may carry one stream-mode prefix and any number of
//! behaviour suffixes, e.g. `anti-truncation/gemini-2.5-pro-maxthinking-search`.
//! They are parsed once at the boundary into [`ModelDirectives`]; only
//! `base_model` travels to the backend.

use serde::Serialize;
use serde_json::{json, Value};

use crate::stream::StreamMode;

const FAKE_STREAM_PREFIX: &str = "fake-stream/";
const ANTI_TRUNCATION_PREFIX: &str = "anti-truncation/";
const LEGACY_FAKE_STREAM_PREFIX: &str = "假流式/";
const LEGACY_ANTI_TRUNCATION_PREFIX: &str = "流式抗截断/";

const MAX_THINKING_SUFFIX: &str = "-maxthinking";
const NO_THINKING_SUFFIX: &str = "-nothinking";
const SEARCH_SUFFIX: &str = "-search";

const PRO_MAX_BUDGET: u32 = 32768;
const FLASH_MAX_BUDGET: u32 = 24576;
/// Pro models cannot switch thinking off entirely.
const PRO_MIN_BUDGET: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingMode {
    #[default]
    Default,
    Max,
    Off,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDirectives {
    pub base_model: String,
    pub thinking: ThinkingMode,
    pub search: bool,
    pub stream_mode: StreamMode,
}

impl ModelDirectives {
    pub fn parse(requested: &str) -> Self {
        let mut name = requested.trim();
        name = name.strip_prefix("models/").unwrap_or(name);

        let mut stream_mode = StreamMode::Real;
        for (prefix, mode) in [
            (FAKE_STREAM_PREFIX, StreamMode::Fake),
            (LEGACY_FAKE_STREAM_PREFIX, StreamMode::Fake),
            (ANTI_TRUNCATION_PREFIX, StreamMode::AntiTruncation),
            (LEGACY_ANTI_TRUNCATION_PREFIX, StreamMode::AntiTruncation),
        ] {
            if let Some(rest) = name.strip_prefix(prefix) {
                name = rest;
                stream_mode = mode;
                break;
            }
        }

        let mut thinking = ThinkingMode::Default;
        let mut search = false;
        loop {
            if let Some(rest) = name.strip_suffix(MAX_THINKING_SUFFIX) {
                thinking = ThinkingMode::Max;
                name = rest;
            } else if let Some(rest) = name.strip_suffix(NO_THINKING_SUFFIX) {
                thinking = ThinkingMode::Off;
                name = rest;
            } else if let Some(rest) = name.strip_suffix(SEARCH_SUFFIX) {
                search = true;
                name = rest;
            } else {
                break;
            }
        }

        Self { base_model: name.to_string(), thinking, search, stream_mode }
    }

    fn is_flash(&self) -> bool {
        self.base_model.contains("flash")
    }

    /// `(thinkingBudget, includeThoughts)` forced by the directive, if any.
    pub fn thinking_budget(&self) -> Option<(u32, bool)> {
        match self.thinking {
            ThinkingMode::Default => None,
            ThinkingMode::Max if self.is_flash() => Some((FLASH_MAX_BUDGET, true)),
            ThinkingMode::Max => Some((PRO_MAX_BUDGET, true)),
            ThinkingMode::Off if self.is_flash() => Some((0, false)),
            ThinkingMode::Off => Some((PRO_MIN_BUDGET, false)),
        }
    }

    /// Apply thinking and search flags to a Gemini request body.
    pub fn apply(&self, request: &mut Value) {
        let Some(obj) = request.as_object_mut() else {
            return;
        };

        let gen_config = obj.entry("generationConfig").or_insert_with(|| json!({}));
        if !gen_config.is_object() {
            *gen_config = json!({});
        }
        if let Some(gen_obj) = gen_config.as_object_mut() {
            let thinking = gen_obj.entry("thinkingConfig").or_insert_with(|| json!({}));
            if !thinking.is_object() {
                *thinking = json!({});
            }
            match self.thinking_budget() {
                Some((budget, include)) => {
                    thinking["thinkingBudget"] = json!(budget);
                    thinking["includeThoughts"] = json!(include);
                },
                None => {
                    if thinking.get("includeThoughts").is_none() {
                        thinking["includeThoughts"] = json!(true);
                    }
                },
            }
        }

        if self.search {
            let tools = obj.entry("tools").or_insert_with(|| json!([]));
            if !tools.is_array() {
                *tools = json!([]);
            }
            if let Some(list) = tools.as_array_mut() {
                let has_functions = list.iter().any(|t| t.get("functionDeclarations").is_some());
                let has_search = list.iter().any(|t| t.get("googleSearch").is_some());
                if has_functions {
                    tracing::debug!(
                        "[Translate] Skipping googleSearch for {}: function declarations present",
                        self.base_model
                    );
                } else if !has_search {
                    list.push(json!({"googleSearch": {}}));
                }
            }
        }
    }
}

/// Every advertised model id: each base model plus its directive variants.
pub fn list_models(base_models: &[String]) -> Vec<String> {
    let prefixes = ["", FAKE_STREAM_PREFIX, ANTI_TRUNCATION_PREFIX];
    let thinking = ["", MAX_THINKING_SUFFIX, NO_THINKING_SUFFIX];
    let search = ["", SEARCH_SUFFIX];

    let mut models = Vec::with_capacity(base_models.len() * 18);
    for base in base_models {
        for prefix in prefixes {
            for think in thinking {
                for s in search {
                    models.push(format!("{}{}{}{}", prefix, base, think, s));
                }
            }
        }
    }
    models
}
