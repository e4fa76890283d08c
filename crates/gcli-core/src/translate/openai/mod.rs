//! OpenAI chat-completions dialect.

pub mod models;
mod request;
mod response;

pub use models::{OpenAIMessage, OpenAIRequest, OpenAIResponse};
pub use request::{build_generation_config, merge_consecutive_roles, to_gemini, transform_message};
pub use response::{completion_id, map_finish_reason, map_usage, model_list, to_completion, ChunkMapper};
