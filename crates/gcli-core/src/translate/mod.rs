//! Stateless protocol translation.
//!
//! ```text
//! model name ──parse──► ModelDirectives { base_model, thinking, search, stream_mode }
//! OpenAI request ──to_gemini──► GenerateContentRequest ──► backend
//! Gemini response ──to_completion / ChunkMapper──► OpenAI response
//! ```

mod directives;
pub mod gemini;
pub mod openai;

pub use directives::{list_models, ModelDirectives, ThinkingMode};
