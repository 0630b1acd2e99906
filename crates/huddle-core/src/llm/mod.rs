//! LLM API client and types
//!
//! Supports both Claude API and OpenAI-compatible APIs.

mod client;
mod types;

pub use client::{Completion, LlmClient};
pub use types::*;
