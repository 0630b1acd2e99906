//! huddle-core: hierarchical query orchestration
//!
//! Decomposes a question into sub-queries, answers them concurrently through
//! domain handler trees, and merges the results into one reply.

pub mod config;
pub mod domain;
pub mod error;
pub mod llm;
pub mod orchestration;
pub mod tool;

pub use config::{Config, LlmConfig, LlmProvider, OrchestrationConfig};
pub use domain::{Domain, DomainBuilder, DomainDefinition, DomainLoader, EndpointConfig};
pub use error::{Error, Result};
pub use llm::{Completion, LlmClient, Message, MessageContent};
pub use orchestration::{
    ExhaustionPolicy, FinalAnswer, HandlerRegistry, LlmClassifier, Orchestrator, Query, Response,
};
pub use tool::{Tool, ToolDefinition, ToolManager, ToolResult};
