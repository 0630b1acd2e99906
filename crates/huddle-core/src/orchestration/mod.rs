//! Hierarchical query orchestration
//!
//! A user query is decomposed into handler-bound sub-queries, each
//! sub-query is answered concurrently on its own conversation branch by a
//! tree of supervisors and specialists, and the branch results are merged
//! into one reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      QueryDecomposer                         │
//! │  Query ──classifier──▶ [SubQuery 1, SubQuery 2, ... N ≤ 7]   │
//! └─────────────────────────────────────────────────────────────┘
//!         │
//!         ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ConcurrentDispatcher                       │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐             │
//! │  │ Supervisor │  │ Supervisor │  │ Supervisor │  (branches) │
//! │  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘             │
//! │        ▼               ▼               ▼                    │
//! │   Specialists     Specialists     Specialists  ──▶ tools    │
//! └─────────────────────────────────────────────────────────────┘
//!         │
//!         ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ResultAggregator                          │
//! │  - LLM synthesis                                             │
//! │  - Deterministic join fallback                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use huddle_core::orchestration::{LlmClassifier, Orchestrator, Query};
//!
//! let classifier = Arc::new(LlmClassifier::new(Arc::new(LlmClient::new(&config)?)));
//! let orchestrator = Orchestrator::builder(registry, classifier.clone())
//!     .synthesizer(classifier)
//!     .config(config.orchestration.clone())
//!     .build()?;
//!
//! let response = orchestrator.answer(&Query::new("Lakers score and LeBron's career ppg?")).await?;
//! println!("{}", response.answer.text);
//! ```

pub mod aggregator;
pub mod classifier;
pub mod conversation;
pub mod decomposer;
pub mod dispatcher;
pub mod handler;
pub mod llm_classifier;
pub mod orchestrator;
pub mod registry;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use aggregator::{AggregationMode, FinalAnswer, ResultAggregator};
pub use classifier::{
    AnsweredFragment, Classifier, FailedSubQuery, ProposedSubQuery, RouteRequest,
    SynthesisRequest, Synthesizer, ToolCallRequest,
};
pub use conversation::ConversationBranch;
pub use decomposer::QueryDecomposer;
pub use dispatcher::{ConcurrentDispatcher, DispatchConfig};
pub use handler::{Handler, MAX_TOOL_ATTEMPTS, Specialist, Supervisor, SupervisorBuilder};
pub use llm_classifier::LlmClassifier;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, Response};
pub use registry::{HandlerDescriptor, HandlerRegistry, HandlerRegistryBuilder};
pub use types::{
    BranchFailure, ConversationId, ExecutionResult, ExhaustionPolicy, FailureKind, HandlerAnswer,
    HandlerName, Outcome, Query, Resolution, Role, RouteTarget, RoutingDecision, SubQuery, Turn,
};
