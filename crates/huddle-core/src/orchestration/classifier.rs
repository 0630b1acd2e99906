//! Classifier and synthesizer ports
//!
//! The orchestration core never talks to a model directly. Decomposition,
//! routing, tool argument planning and synthesis all go through these traits;
//! [`LlmClassifier`](super::LlmClassifier) is the production adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::conversation::ConversationBranch;
use super::registry::HandlerDescriptor;
use super::types::{HandlerName, Query, RoutingDecision, SubQuery};
use crate::Result;
use crate::tool::ToolDefinition;

/// One sub-question as proposed by the classifier, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedSubQuery {
    #[serde(alias = "query")]
    pub text: String,
    #[serde(alias = "supervisor")]
    pub handler: String,
}

impl ProposedSubQuery {
    pub fn new(text: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            handler: handler.into(),
        }
    }
}

/// Input for one supervisor routing step
pub struct RouteRequest<'a> {
    pub supervisor: &'a HandlerName,
    pub instructions: Option<&'a str>,
    pub subquery: &'a SubQuery,
    pub branch: &'a ConversationBranch,
    pub children: &'a [HandlerDescriptor],
}

/// Input for planning a specialist's tool call
pub struct ToolCallRequest<'a> {
    pub specialist: &'a HandlerName,
    pub instructions: Option<&'a str>,
    pub subquery: &'a SubQuery,
    pub branch: &'a ConversationBranch,
    pub tool: &'a ToolDefinition,
}

/// A successful branch answer handed to the synthesizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnsweredFragment {
    pub question: String,
    pub handler: HandlerName,
    pub answer: String,
    pub partial: bool,
}

/// A failed branch, named in the final answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSubQuery {
    pub question: String,
    pub handler: HandlerName,
    pub reason: String,
}

/// Input for the final synthesis call
pub struct SynthesisRequest<'a> {
    pub query: &'a Query,
    pub fragments: &'a [AnsweredFragment],
    pub failed: &'a [FailedSubQuery],
    pub persona: Option<&'a str>,
}

/// Decomposition, routing and tool planning
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Split a query into at most `max_subqueries` handler-bound questions
    async fn decompose(
        &self,
        query: &Query,
        catalog: &[HandlerDescriptor],
        max_subqueries: usize,
    ) -> Result<Vec<ProposedSubQuery>>;

    /// Decide whether a supervisor is done or which child to consult next
    async fn route(&self, request: RouteRequest<'_>) -> Result<RoutingDecision>;

    /// Produce the JSON input for a specialist's tool
    async fn plan_tool_call(&self, request: ToolCallRequest<'_>) -> Result<JsonValue>;
}

/// Combines branch answers into one reply
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposed_subquery_accepts_aliases() {
        let parsed: ProposedSubQuery =
            serde_json::from_str(r#"{"query": "Lakers score", "supervisor": "game_supervisor"}"#).unwrap();
        assert_eq!(parsed, ProposedSubQuery::new("Lakers score", "game_supervisor"));

        let parsed: ProposedSubQuery =
            serde_json::from_str(r#"{"text": "LeBron ppg", "handler": "player_supervisor"}"#).unwrap();
        assert_eq!(parsed.handler, "player_supervisor");
    }
}
