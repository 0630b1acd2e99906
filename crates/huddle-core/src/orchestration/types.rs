//! Orchestration value types
//!
//! Queries, sub-queries, routing decisions and per-branch outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Name of a registered handler (supervisor or specialist)
///
/// Names are only ever turned into [`SubQuery`] targets through a
/// [`HandlerRegistry`](super::HandlerRegistry) lookup, so an unknown name is
/// an error at the point it enters the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerName(String);

impl HandlerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

static NEXT_CONVERSATION_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing conversation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub u64);

impl ConversationId {
    /// Allocate the next id for this process
    pub fn next() -> Self {
        Self(NEXT_CONVERSATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Intermediate message written by a supervisor while routing
    Routing,
    /// Answer returned by a child handler
    Handler,
    /// Tool output or failure fed back into a branch
    Observation,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Routing => "routing",
            Role::Handler => "handler",
            Role::Observation => "observation",
        };
        f.write_str(s)
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<HandlerName>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            author: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            author: None,
        }
    }

    pub fn routing(author: HandlerName, text: impl Into<String>) -> Self {
        Self {
            role: Role::Routing,
            text: text.into(),
            author: Some(author),
        }
    }

    pub fn handler(author: HandlerName, text: impl Into<String>) -> Self {
        Self {
            role: Role::Handler,
            text: text.into(),
            author: Some(author),
        }
    }

    pub fn observation(text: impl Into<String>) -> Self {
        Self {
            role: Role::Observation,
            text: text.into(),
            author: None,
        }
    }
}

/// An incoming user question plus the conversation it belongs to
///
/// Immutable: follow-ups are new values built with [`Query::follow_up`].
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    conversation_id: ConversationId,
    history: Arc<[Turn]>,
}

impl Query {
    /// Start a new conversation
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: ConversationId::next(),
            history: Arc::from(Vec::new()),
        }
    }

    /// Next question in the same conversation
    ///
    /// The current question and the answer it received become history.
    pub fn follow_up(&self, answer: impl Into<String>, text: impl Into<String>) -> Self {
        let mut history = self.history.to_vec();
        history.push(Turn::user(self.text.clone()));
        history.push(Turn::assistant(answer));

        Self {
            text: text.into(),
            conversation_id: self.conversation_id,
            history: Arc::from(history),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Prior turns, oldest first
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub(crate) fn shared_history(&self) -> Arc<[Turn]> {
        Arc::clone(&self.history)
    }
}

/// One decomposed unit of the user question, bound to a registered handler
///
/// Only constructible through [`HandlerRegistry::sub_query`](super::HandlerRegistry::sub_query).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubQuery {
    text: String,
    handler: HandlerName,
}

impl SubQuery {
    pub(crate) fn new_checked(text: String, handler: HandlerName) -> Self {
        Self { text, handler }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn handler(&self) -> &HandlerName {
        &self.handler
    }
}

/// Where a supervisor wants to go next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Handler(HandlerName),
    Terminal,
}

impl RouteTarget {
    /// Parse a classifier answer; `exit`, `end`, `terminal` and blanks end routing
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "" | "exit" | "end" | "__end__" | "terminal" | "none" | "finish" => RouteTarget::Terminal,
            _ => RouteTarget::Handler(HandlerName::new(trimmed)),
        }
    }
}

/// Output of one supervisor routing step
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub answer_fragment: String,
    pub satisfactory: bool,
    pub next: RouteTarget,
}

impl RoutingDecision {
    /// Routing ends when the answer is judged sufficient or no target is named
    pub fn is_final(&self) -> bool {
        self.satisfactory || self.next == RouteTarget::Terminal
    }
}

/// Terminal state a handler reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Satisfied,
    /// Hop budget ran out; the text is the best partial answer collected
    Exhausted,
}

/// What a handler returns for its sub-query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerAnswer {
    pub text: String,
    pub handler: HandlerName,
    /// Routing hops (supervisors) or tool attempts (specialists) used
    pub hops: usize,
    pub resolution: Resolution,
}

impl HandlerAnswer {
    pub fn satisfied(handler: HandlerName, text: impl Into<String>, hops: usize) -> Self {
        Self {
            text: text.into(),
            handler,
            hops,
            resolution: Resolution::Satisfied,
        }
    }

    pub fn partial(handler: HandlerName, text: impl Into<String>, hops: usize) -> Self {
        Self {
            text: text.into(),
            handler,
            hops,
            resolution: Resolution::Exhausted,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.resolution == Resolution::Exhausted
    }
}

/// Category of a branch-local failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ClassifierUnavailable,
    InvalidHandlerReference,
    HandlerInvocation,
    Exhausted,
    DispatchCancelled,
    TaskPanicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::ClassifierUnavailable => "classifier unavailable",
            FailureKind::InvalidHandlerReference => "invalid handler reference",
            FailureKind::HandlerInvocation => "handler invocation failed",
            FailureKind::Exhausted => "hop budget exhausted",
            FailureKind::DispatchCancelled => "dispatch cancelled",
            FailureKind::TaskPanicked => "task panicked",
        };
        f.write_str(s)
    }
}

/// Failure confined to one sub-query branch
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{kind}: {message}")]
pub struct BranchFailure {
    pub kind: FailureKind,
    pub handler: Option<HandlerName>,
    pub message: String,
}

impl BranchFailure {
    pub fn new(kind: FailureKind, handler: Option<HandlerName>, message: impl Into<String>) -> Self {
        Self {
            kind,
            handler,
            message: message.into(),
        }
    }

    pub fn classifier_unavailable(handler: &HandlerName, message: impl Into<String>) -> Self {
        Self::new(FailureKind::ClassifierUnavailable, Some(handler.clone()), message)
    }

    pub fn invalid_handler(handler: &HandlerName, reference: &HandlerName) -> Self {
        Self::new(
            FailureKind::InvalidHandlerReference,
            Some(handler.clone()),
            format!("'{}' is not a child of '{}'", reference, handler),
        )
    }

    pub fn handler_invocation(handler: &HandlerName, message: impl Into<String>) -> Self {
        Self::new(FailureKind::HandlerInvocation, Some(handler.clone()), message)
    }

    pub fn exhausted(handler: &HandlerName, hops: usize) -> Self {
        Self::new(
            FailureKind::Exhausted,
            Some(handler.clone()),
            format!("no satisfactory answer after {} hops", hops),
        )
    }

    pub fn cancelled(handler: &HandlerName) -> Self {
        Self::new(
            FailureKind::DispatchCancelled,
            Some(handler.clone()),
            "cancelled before completion",
        )
    }
}

/// How a branch resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Answered(HandlerAnswer),
    Failed(BranchFailure),
}

/// Exactly one per dispatched sub-query, in request order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub subquery: SubQuery,
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn answered(subquery: SubQuery, answer: HandlerAnswer) -> Self {
        Self {
            subquery,
            outcome: Outcome::Answered(answer),
        }
    }

    pub fn failed(subquery: SubQuery, failure: BranchFailure) -> Self {
        Self {
            subquery,
            outcome: Outcome::Failed(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Answered(_))
    }

    pub fn answer(&self) -> Option<&HandlerAnswer> {
        match &self.outcome {
            Outcome::Answered(answer) => Some(answer),
            Outcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BranchFailure> {
        match &self.outcome {
            Outcome::Answered(_) => None,
            Outcome::Failed(failure) => Some(failure),
        }
    }
}

/// What a supervisor returns once its hop budget is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Return the latest partial answer fragment, if any
    #[default]
    BestPartial,
    /// Fail the branch with an `Exhausted` error
    Fail,
}
