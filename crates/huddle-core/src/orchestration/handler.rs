//! Handlers
//!
//! A handler answers one sub-query against its own conversation branch.
//! [`Supervisor`]s run the routing loop over their children;
//! [`Specialist`]s are leaves that call a single tool.
//!
//! Supervisor state machine:
//!
//! ```text
//! ROUTING ──satisfactory / exit──▶ SATISFIED
//!    │
//!    └──next child──▶ REROUTE ──child answer or failure──▶ ROUTING
//!
//! hop budget spent or unknown child ──▶ EXHAUSTED
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::classifier::{Classifier, RouteRequest, ToolCallRequest};
use super::conversation::ConversationBranch;
use super::registry::{HandlerDescriptor, HandlerRegistry};
use super::types::{
    BranchFailure, ExhaustionPolicy, HandlerAnswer, HandlerName, RouteTarget, SubQuery, Turn,
};
use crate::tool::Tool;
use crate::{Error, Result};

/// Tool attempts a specialist makes before giving up
pub const MAX_TOOL_ATTEMPTS: usize = 2;

/// Default routing hops per supervisor
pub const DEFAULT_MAX_HOPS: usize = 4;

/// A named unit that can answer a sub-query
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &HandlerName;

    fn description(&self) -> &str;

    fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor {
            name: self.name().clone(),
            description: self.description().to_string(),
        }
    }

    /// Answer the sub-query, appending only to `branch`
    async fn run(
        &self,
        subquery: &SubQuery,
        branch: ConversationBranch,
    ) -> std::result::Result<HandlerAnswer, BranchFailure>;
}

// ============================================================================
// Supervisor
// ============================================================================

/// Routes a sub-query among its children until the classifier is satisfied
pub struct Supervisor {
    name: HandlerName,
    description: String,
    instructions: Option<String>,
    children: HandlerRegistry,
    classifier: Arc<dyn Classifier>,
    max_hops: usize,
    on_exhausted: ExhaustionPolicy,
}

impl Supervisor {
    pub fn builder(name: impl Into<String>, classifier: Arc<dyn Classifier>) -> SupervisorBuilder {
        SupervisorBuilder {
            name: HandlerName::new(name),
            description: String::new(),
            instructions: None,
            children: Vec::new(),
            classifier,
            max_hops: DEFAULT_MAX_HOPS,
            on_exhausted: ExhaustionPolicy::default(),
        }
    }

    pub fn children(&self) -> &HandlerRegistry {
        &self.children
    }

    fn exhausted(
        &self,
        hops: usize,
        best: Option<String>,
    ) -> std::result::Result<HandlerAnswer, BranchFailure> {
        match (self.on_exhausted, best) {
            (ExhaustionPolicy::BestPartial, Some(text)) => {
                warn!(supervisor = %self.name, hops, "Hop budget exhausted, returning best partial answer");
                Ok(HandlerAnswer::partial(self.name.clone(), text, hops))
            }
            _ => {
                warn!(supervisor = %self.name, hops, "Hop budget exhausted");
                Err(BranchFailure::exhausted(&self.name, hops))
            }
        }
    }
}

#[async_trait]
impl Handler for Supervisor {
    fn name(&self) -> &HandlerName {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(
        &self,
        subquery: &SubQuery,
        branch: ConversationBranch,
    ) -> std::result::Result<HandlerAnswer, BranchFailure> {
        let mut branch = branch;
        let children = self.children.catalog();
        // Newest non-empty routing fragment or child answer, in arrival order
        let mut latest: Option<String> = None;

        for hop in 1..=self.max_hops {
            let decision = self
                .classifier
                .route(RouteRequest {
                    supervisor: &self.name,
                    instructions: self.instructions.as_deref(),
                    subquery,
                    branch: &branch,
                    children: &children,
                })
                .await
                .map_err(|e| BranchFailure::classifier_unavailable(&self.name, e.to_string()))?;

            let fragment = decision.answer_fragment.trim().to_string();
            if !fragment.is_empty() {
                latest = Some(fragment.clone());
            }

            if decision.is_final() {
                let text = latest.ok_or_else(|| {
                    BranchFailure::handler_invocation(&self.name, "routing ended without an answer")
                })?;
                info!(supervisor = %self.name, hop, "Sub-query satisfied");
                return Ok(HandlerAnswer::satisfied(self.name.clone(), text, hop));
            }

            let RouteTarget::Handler(next) = decision.next else {
                continue;
            };

            let Some(child) = self.children.get(&next) else {
                let failure = BranchFailure::invalid_handler(&self.name, &next);
                warn!(supervisor = %self.name, "{}", failure);
                return self.exhausted(hop, latest);
            };

            debug!(supervisor = %self.name, hop, child = %next, "Routing to child");
            let note = if fragment.is_empty() {
                format!("Asking {}", next)
            } else {
                format!("{} (asking {})", fragment, next)
            };
            branch.push(Turn::routing(self.name.clone(), note));

            match child.run(subquery, branch.fork()).await {
                Ok(answer) => {
                    branch.push(Turn::handler(next, answer.text.clone()));
                    if !answer.text.trim().is_empty() {
                        latest = Some(answer.text);
                    }
                }
                Err(failure) => {
                    warn!(supervisor = %self.name, child = %next, "Child failed: {}", failure);
                    branch.push(Turn::observation(format!("{} failed: {}", next, failure)));
                }
            }
        }

        self.exhausted(self.max_hops, latest)
    }
}

/// Builder for [`Supervisor`]
pub struct SupervisorBuilder {
    name: HandlerName,
    description: String,
    instructions: Option<String>,
    children: Vec<Arc<dyn Handler>>,
    classifier: Arc<dyn Classifier>,
    max_hops: usize,
    on_exhausted: ExhaustionPolicy,
}

impl SupervisorBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn child(mut self, child: Arc<dyn Handler>) -> Self {
        self.children.push(child);
        self
    }

    pub fn max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn on_exhausted(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhausted = policy;
        self
    }

    pub fn build(self) -> Result<Supervisor> {
        if self.max_hops == 0 {
            return Err(Error::Config(format!(
                "Supervisor '{}' needs max_hops >= 1",
                self.name
            )));
        }
        if self.children.is_empty() {
            return Err(Error::Domain(format!(
                "Supervisor '{}' has no children",
                self.name
            )));
        }

        let children = self
            .children
            .into_iter()
            .try_fold(HandlerRegistry::builder(), |builder, child| builder.register(child))?
            .build()?;

        Ok(Supervisor {
            name: self.name,
            description: self.description,
            instructions: self.instructions,
            children,
            classifier: self.classifier,
            max_hops: self.max_hops,
            on_exhausted: self.on_exhausted,
        })
    }
}

// ============================================================================
// Specialist
// ============================================================================

/// Leaf handler that answers from a single tool
pub struct Specialist {
    name: HandlerName,
    description: String,
    instructions: Option<String>,
    tool: Arc<dyn Tool>,
    classifier: Arc<dyn Classifier>,
}

impl Specialist {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tool: Arc<dyn Tool>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            name: HandlerName::new(name),
            description: description.into(),
            instructions: None,
            tool,
            classifier,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }
}

#[async_trait]
impl Handler for Specialist {
    fn name(&self) -> &HandlerName {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(
        &self,
        subquery: &SubQuery,
        branch: ConversationBranch,
    ) -> std::result::Result<HandlerAnswer, BranchFailure> {
        let mut branch = branch;
        let definition = self.tool.definition();
        let mut last_error = String::new();

        for attempt in 1..=MAX_TOOL_ATTEMPTS {
            let input = self
                .classifier
                .plan_tool_call(ToolCallRequest {
                    specialist: &self.name,
                    instructions: self.instructions.as_deref(),
                    subquery,
                    branch: &branch,
                    tool: &definition,
                })
                .await
                .map_err(|e| BranchFailure::classifier_unavailable(&self.name, e.to_string()))?;

            debug!(specialist = %self.name, tool = %definition.name, attempt, "Executing tool: {}", input);

            let error = match self.tool.execute(input.clone()).await {
                Ok(result) if !result.is_error => {
                    return Ok(HandlerAnswer::satisfied(self.name.clone(), result.output, attempt));
                }
                Ok(result) => result.output,
                Err(e) => e.to_string(),
            };

            warn!(specialist = %self.name, tool = %definition.name, attempt, "Tool failed: {}", error);
            branch.push(Turn::observation(format!(
                "Tool {} failed for input {}: {}",
                definition.name, input, error
            )));
            last_error = error;
        }

        Err(BranchFailure::handler_invocation(
            &self.name,
            format!("{} failed after {} attempts: {}", definition.name, MAX_TOOL_ATTEMPTS, last_error),
        ))
    }
}
