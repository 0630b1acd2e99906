//! Test doubles shared by the orchestration unit tests

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::classifier::{
    Classifier, ProposedSubQuery, RouteRequest, SynthesisRequest, Synthesizer, ToolCallRequest,
};
use super::conversation::ConversationBranch;
use super::handler::Handler;
use super::registry::HandlerDescriptor;
use super::types::{
    BranchFailure, FailureKind, HandlerAnswer, HandlerName, Query, RouteTarget, RoutingDecision,
    SubQuery, Turn,
};
use crate::tool::{Tool, ToolResult};
use crate::{Error, Result};

pub fn route(fragment: &str, satisfactory: bool, next: &str) -> RoutingDecision {
    RoutingDecision {
        answer_fragment: fragment.to_string(),
        satisfactory,
        next: RouteTarget::parse(next),
    }
}

/// Handler with a canned answer, optional delay and optional failure
pub struct StaticHandler {
    name: HandlerName,
    answer: String,
    delay: Option<Duration>,
    failure: Option<FailureKind>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl StaticHandler {
    pub fn new(name: &str, answer: &str) -> Self {
        Self {
            name: HandlerName::new(name),
            answer: answer.to_string(),
            delay: None,
            failure: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str, kind: FailureKind) -> Self {
        Self {
            failure: Some(kind),
            ..Self::new(name, "")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_branches(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Handler for StaticHandler {
    fn name(&self) -> &HandlerName {
        &self.name
    }

    fn description(&self) -> &str {
        "canned answers"
    }

    async fn run(
        &self,
        _subquery: &SubQuery,
        branch: ConversationBranch,
    ) -> std::result::Result<HandlerAnswer, BranchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(branch.turns().cloned().collect());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.failure {
            Some(kind) => Err(BranchFailure::new(kind, Some(self.name.clone()), "scripted failure")),
            None => Ok(HandlerAnswer::satisfied(self.name.clone(), self.answer.clone(), 1)),
        }
    }
}

/// Classifier driven by queued replies
#[derive(Default)]
pub struct ScriptedClassifier {
    decomposition: Mutex<Option<Result<Vec<ProposedSubQuery>>>>,
    routes: Mutex<VecDeque<RoutingDecision>>,
    repeated_route: Option<RoutingDecision>,
    fail_routes: bool,
    route_calls: AtomicUsize,
    tool_calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decomposition(self, proposals: Vec<ProposedSubQuery>) -> Self {
        *self.decomposition.lock().unwrap() = Some(Ok(proposals));
        self
    }

    pub fn failing_decomposition(self) -> Self {
        *self.decomposition.lock().unwrap() =
            Some(Err(Error::ClassifierUnavailable("connection refused".into())));
        self
    }

    pub fn with_routes(self, routes: Vec<RoutingDecision>) -> Self {
        *self.routes.lock().unwrap() = routes.into();
        self
    }

    pub fn with_route_repeated(mut self, decision: RoutingDecision) -> Self {
        self.repeated_route = Some(decision);
        self
    }

    pub fn failing_routes(mut self) -> Self {
        self.fail_routes = true;
        self
    }

    pub fn route_calls(&self) -> usize {
        self.route_calls.load(Ordering::SeqCst)
    }

    /// Branch contents seen by `route` and `plan_tool_call`, in call order
    pub fn seen_branches(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn decompose(
        &self,
        _query: &Query,
        _catalog: &[HandlerDescriptor],
        _max_subqueries: usize,
    ) -> Result<Vec<ProposedSubQuery>> {
        match self.decomposition.lock().unwrap().take() {
            Some(reply) => reply,
            None => Ok(Vec::new()),
        }
    }

    async fn route(&self, request: RouteRequest<'_>) -> Result<RoutingDecision> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.branch.turns().cloned().collect());

        if self.fail_routes {
            return Err(Error::ClassifierUnavailable("timeout".into()));
        }

        let next = self.routes.lock().unwrap().pop_front();
        match next.or_else(|| self.repeated_route.clone()) {
            Some(decision) => Ok(decision),
            None => Ok(route("", true, "exit")),
        }
    }

    async fn plan_tool_call(&self, request: ToolCallRequest<'_>) -> Result<JsonValue> {
        let attempt = self.tool_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(request.branch.turns().cloned().collect());
        Ok(json!({ "query": request.subquery.text(), "attempt": attempt }))
    }
}

/// Tool that fails a fixed number of times before succeeding
pub struct FlakyTool {
    name: String,
    failures: usize,
    output: String,
    calls: AtomicUsize,
}

impl FlakyTool {
    pub fn new(name: &str, failures: usize, output: &str) -> Self {
        Self {
            name: name.to_string(),
            failures,
            output: output.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for FlakyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "fails, then answers"
    }

    fn input_schema(&self) -> JsonValue {
        json!({ "type": "object" })
    }

    async fn execute(&self, _input: JsonValue) -> Result<ToolResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::ToolExecution("upstream 503".into()));
        }
        Ok(ToolResult::success(self.output.clone()))
    }
}

/// Synthesizer that answers, fails or hangs
pub enum ScriptedSynthesizer {
    Reply(String),
    Fail,
    Hang,
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, _request: SynthesisRequest<'_>) -> Result<String> {
        match self {
            ScriptedSynthesizer::Reply(text) => Ok(text.clone()),
            ScriptedSynthesizer::Fail => Err(Error::ClassifierUnavailable("rate limited".into())),
            ScriptedSynthesizer::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}
