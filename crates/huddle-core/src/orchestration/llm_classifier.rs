//! LLM-backed classifier
//!
//! Prompts the model for small JSON documents and parses the first JSON
//! object in the reply. Transport failures and unparseable replies both
//! surface as [`Error::ClassifierUnavailable`].

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use super::classifier::{
    Classifier, ProposedSubQuery, RouteRequest, SynthesisRequest, Synthesizer, ToolCallRequest,
};
use super::conversation::ConversationBranch;
use super::registry::HandlerDescriptor;
use super::types::{Query, Role, RouteTarget, RoutingDecision};
use crate::llm::{Completion, Message};
use crate::{Error, Result};

const DECOMPOSE_SYSTEM: &str = "You split sports questions into independent sub-questions. \
Each sub-question must be answerable by exactly one of the listed handlers. \
Keep related facts about the same subject together. \
Reply with JSON only: {\"sub_queries\": [{\"query\": \"...\", \"supervisor\": \"<handler name>\"}]}";

const ROUTE_SYSTEM: &str = "You supervise a team of specialists. Read the conversation, decide \
whether it already answers the task, and otherwise pick the one team member to consult next. \
Reply with JSON only: {\"output\": \"<best answer so far>\", \"is_satisfactory\": true|false, \
\"next_node\": \"<member name or exit>\"}";

const TOOL_SYSTEM: &str = "You fill in the arguments for a single tool call. Use the conversation \
and any previous tool errors to pick correct values. \
Reply with JSON only: {\"input\": { ...arguments matching the schema... }}";

const SYNTHESIS_SYSTEM: &str = "You combine answers to sub-questions into one clear, complete \
reply to the original question. Use only the facts given. Mention any sub-question that could \
not be answered.";

#[derive(Debug, Deserialize)]
struct DecompositionReply {
    #[serde(alias = "subqueries", alias = "queries")]
    sub_queries: Vec<ProposedSubQuery>,
}

#[derive(Debug, Deserialize)]
struct RouteReply {
    #[serde(default, alias = "answer_fragment", alias = "answer")]
    output: String,
    #[serde(default, alias = "satisfactory")]
    is_satisfactory: bool,
    #[serde(default, alias = "next")]
    next_node: String,
}

/// [`Classifier`] and [`Synthesizer`] over any [`Completion`] backend
pub struct LlmClassifier {
    completion: Arc<dyn Completion>,
    persona: Option<String>,
}

impl LlmClassifier {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self {
            completion,
            persona: None,
        }
    }

    /// Domain framing prepended to every system prompt
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    fn system(&self, base: &str, instructions: Option<&str>) -> String {
        let mut system = String::new();
        if let Some(persona) = &self.persona {
            system.push_str(persona);
            system.push_str("\n\n");
        }
        system.push_str(base);
        if let Some(instructions) = instructions {
            system.push_str("\n\n");
            system.push_str(instructions);
        }
        system
    }

    async fn ask(&self, system: &str, prompt: String) -> Result<String> {
        self.completion
            .complete(Some(system), &[Message::user(prompt)])
            .await
            .map_err(|e| Error::ClassifierUnavailable(e.to_string()))
    }

    async fn ask_json<T: DeserializeOwned + Send>(&self, system: &str, prompt: String) -> Result<T> {
        let reply = self.ask(system, prompt).await?;
        debug!("Classifier reply: {}", reply);
        parse_json_reply(&reply)
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn decompose(
        &self,
        query: &Query,
        catalog: &[HandlerDescriptor],
        max_subqueries: usize,
    ) -> Result<Vec<ProposedSubQuery>> {
        let mut prompt = String::new();
        if !query.history().is_empty() {
            prompt.push_str("Conversation so far:\n");
            for turn in query.history() {
                let _ = writeln!(prompt, "[{}] {}", turn.role, turn.text);
            }
            prompt.push('\n');
        }
        let _ = writeln!(prompt, "Handlers:\n{}", render_catalog(catalog));
        let _ = writeln!(
            prompt,
            "Produce between 1 and {} sub-questions.\n\nQuestion: {}",
            max_subqueries,
            query.text()
        );

        let reply: DecompositionReply = self.ask_json(&self.system(DECOMPOSE_SYSTEM, None), prompt).await?;
        Ok(reply.sub_queries)
    }

    async fn route(&self, request: RouteRequest<'_>) -> Result<RoutingDecision> {
        let prompt = format!(
            "You are '{}'.\n\nTeam members:\n{}\nTask: {}\n\nConversation:\n{}",
            request.supervisor,
            render_catalog(request.children),
            request.subquery.text(),
            render_branch(request.branch),
        );

        let reply: RouteReply = self
            .ask_json(&self.system(ROUTE_SYSTEM, request.instructions), prompt)
            .await?;

        Ok(RoutingDecision {
            answer_fragment: reply.output,
            satisfactory: reply.is_satisfactory,
            next: RouteTarget::parse(&reply.next_node),
        })
    }

    async fn plan_tool_call(&self, request: ToolCallRequest<'_>) -> Result<JsonValue> {
        let schema = serde_json::to_string_pretty(&request.tool.input_schema)?;
        let prompt = format!(
            "You are '{}'.\n\nTool: {}\n{}\nInput schema:\n{}\n\nTask: {}\n\nConversation:\n{}",
            request.specialist,
            request.tool.name,
            request.tool.description,
            schema,
            request.subquery.text(),
            render_branch(request.branch),
        );

        let reply: JsonValue = self
            .ask_json(&self.system(TOOL_SYSTEM, request.instructions), prompt)
            .await?;

        Ok(match reply {
            JsonValue::Object(mut map) if map.contains_key("input") => {
                map.remove("input").unwrap_or(JsonValue::Null)
            }
            other => other,
        })
    }
}

#[async_trait]
impl Synthesizer for LlmClassifier {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<String> {
        let mut prompt = format!("Original question: {}\n\nSub-question results:\n", request.query.text());
        for fragment in request.fragments {
            let _ = writeln!(prompt, "Q: {}\nA: {}\n", fragment.question, fragment.answer);
        }
        if !request.failed.is_empty() {
            prompt.push_str("Could not be answered:\n");
            for failed in request.failed {
                let _ = writeln!(prompt, "- {} ({})", failed.question, failed.reason);
            }
        }
        prompt.push_str("\nProvide a comprehensive answer to the original question.");

        let system = match request.persona {
            Some(persona) => format!("{}\n\n{}", persona, SYNTHESIS_SYSTEM),
            None => self.system(SYNTHESIS_SYSTEM, None),
        };

        let reply = self.ask(&system, prompt).await?;
        Ok(reply.trim().to_string())
    }
}

fn render_catalog(catalog: &[HandlerDescriptor]) -> String {
    catalog
        .iter()
        .map(|d| format!("- {}: {}\n", d.name, d.description))
        .collect()
}

fn render_branch(branch: &ConversationBranch) -> String {
    let mut out = String::new();
    for turn in branch.turns() {
        match (&turn.author, turn.role) {
            (Some(author), Role::Routing | Role::Handler) => {
                let _ = writeln!(out, "[{} {}] {}", turn.role, author, turn.text);
            }
            _ => {
                let _ = writeln!(out, "[{}] {}", turn.role, turn.text);
            }
        }
    }
    out
}

fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let json = extract_json_object(reply)
        .ok_or_else(|| Error::ClassifierUnavailable(format!("No JSON object in reply: {}", reply)))?;
    serde_json::from_str(json)
        .map_err(|e| Error::ClassifierUnavailable(format!("Malformed classifier reply: {}", e)))
}

/// First balanced `{...}` in the text, skipping braces inside strings
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::{AnsweredFragment, HandlerName, SubQuery, Turn};
    use crate::tool::ToolDefinition;
    use std::sync::Mutex;

    struct CannedCompletion {
        replies: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl CannedCompletion {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Completion for CannedCompletion {
        async fn complete(&self, system: Option<&str>, messages: &[Message]) -> Result<String> {
            self.prompts.lock().unwrap().push((
                system.unwrap_or_default().to_string(),
                messages.iter().map(|m| m.text_content()).collect(),
            ));
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn catalog() -> Vec<HandlerDescriptor> {
        vec![
            HandlerDescriptor {
                name: HandlerName::new("game_supervisor"),
                description: "Live scores and schedules".into(),
            },
            HandlerDescriptor {
                name: HandlerName::new("player_supervisor"),
                description: "Player stats".into(),
            },
        ]
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("noise {\"a\": 1} tail"), Some("{\"a\": 1}"));
        assert_eq!(
            extract_json_object("```json\n{\"a\": {\"b\": \"}\"}}\n```"),
            Some("{\"a\": {\"b\": \"}\"}}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"open\": "), None);
    }

    #[tokio::test]
    async fn test_decompose_parses_sub_queries() {
        let completion = CannedCompletion::new(vec![Ok(r#"Sure! {"sub_queries": [
            {"query": "What's the score of the Lakers game?", "supervisor": "game_supervisor"},
            {"query": "What are LeBron James' career points per game?", "supervisor": "player_supervisor"}
        ]}"#
            .to_string())]);
        let classifier = LlmClassifier::new(completion.clone()).with_persona("You are an NBA assistant.");

        let query = Query::new("What's the Lakers score and LeBron's career ppg?");
        let proposed = classifier.decompose(&query, &catalog(), 7).await.unwrap();

        assert_eq!(proposed.len(), 2);
        assert_eq!(proposed[1].handler, "player_supervisor");

        let prompts = completion.prompts.lock().unwrap();
        assert!(prompts[0].0.starts_with("You are an NBA assistant."));
        assert!(prompts[0].1.contains("- game_supervisor: Live scores and schedules"));
        assert!(prompts[0].1.contains("between 1 and 7"));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_classifier_unavailable() {
        let completion = CannedCompletion::new(vec![Err(Error::Llm("503 Service Unavailable".into()))]);
        let classifier = LlmClassifier::new(completion);

        let err = classifier
            .decompose(&Query::new("q"), &catalog(), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ClassifierUnavailable(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_garbage_reply_becomes_classifier_unavailable() {
        let completion = CannedCompletion::new(vec![Ok("I cannot help with that.".to_string())]);
        let classifier = LlmClassifier::new(completion);

        let err = classifier
            .decompose(&Query::new("q"), &catalog(), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ClassifierUnavailable(_)));
    }

    #[tokio::test]
    async fn test_route_maps_exit_to_terminal() {
        let completion = CannedCompletion::new(vec![Ok(
            r#"{"output": "Lakers lead 58-50 at half", "is_satisfactory": true, "next_node": "exit"}"#.to_string(),
        )]);
        let classifier = LlmClassifier::new(completion);

        let supervisor = HandlerName::new("game_supervisor");
        let subquery = SubQuery::new_checked("Lakers score?".into(), supervisor.clone());
        let mut branch = ConversationBranch::from_turns(vec![Turn::user("Lakers score?")]);
        branch.push(Turn::handler("live_game_agent".into(), "LAL 58 - BOS 50"));

        let decision = classifier
            .route(RouteRequest {
                supervisor: &supervisor,
                instructions: None,
                subquery: &subquery,
                branch: &branch,
                children: &catalog(),
            })
            .await
            .unwrap();

        assert!(decision.satisfactory);
        assert_eq!(decision.next, RouteTarget::Terminal);
        assert_eq!(decision.answer_fragment, "Lakers lead 58-50 at half");
    }

    #[tokio::test]
    async fn test_plan_tool_call_unwraps_input() {
        let completion = CannedCompletion::new(vec![
            Ok(r#"{"input": {"player": "LeBron James"}}"#.to_string()),
            Ok(r#"{"player": "Stephen Curry"}"#.to_string()),
        ]);
        let classifier = LlmClassifier::new(completion);

        let specialist = HandlerName::new("player_stats_agent");
        let subquery = SubQuery::new_checked("LeBron ppg".into(), specialist.clone());
        let branch = ConversationBranch::from_turns(vec![]);
        let tool = ToolDefinition::new("player_stats", "Career stats", serde_json::json!({"type": "object"}));

        for expected in ["LeBron James", "Stephen Curry"] {
            let input = classifier
                .plan_tool_call(ToolCallRequest {
                    specialist: &specialist,
                    instructions: None,
                    subquery: &subquery,
                    branch: &branch,
                    tool: &tool,
                })
                .await
                .unwrap();
            assert_eq!(input["player"], expected);
        }
    }

    #[tokio::test]
    async fn test_synthesize_lists_fragments() {
        let completion = CannedCompletion::new(vec![Ok("  The Lakers won; LeBron averages 27.1.  ".to_string())]);
        let classifier = LlmClassifier::new(completion.clone());

        let query = Query::new("Lakers score and LeBron ppg");
        let fragments = vec![AnsweredFragment {
            question: "Lakers score".into(),
            handler: "game_supervisor".into(),
            answer: "112-104".into(),
            partial: false,
        }];

        let text = classifier
            .synthesize(SynthesisRequest {
                query: &query,
                fragments: &fragments,
                failed: &[],
                persona: None,
            })
            .await
            .unwrap();

        assert_eq!(text, "The Lakers won; LeBron averages 27.1.");
        let prompts = completion.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("Q: Lakers score\nA: 112-104"));
    }
}
