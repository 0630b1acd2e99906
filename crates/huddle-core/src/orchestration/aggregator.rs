//! Result aggregation
//!
//! Merges per-branch results into the final answer. Synthesis failures
//! never fail the request: the aggregator falls back to a deterministic
//! join of the successful answers and names the branches that failed.

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::classifier::{AnsweredFragment, FailedSubQuery, SynthesisRequest, Synthesizer};
use super::types::{ExecutionResult, Outcome, Query};

/// How the final text was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    Synthesized,
    DeterministicJoin,
}

/// Single reply delivered to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalAnswer {
    pub text: String,
    pub mode: AggregationMode,
    pub answered: usize,
    pub failed: Vec<FailedSubQuery>,
}

pub struct ResultAggregator {
    synthesizer: Option<Arc<dyn Synthesizer>>,
    timeout: Duration,
    persona: Option<String>,
}

impl ResultAggregator {
    pub fn new(synthesizer: Option<Arc<dyn Synthesizer>>, timeout: Duration) -> Self {
        Self {
            synthesizer,
            timeout,
            persona: None,
        }
    }

    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona;
        self
    }

    pub async fn aggregate(&self, query: &Query, results: &[ExecutionResult]) -> FinalAnswer {
        let (fragments, failed) = partition(results);

        if fragments.is_empty() {
            warn!("No sub-query produced an answer");
            return deterministic_join(&fragments, failed);
        }

        let Some(synthesizer) = &self.synthesizer else {
            return deterministic_join(&fragments, failed);
        };

        let request = SynthesisRequest {
            query,
            fragments: &fragments,
            failed: &failed,
            persona: self.persona.as_deref(),
        };

        match tokio::time::timeout(self.timeout, synthesizer.synthesize(request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                info!("Synthesized final answer from {} fragments", fragments.len());
                FinalAnswer {
                    text,
                    mode: AggregationMode::Synthesized,
                    answered: fragments.len(),
                    failed,
                }
            }
            Ok(Ok(_)) => {
                warn!("Synthesizer returned empty text, joining fragments");
                deterministic_join(&fragments, failed)
            }
            Ok(Err(e)) => {
                warn!("Synthesis failed, joining fragments: {}", e);
                deterministic_join(&fragments, failed)
            }
            Err(_) => {
                warn!("Synthesis timed out after {:?}, joining fragments", self.timeout);
                deterministic_join(&fragments, failed)
            }
        }
    }
}

fn partition(results: &[ExecutionResult]) -> (Vec<AnsweredFragment>, Vec<FailedSubQuery>) {
    let mut fragments = Vec::new();
    let mut failed = Vec::new();

    for result in results {
        match &result.outcome {
            Outcome::Answered(answer) => fragments.push(AnsweredFragment {
                question: result.subquery.text().to_string(),
                handler: result.subquery.handler().clone(),
                answer: answer.text.clone(),
                partial: answer.is_partial(),
            }),
            Outcome::Failed(failure) => failed.push(FailedSubQuery {
                question: result.subquery.text().to_string(),
                handler: result.subquery.handler().clone(),
                reason: failure.to_string(),
            }),
        }
    }

    (fragments, failed)
}

/// Numbered answers in request order, followed by what could not be retrieved
fn deterministic_join(fragments: &[AnsweredFragment], failed: Vec<FailedSubQuery>) -> FinalAnswer {
    let mut text = String::new();

    if fragments.is_empty() {
        text.push_str("Sorry, none of the parts of your question could be answered.\n");
    }

    for (i, fragment) in fragments.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", i + 1, fragment.question);
        let _ = writeln!(text, "   {}", fragment.answer.trim());
        if fragment.partial {
            text.push_str("   (partial answer)\n");
        }
    }

    if !failed.is_empty() {
        if !fragments.is_empty() {
            text.push('\n');
        }
        text.push_str("Could not retrieve:\n");
        for f in &failed {
            let _ = writeln!(text, "- {} ({})", f.question, f.reason);
        }
    }

    FinalAnswer {
        text: text.trim_end().to_string(),
        mode: AggregationMode::DeterministicJoin,
        answered: fragments.len(),
        failed,
    }
}
