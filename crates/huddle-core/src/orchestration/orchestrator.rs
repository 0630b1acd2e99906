//! Request pipeline: decompose, dispatch, aggregate

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use super::aggregator::{FinalAnswer, ResultAggregator};
use super::classifier::{Classifier, Synthesizer};
use super::decomposer::QueryDecomposer;
use super::dispatcher::{ConcurrentDispatcher, DispatchConfig};
use super::registry::HandlerRegistry;
use super::types::{ExecutionResult, Query};
use crate::config::OrchestrationConfig;
use crate::{Error, Result};

/// Everything produced for one query
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub request_id: Uuid,
    pub answer: FinalAnswer,
    /// One per sub-query, in decomposition order
    pub results: Vec<ExecutionResult>,
    pub elapsed_ms: u64,
}

/// Entry point for answering user queries
pub struct Orchestrator {
    registry: Arc<HandlerRegistry>,
    decomposer: QueryDecomposer,
    dispatcher: ConcurrentDispatcher,
    aggregator: ResultAggregator,
}

impl Orchestrator {
    pub fn builder(registry: Arc<HandlerRegistry>, classifier: Arc<dyn Classifier>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            classifier,
            synthesizer: None,
            config: OrchestrationConfig::default(),
            persona: None,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Answer a query with no external cancellation
    pub async fn answer(&self, query: &Query) -> Result<Response> {
        self.answer_with_cancel(query, CancellationToken::new()).await
    }

    /// Answer a query; cancelling `cancel` stops outstanding branches
    ///
    /// Only decomposition errors fail the request. Once sub-queries exist a
    /// [`Response`] is always returned.
    pub async fn answer_with_cancel(&self, query: &Query, cancel: CancellationToken) -> Result<Response> {
        let request_id = Uuid::now_v7();
        let span = info_span!(
            "request",
            %request_id,
            conversation_id = %query.conversation_id(),
        );

        async {
            let start_time = Instant::now();
            info!("Answering query: {}", query.text());

            let subqueries = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                subqueries = self.decomposer.decompose(query) => subqueries?,
            };

            let results = self.dispatcher.dispatch(query, subqueries, cancel).await;
            let answer = self.aggregator.aggregate(query, &results).await;

            let elapsed_ms = start_time.elapsed().as_millis() as u64;
            info!(
                mode = ?answer.mode,
                answered = answer.answered,
                failed = answer.failed.len(),
                elapsed_ms,
                "Query answered"
            );

            Ok(Response {
                request_id,
                answer,
                results,
                elapsed_ms,
            })
        }
        .instrument(span)
        .await
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    registry: Arc<HandlerRegistry>,
    classifier: Arc<dyn Classifier>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    config: OrchestrationConfig,
    persona: Option<String>,
}

impl OrchestratorBuilder {
    pub fn synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn config(mut self, config: OrchestrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let decomposer = QueryDecomposer::new(
            self.classifier,
            Arc::clone(&self.registry),
            self.config.max_subqueries,
        );
        let dispatcher = ConcurrentDispatcher::new(
            Arc::clone(&self.registry),
            DispatchConfig {
                max_concurrency: self.config.max_concurrency,
                deadline: Some(self.config.dispatch_deadline()),
            },
        );
        let aggregator = ResultAggregator::new(self.synthesizer, self.config.synthesis_timeout())
            .with_persona(self.persona);

        Ok(Orchestrator {
            registry: self.registry,
            decomposer,
            dispatcher,
            aggregator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::testing::{ScriptedClassifier, ScriptedSynthesizer, StaticHandler};
    use crate::orchestration::{AggregationMode, FailureKind, ProposedSubQuery};

    fn registry() -> Arc<HandlerRegistry> {
        Arc::new(
            HandlerRegistry::builder()
                .register(Arc::new(StaticHandler::new("game_supervisor", "Lakers 112, Celtics 104")))
                .unwrap()
                .register(Arc::new(StaticHandler::failing(
                    "player_supervisor",
                    FailureKind::Exhausted,
                )))
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_answer_runs_full_pipeline() {
        let classifier = ScriptedClassifier::new().with_decomposition(vec![
            ProposedSubQuery::new("What's the score of the Lakers game?", "game_supervisor"),
            ProposedSubQuery::new("What are LeBron James' career points per game?", "player_supervisor"),
        ]);
        let orchestrator = Orchestrator::builder(registry(), Arc::new(classifier))
            .synthesizer(Arc::new(ScriptedSynthesizer::Reply("Lakers won 112-104.".into())))
            .build()
            .unwrap();

        let response = orchestrator
            .answer(&Query::new("What's the Lakers score and LeBron's career ppg?"))
            .await
            .unwrap();

        assert_eq!(response.results.len(), 2);
        assert!(response.results[0].is_success());
        assert_eq!(response.results[1].error().unwrap().kind, FailureKind::Exhausted);
        assert_eq!(response.answer.mode, AggregationMode::Synthesized);
        assert_eq!(response.answer.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_decomposition_failure_fails_request() {
        let orchestrator = Orchestrator::builder(registry(), Arc::new(ScriptedClassifier::new().failing_decomposition()))
            .build()
            .unwrap();

        let err = orchestrator.answer(&Query::new("Who won?")).await.unwrap_err();
        assert!(matches!(err, Error::ClassifierUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_decomposition() {
        let orchestrator = Orchestrator::builder(registry(), Arc::new(ScriptedClassifier::new()))
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator
            .answer_with_cancel(&Query::new("Who won?"), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = OrchestrationConfig {
            max_hops: 0,
            ..OrchestrationConfig::default()
        };

        let result = Orchestrator::builder(registry(), Arc::new(ScriptedClassifier::new()))
            .config(config)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
