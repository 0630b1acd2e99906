//! Concurrent dispatch
//!
//! Runs every sub-query's handler on its own branch, at most
//! `max_concurrency` at a time, and always returns exactly one
//! [`ExecutionResult`] per sub-query in request order.

use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{Id as TaskId, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::conversation::ConversationBranch;
use super::registry::HandlerRegistry;
use super::types::{BranchFailure, ExecutionResult, FailureKind, Query, SubQuery, Turn};

/// Dispatch limits
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_concurrency: usize,
    /// Outer deadline for the whole dispatch; `None` waits for every branch
    pub deadline: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            deadline: Some(Duration::from_secs(120)),
        }
    }
}

pub struct ConcurrentDispatcher {
    registry: Arc<HandlerRegistry>,
    config: DispatchConfig,
}

impl ConcurrentDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, config: DispatchConfig) -> Self {
        Self { registry, config }
    }

    /// Run all sub-queries and collect their results in input order
    ///
    /// Never fails as a whole: branch errors, cancellation, deadline expiry
    /// and task panics all become failed [`ExecutionResult`]s.
    pub async fn dispatch(
        &self,
        query: &Query,
        subqueries: Vec<SubQuery>,
        cancel: CancellationToken,
    ) -> Vec<ExecutionResult> {
        let total = subqueries.len();
        let start_time = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let cancel = cancel.child_token();
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();

        let mut slots: Vec<Option<ExecutionResult>> = vec![None; total];
        let mut join_set = JoinSet::new();
        let mut task_slots: HashMap<TaskId, usize> = HashMap::new();

        for (index, subquery) in subqueries.iter().enumerate() {
            let handler = match self.registry.resolve(subquery.handler().as_str()) {
                Ok(handler) => handler,
                Err(e) => {
                    let failure = BranchFailure::new(
                        FailureKind::InvalidHandlerReference,
                        Some(subquery.handler().clone()),
                        e.to_string(),
                    );
                    slots[index] = Some(ExecutionResult::failed(subquery.clone(), failure));
                    continue;
                }
            };

            let mut branch = ConversationBranch::root(query);
            branch.push(Turn::user(format!("{} Today is: {}", subquery.text(), today)));

            let subquery = subquery.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let span = info_span!("branch", index, handler = %subquery.handler());

            let handle = join_set.spawn(
                async move {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => Err(BranchFailure::cancelled(subquery.handler())),
                        outcome = async {
                            let _permit = match semaphore.acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => return Err(BranchFailure::cancelled(subquery.handler())),
                            };
                            debug!("Branch started");
                            handler.run(&subquery, branch).await
                        } => outcome,
                    };

                    let result = match outcome {
                        Ok(answer) => ExecutionResult::answered(subquery, answer),
                        Err(failure) => ExecutionResult::failed(subquery, failure),
                    };
                    (index, result)
                }
                .instrument(span),
            );
            task_slots.insert(handle.id(), index);
        }

        let deadline = async {
            match self.config.deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        let mut deadline_hit = false;

        loop {
            tokio::select! {
                joined = join_set.join_next() => match joined {
                    Some(Ok((index, result))) => slots[index] = Some(result),
                    Some(Err(e)) => {
                        error!("Branch task failed: {}", e);
                        if let Some(&index) = task_slots.get(&e.id()) {
                            let subquery = &subqueries[index];
                            let failure = if e.is_panic() {
                                BranchFailure::new(
                                    FailureKind::TaskPanicked,
                                    Some(subquery.handler().clone()),
                                    e.to_string(),
                                )
                            } else {
                                BranchFailure::cancelled(subquery.handler())
                            };
                            slots[index] = Some(ExecutionResult::failed(subquery.clone(), failure));
                        }
                    }
                    None => break,
                },
                _ = &mut deadline, if !deadline_hit => {
                    warn!("Dispatch deadline reached, cancelling outstanding branches");
                    deadline_hit = true;
                    cancel.cancel();
                }
            }
        }

        let cancelled = cancel.is_cancelled();
        let results: Vec<ExecutionResult> = slots
            .into_iter()
            .zip(subqueries)
            .map(|(slot, subquery)| {
                slot.unwrap_or_else(|| {
                    let failure = if cancelled {
                        BranchFailure::cancelled(subquery.handler())
                    } else {
                        BranchFailure::new(
                            FailureKind::TaskPanicked,
                            Some(subquery.handler().clone()),
                            "branch task terminated unexpectedly",
                        )
                    };
                    ExecutionResult::failed(subquery, failure)
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            "Dispatched {} sub-queries: {} answered, {} failed in {}ms",
            total,
            succeeded,
            total - succeeded,
            start_time.elapsed().as_millis()
        );

        results
    }
}
