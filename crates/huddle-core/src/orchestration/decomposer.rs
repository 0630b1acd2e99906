//! Query decomposition
//!
//! Turns one user question into an ordered list of handler-bound
//! sub-queries. Everything that can go wrong here is request-fatal: no
//! branch has been started yet.

use std::sync::Arc;
use tracing::{info, warn};

use super::classifier::Classifier;
use super::registry::HandlerRegistry;
use super::types::{Query, SubQuery};
use crate::{Error, Result};

pub struct QueryDecomposer {
    classifier: Arc<dyn Classifier>,
    registry: Arc<HandlerRegistry>,
    max_subqueries: usize,
}

impl QueryDecomposer {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        registry: Arc<HandlerRegistry>,
        max_subqueries: usize,
    ) -> Self {
        Self {
            classifier,
            registry,
            max_subqueries: max_subqueries.max(1),
        }
    }

    /// Decompose a query into between 1 and `max_subqueries` sub-queries
    pub async fn decompose(&self, query: &Query) -> Result<Vec<SubQuery>> {
        if query.text().trim().is_empty() {
            return Err(Error::EmptyQuery);
        }

        let catalog = self.registry.catalog();
        let proposals = self
            .classifier
            .decompose(query, &catalog, self.max_subqueries)
            .await
            .map_err(|e| match e {
                Error::ClassifierUnavailable(_) => e,
                other => Error::ClassifierUnavailable(other.to_string()),
            })?;

        let mut subqueries = Vec::with_capacity(proposals.len().min(self.max_subqueries));
        for proposal in proposals {
            let text = proposal.text.trim();
            if text.is_empty() {
                warn!("Skipping blank sub-query for handler '{}'", proposal.handler);
                continue;
            }
            subqueries.push(self.registry.sub_query(text, &proposal.handler)?);
        }

        if subqueries.is_empty() {
            return Err(Error::EmptyDecomposition);
        }

        if subqueries.len() > self.max_subqueries {
            warn!(
                "Classifier proposed {} sub-queries, keeping the first {}",
                subqueries.len(),
                self.max_subqueries
            );
            subqueries.truncate(self.max_subqueries);
        }

        info!("Decomposed query into {} sub-queries", subqueries.len());
        Ok(subqueries)
    }
}
