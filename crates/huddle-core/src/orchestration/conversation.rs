//! Per-branch conversation state
//!
//! Every sub-query runs against its own [`ConversationBranch`]. Branches share
//! the read-only history of the originating query and own everything appended
//! after that, so concurrent branches never see each other's messages.

use std::sync::Arc;

use super::types::{Query, Turn};

/// Copy-on-fork conversation view
#[derive(Debug, Clone)]
pub struct ConversationBranch {
    prefix: Arc<[Turn]>,
    local: Vec<Turn>,
}

impl ConversationBranch {
    /// Branch rooted at a query's history
    pub fn root(query: &Query) -> Self {
        Self {
            prefix: query.shared_history(),
            local: Vec::new(),
        }
    }

    /// Branch over an explicit set of turns
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self {
            prefix: Arc::from(turns),
            local: Vec::new(),
        }
    }

    /// Snapshot this branch for a child handler
    ///
    /// The child sees everything up to this point; its appends stay local to it.
    pub fn fork(&self) -> Self {
        if self.local.is_empty() {
            return Self {
                prefix: Arc::clone(&self.prefix),
                local: Vec::new(),
            };
        }

        let turns: Vec<Turn> = self.turns().cloned().collect();
        Self::from_turns(turns)
    }

    pub fn push(&mut self, turn: Turn) {
        self.local.push(turn);
    }

    /// All turns, shared prefix first
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.prefix.iter().chain(self.local.iter())
    }

    /// Turns appended to this branch since it was created or forked
    pub fn local_turns(&self) -> &[Turn] {
        &self.local
    }

    pub fn last(&self) -> Option<&Turn> {
        self.local.last().or_else(|| self.prefix.last())
    }

    pub fn len(&self) -> usize {
        self.prefix.len() + self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
