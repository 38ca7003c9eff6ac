// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo history of graph snapshots.
//!
//! Every stored change is a full [`GraphState`] of the graph after the
//! change. Undo and redo restore a neighbouring snapshot with preserved
//! socket ids.

use crate::graph::Graph;
use crate::state::{GraphState, IdMode, RestoreReport, Serializable, StateError};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Description of the snapshot taken when a history is created or reset
pub const INITIAL_DESCRIPTION: &str = "Initial";

/// History errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// History is disabled
    #[error("History is disabled")]
    Disabled,

    /// Restoring a snapshot failed
    #[error("Failed to restore snapshot: {0}")]
    Restore(#[from] StateError),
}

/// Result type for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// A stored graph state
#[derive(Debug, Clone)]
pub struct HistoryStamp {
    /// Human-readable description of the change
    pub description: String,
    /// Graph state after the change
    pub snapshot: GraphState,
    /// Timestamp, seconds since the Unix epoch
    pub timestamp: u64,
}

impl HistoryStamp {
    fn new(description: impl Into<String>, snapshot: GraphState) -> Self {
        Self {
            description: description.into(),
            snapshot,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Undo/redo history manager
#[derive(Debug)]
pub struct History {
    stack: VecDeque<HistoryStamp>,
    current: usize,
    limit: usize,
    enabled: bool,
}

impl History {
    /// Create a history starting from the current state of the graph.
    ///
    /// Keeps at most `history_limit` snapshots from the graph's settings.
    pub fn new(graph: &Graph) -> Self {
        Self::with_limit(graph, graph.config().history_limit)
    }

    /// Create with a custom maximum number of snapshots
    pub fn with_limit(graph: &Graph, limit: usize) -> Self {
        let mut stack = VecDeque::new();
        stack.push_back(HistoryStamp::new(INITIAL_DESCRIPTION, graph.get_state()));
        Self {
            stack,
            current: 0,
            limit: limit.max(1),
            enabled: true,
        }
    }

    /// Whether changes are stored and restored
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn storing and restoring on or off
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Store the current state of the graph after a change.
    ///
    /// Discards anything that could have been redone.
    pub fn store_change(&mut self, graph: &Graph, description: impl Into<String>) {
        if !self.enabled {
            return;
        }
        self.stack.truncate(self.current + 1);
        self.stack.push_back(HistoryStamp::new(description, graph.get_state()));
        while self.stack.len() > self.limit {
            self.stack.pop_front();
        }
        self.current = self.stack.len() - 1;
    }

    /// Revert the last change
    pub fn undo(&mut self, graph: &mut Graph) -> Result<RestoreReport> {
        if !self.enabled {
            return Err(HistoryError::Disabled);
        }
        if !self.can_undo() {
            return Err(HistoryError::NothingToUndo);
        }
        self.current -= 1;
        self.restore(graph)
    }

    /// Restore the last undone change
    pub fn redo(&mut self, graph: &mut Graph) -> Result<RestoreReport> {
        if !self.enabled {
            return Err(HistoryError::Disabled);
        }
        if !self.can_redo() {
            return Err(HistoryError::NothingToRedo);
        }
        self.current += 1;
        self.restore(graph)
    }

    fn restore(&self, graph: &mut Graph) -> Result<RestoreReport> {
        let stamp = &self.stack[self.current];
        tracing::debug!("Restoring history step '{}'", stamp.description);
        Ok(graph.set_state(&stamp.snapshot, IdMode::Preserve)?)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.stack.len()
    }

    /// Index of the current snapshot
    pub fn current_step(&self) -> usize {
        self.current
    }

    /// Descriptions of all stored snapshots, oldest first
    pub fn descriptions(&self) -> Vec<&str> {
        self.stack.iter().map(|stamp| stamp.description.as_str()).collect()
    }

    /// Get the description of the change that would be undone
    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo()
            .then(|| self.stack[self.current].description.as_str())
    }

    /// Get the description of the change that would be redone
    pub fn redo_description(&self) -> Option<&str> {
        self.stack
            .get(self.current + 1)
            .map(|stamp| stamp.description.as_str())
    }

    /// Drop all snapshots and start again from the current state of the graph
    pub fn reset(&mut self, graph: &Graph) {
        self.stack.clear();
        self.stack
            .push_back(HistoryStamp::new(INITIAL_DESCRIPTION, graph.get_state()));
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::calculator::{self, CONSTANT, OUTPUT};
    use serde_json::json;

    #[test]
    fn test_undo_redo() {
        let mut graph = calculator::example_graph().unwrap();
        let mut history = History::new(&graph);
        assert!(!history.can_undo());

        let constant = graph.create_node(CONSTANT).unwrap();
        history.store_change(&graph, "Add constant");
        graph.set_entry_value(constant, "Value", json!(7)).unwrap();
        history.store_change(&graph, "Edit constant");
        assert_eq!(history.descriptions(), ["Initial", "Add constant", "Edit constant"]);
        assert_eq!(history.undo_description(), Some("Edit constant"));

        history.undo(&mut graph).unwrap();
        let value = graph
            .nodes()
            .filter(|n| n.code() == CONSTANT)
            .last()
            .unwrap()
            .entry("Value")
            .unwrap()
            .widget_value();
        assert_eq!(value.as_f64(), Some(0.0));

        history.undo(&mut graph).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert!(matches!(history.undo(&mut graph), Err(HistoryError::NothingToUndo)));

        history.redo(&mut graph).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(history.redo_description(), Some("Edit constant"));
    }

    #[test]
    fn test_store_discards_redo() {
        let mut graph = calculator::example_graph().unwrap();
        let mut history = History::new(&graph);
        graph.create_node(CONSTANT).unwrap();
        history.store_change(&graph, "A");
        history.undo(&mut graph).unwrap();
        graph.create_node(OUTPUT).unwrap();
        history.store_change(&graph, "B");
        assert_eq!(history.descriptions(), ["Initial", "B"]);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_limit() {
        let graph = calculator::example_graph().unwrap();
        let mut history = History::with_limit(&graph, 3);
        for i in 0..5 {
            history.store_change(&graph, format!("Change {i}"));
        }
        assert_eq!(history.descriptions(), ["Change 2", "Change 3", "Change 4"]);
        assert_eq!(history.current_step(), 2);
    }

    #[test]
    fn test_undo_keeps_graph_evaluable() {
        let mut graph = calculator::example_graph().unwrap();
        let mut history = History::new(&graph);
        let ids: Vec<_> = graph.node_ids().collect();
        graph.remove_node(ids[0]).unwrap();
        history.store_change(&graph, "Remove");
        history.undo(&mut graph).unwrap();
        assert_eq!(graph.evaluate_blocking().unwrap()["Value 1"].as_f64(), Some(8.0));
    }

    #[test]
    fn test_disabled_history() {
        let mut graph = calculator::example_graph().unwrap();
        let mut history = History::new(&graph);
        history.set_enabled(false);
        history.store_change(&graph, "Ignored");
        assert_eq!(history.descriptions(), ["Initial"]);
        assert!(matches!(history.undo(&mut graph), Err(HistoryError::Disabled)));
    }
}
