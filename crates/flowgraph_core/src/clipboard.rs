// SPDX-License-Identifier: MIT OR Apache-2.0
//! Copy, cut and paste of node selections.
//!
//! The clipboard holds JSON text in the graph file format, so content can
//! be exchanged with any other holder of such text.

use crate::graph::{Graph, TopologyError};
use crate::node::{NodeId, Position};
use crate::state::{GraphState, IdMode, Inserted, Serializable, StateError};
use indexmap::IndexSet;
use serde_json::Value;

impl Graph {
    /// State of the given nodes plus the edges running between them.
    ///
    /// Edges with only one end inside the selection are left out.
    pub fn selected_state(&self, selection: &[NodeId]) -> GraphState {
        let selected: Vec<_> = selection.iter().filter_map(|id| self.node(*id)).collect();
        let sockets: IndexSet<_> = selected
            .iter()
            .flat_map(|node| node.sockets().map(|s| s.id().clone()))
            .collect();
        GraphState {
            nodes: selected.iter().map(|node| node.get_state()).collect(),
            edges: self
                .edges()
                .filter(|edge| sockets.contains(edge.start()) && sockets.contains(edge.end()))
                .map(|edge| edge.get_state())
                .collect(),
        }
    }
}

/// Text clipboard for graph selections
#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    contents: Option<String>,
}

impl Clipboard {
    /// Create an empty clipboard
    pub fn new() -> Self {
        Self::default()
    }

    /// Current text, if any
    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }

    /// Replace the text, for example with content from the system clipboard
    pub fn set_contents(&mut self, text: impl Into<String>) {
        self.contents = Some(text.into());
    }

    /// Copy the selected nodes and the edges between them
    pub fn copy(&mut self, graph: &Graph, selection: &[NodeId]) -> Result<(), StateError> {
        let state = graph.selected_state(selection);
        tracing::debug!(
            "Copied {} nodes and {} edges",
            state.nodes.len(),
            state.edges.len()
        );
        self.contents = Some(state.to_json()?);
        Ok(())
    }

    /// Copy the selected nodes, then remove them from the graph
    pub fn cut(&mut self, graph: &mut Graph, selection: &[NodeId]) -> Result<(), StateError> {
        self.copy(graph, selection)?;
        for node in selection {
            match graph.remove_node(*node) {
                Ok(_) | Err(TopologyError::NodeNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Add the clipboard content to the graph with fresh socket ids, centred on `anchor`.
    ///
    /// Returns `None` if the clipboard is empty or does not hold a graph selection.
    pub fn paste(&self, graph: &mut Graph, anchor: Position) -> Result<Option<Inserted>, StateError> {
        let Some(text) = self.contents.as_deref() else {
            return Ok(None);
        };
        let Some(state) = parse_selection(text) else {
            tracing::debug!("Clipboard does not hold a graph selection");
            return Ok(None);
        };

        let inserted = graph.insert_state(&state, IdMode::Fresh)?;
        if inserted.nodes.is_empty() {
            return Ok(Some(inserted));
        }

        let positions: Vec<Position> = inserted
            .nodes
            .iter()
            .filter_map(|id| graph.node(*id))
            .map(|node| node.position())
            .collect();
        let (min_x, max_x) = bounds(positions.iter().map(|p| p.x));
        let (min_y, max_y) = bounds(positions.iter().map(|p| p.y));
        let offset_x = anchor.x - (min_x + max_x) / 2.0;
        let offset_y = anchor.y - (min_y + max_y) / 2.0;
        for (id, position) in inserted.nodes.iter().zip(positions) {
            graph.set_position(*id, Position::new(position.x + offset_x, position.y + offset_y))?;
        }
        Ok(Some(inserted))
    }
}

/// Parse clipboard text, requiring both the `nodes` and `edges` keys
fn parse_selection(text: &str) -> Option<GraphState> {
    let value: Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    if !object.contains_key("nodes") || !object.contains_key("edges") {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::calculator::{self, CONSTANT, OPERATION};

    fn ids_with_code(graph: &Graph, code: crate::NodeCode) -> Vec<NodeId> {
        graph.nodes().filter(|n| n.code() == code).map(|n| n.id()).collect()
    }

    #[test]
    fn test_selection_keeps_only_internal_edges() {
        let graph = calculator::example_graph().unwrap();
        let mut selection = ids_with_code(&graph, CONSTANT);
        selection.extend(ids_with_code(&graph, OPERATION));

        let state = graph.selected_state(&selection);
        assert_eq!(state.nodes.len(), 2);
        assert_eq!(state.edges.len(), 1);
    }

    #[test]
    fn test_copy_paste_uses_fresh_ids_and_anchor() {
        let mut graph = calculator::example_graph().unwrap();
        let mut selection = ids_with_code(&graph, CONSTANT);
        selection.extend(ids_with_code(&graph, OPERATION));

        let mut clipboard = Clipboard::new();
        clipboard.copy(&graph, &selection).unwrap();
        let inserted = clipboard
            .paste(&mut graph, Position::new(1000.0, 500.0))
            .unwrap()
            .unwrap();

        assert_eq!(inserted.nodes.len(), 2);
        assert_eq!(inserted.edges.len(), 1);
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 3);

        let positions: Vec<Position> = inserted
            .nodes
            .iter()
            .map(|id| graph.node(*id).unwrap().position())
            .collect();
        let (min_x, max_x) = bounds(positions.iter().map(|p| p.x));
        assert!(((min_x + max_x) / 2.0 - 1000.0).abs() < 1e-9);

        let copied = graph.node(inserted.nodes[0]).unwrap();
        let original = graph.node(selection[0]).unwrap();
        assert_ne!(
            copied.entry("Value").unwrap().socket().unwrap().id(),
            original.entry("Value").unwrap().socket().unwrap().id()
        );
    }

    #[test]
    fn test_cut_removes_nodes() {
        let mut graph = calculator::example_graph().unwrap();
        let selection = ids_with_code(&graph, CONSTANT);
        let mut clipboard = Clipboard::new();
        clipboard.cut(&mut graph, &selection).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert!(clipboard.contents().is_some());
    }

    #[test]
    fn test_paste_ignores_foreign_text() {
        let mut graph = calculator::example_graph().unwrap();
        let mut clipboard = Clipboard::new();
        assert!(clipboard.paste(&mut graph, Position::default()).unwrap().is_none());

        clipboard.set_contents("not json");
        assert!(clipboard.paste(&mut graph, Position::default()).unwrap().is_none());

        clipboard.set_contents(r#"{"nodes": []}"#);
        assert!(clipboard.paste(&mut graph, Position::default()).unwrap().is_none());
        assert_eq!(graph.node_count(), 3);
    }
}
