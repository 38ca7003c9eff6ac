// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation and execution.
//!
//! Evaluation is pull based: the result of a graph is the set of input
//! values of its output node, and each connected input pulls the output of
//! the node upstream of it. Node outputs are cached, so a node feeding
//! several others is computed once per run.

use crate::entry::EntryRef;
use crate::graph::Graph;
use crate::node::{EntryValues, NodeCode, NodeError, NodeId, Outputs, OutputWriter};
use indexmap::IndexSet;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

/// Error during evaluation
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// Graph contains a cycle; holds the titles of the nodes on it
    #[error("Graph contains a cycle through {}", .0.join(" -> "))]
    CyclicGraph(Vec<String>),

    /// No output node type was chosen
    #[error("No output node type is set")]
    NoOutputTypeSet,

    /// The output node type has no instance in the graph
    #[error("No node with output code {0} in the graph")]
    NoOutputInstance(NodeCode),

    /// The output node type has more than one instance
    #[error("{count} nodes with output code {code} in the graph, expected one")]
    MultipleOutputInstances {
        /// Output code
        code: NodeCode,
        /// Number of instances
        count: usize,
    },

    /// A node did not set one of its outputs
    #[error("Node '{node}' did not set a value for output '{entry}'")]
    IncompleteOutput {
        /// Node title
        node: String,
        /// Output entry name
        entry: String,
    },

    /// The logic of a node failed
    #[error("Node '{node}' failed: {source}")]
    Node {
        /// Node title
        node: String,
        /// Error raised by the node
        #[source]
        source: NodeError,
    },

    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Entry not found
    #[error("Node '{node}' has no entry {entry}")]
    EntryNotFound {
        /// Node title
        node: String,
        /// Requested entry
        entry: EntryRef,
    },

    /// Dependency chain deeper than the configured limit
    #[error("Evaluation exceeded the maximum depth of {0}")]
    DepthLimitExceeded(usize),

    /// The run was superseded by a newer one
    #[error("Evaluation was cancelled")]
    Cancelled,

    /// User code panicked
    #[error("Evaluation panicked: {0}")]
    Panicked(String),
}

/// Callback invoked after each node is computed
pub type ProgressFn<'a> = Box<dyn FnMut(NodeId) + 'a>;

/// Context for graph evaluation
pub struct EvaluationContext<'a> {
    /// The graph being evaluated
    pub graph: &'a Graph,
    max_depth: usize,
    cancel: Option<&'a AtomicBool>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context using the graph's depth limit
    pub fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            max_depth: graph.config().max_evaluation_depth,
            cancel: None,
            progress: None,
        }
    }

    /// Stop at the next node boundary once `flag` is set
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Report every computed node
    pub fn with_progress(mut self, progress: impl FnMut(NodeId) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Override the depth limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Evaluate the graph.
    ///
    /// Rejects cycles before touching any node, clears every cache, then
    /// returns the value of each input entry of the output node by name.
    pub fn run(&mut self) -> Result<Outputs, EvaluationError> {
        if let Some(cycle) = self.graph.build_dependency_graph().find_cycle() {
            return Err(EvaluationError::CyclicGraph(self.titles(&cycle)));
        }
        self.graph.invalidate_all();

        let output = self.graph.find_output_node()?;
        let graph = self.graph;
        let node = graph
            .node(output)
            .ok_or(EvaluationError::NodeNotFound(output))?;
        tracing::debug!("Evaluating graph at output node '{}'", node.title());

        let mut result = Outputs::new();
        for entry in node.entries().iter().filter(|e| e.is_input()) {
            let value = self.calculate_value(output, &EntryRef::Name(entry.name().to_string()))?;
            result.insert(entry.name().to_string(), value);
        }
        Ok(result)
    }

    /// Current value of an entry.
    ///
    /// Static and output entries and unconnected inputs read their widget.
    /// A connected input reads the matching output of the node at the other
    /// end of its first edge, computing that node if needed.
    pub fn calculate_value(&mut self, node_id: NodeId, entry: &EntryRef) -> Result<Value, EvaluationError> {
        let graph = self.graph;
        let node = graph
            .node(node_id)
            .ok_or(EvaluationError::NodeNotFound(node_id))?;
        let entry = node
            .entries()
            .resolve(entry)
            .ok_or_else(|| EvaluationError::EntryNotFound {
                node: node.title().to_string(),
                entry: entry.clone(),
            })?;

        let Some((source, source_entry)) = graph.input_source(entry) else {
            return Ok(entry.widget_value());
        };
        let outputs = self.output(source.id())?;
        outputs
            .get(source_entry.name())
            .cloned()
            .ok_or_else(|| EvaluationError::IncompleteOutput {
                node: source.title().to_string(),
                entry: source_entry.name().to_string(),
            })
    }

    /// Outputs of a node, computing it and everything it depends on if not cached.
    ///
    /// Dependencies are resolved with an explicit work stack, so chain length
    /// is bounded by the depth limit rather than the thread stack.
    pub fn output(&mut self, node_id: NodeId) -> Result<Outputs, EvaluationError> {
        let graph = self.graph;
        // (node, length of the dependency chain down to it, inputs pushed)
        let mut stack: Vec<(NodeId, usize, bool)> = vec![(node_id, 1, false)];
        let mut path: IndexSet<NodeId> = IndexSet::new();

        while let Some(&(current, depth, expanded)) = stack.last() {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                return Err(EvaluationError::Cancelled);
            }
            let node = graph
                .node(current)
                .ok_or(EvaluationError::NodeNotFound(current))?;

            if node.is_cached() {
                if expanded {
                    path.shift_remove(&current);
                }
                stack.pop();
                continue;
            }

            if expanded {
                self.evaluate_node(current)?;
                path.shift_remove(&current);
                stack.pop();
                continue;
            }

            if depth > self.max_depth {
                return Err(EvaluationError::DepthLimitExceeded(self.max_depth));
            }
            if let Some(last) = stack.last_mut() {
                last.2 = true;
            }
            path.insert(current);

            let mut sources: IndexSet<NodeId> = IndexSet::new();
            for entry in node.entries() {
                let Some((source, _)) = graph.input_source(entry) else {
                    continue;
                };
                if source.is_cached() || !sources.insert(source.id()) {
                    continue;
                }
                if let Some(start) = path.get_index_of(&source.id()) {
                    let cycle: Vec<NodeId> = path.iter().skip(start).copied().collect();
                    return Err(EvaluationError::CyclicGraph(self.titles(&cycle)));
                }
                stack.push((source.id(), depth + 1, false));
            }
        }

        graph
            .node(node_id)
            .and_then(|node| node.cached_output())
            .ok_or(EvaluationError::NodeNotFound(node_id))
    }

    /// Compute a single node whose dependencies are available
    fn evaluate_node(&mut self, node_id: NodeId) -> Result<Outputs, EvaluationError> {
        let graph = self.graph;
        let node = graph
            .node(node_id)
            .ok_or(EvaluationError::NodeNotFound(node_id))?;

        let mut values = EntryValues::new();
        for (index, entry) in node.entries().iter().enumerate() {
            let value = self.calculate_value(node_id, &EntryRef::Index(index))?;
            values.insert(entry.name().to_string(), value);
        }

        let mut writer = OutputWriter::new(node.entries());
        node.logic()
            .evaluate(&values, &mut writer)
            .map_err(|source| EvaluationError::Node {
                node: node.title().to_string(),
                source,
            })?;
        let outputs = writer
            .finish()
            .map_err(|entry| EvaluationError::IncompleteOutput {
                node: node.title().to_string(),
                entry,
            })?;

        tracing::debug!("Evaluated node '{}'", node.title());
        node.store_output(outputs.clone());
        if let Some(progress) = self.progress.as_mut() {
            progress(node_id);
        }
        Ok(outputs)
    }

    fn titles(&self, nodes: &[NodeId]) -> Vec<String> {
        nodes
            .iter()
            .filter_map(|id| self.graph.node(*id))
            .map(|node| node.title().to_string())
            .collect()
    }
}

impl Graph {
    /// Evaluate the graph on the calling thread
    pub fn evaluate_blocking(&self) -> Result<Outputs, EvaluationError> {
        EvaluationContext::new(self).run()
    }

    /// Outputs of a node, computed on demand and cached
    pub fn node_output(&self, node_id: NodeId) -> Result<Outputs, EvaluationError> {
        EvaluationContext::new(self).output(node_id)
    }

    /// Current value of an entry, computing upstream nodes on demand
    pub fn calculate_value(&self, node_id: NodeId, entry: impl Into<EntryRef>) -> Result<Value, EvaluationError> {
        EvaluationContext::new(self).calculate_value(node_id, &entry.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::entry::EntryError;
    use crate::graphs::calculator::{self, CONSTANT, OPERATION, OUTPUT, SQUARE_ROOT};
    use crate::node::{Node, NodeBuilder, NodeLogic};
    use crate::registry::{Namespace, NodeRegistry, NodeType};
    use crate::widget::ValueBox;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn calculator_graph() -> Graph {
        let mut graph = Graph::new(Arc::new(calculator::create_calculator_registry().unwrap()));
        graph.set_output_type(Some(OUTPUT)).unwrap();
        graph
    }

    #[test]
    fn test_constant_add_output() {
        let graph = calculator::example_graph().unwrap();
        let result = graph.evaluate_blocking().unwrap();
        assert_eq!(result.get("Value 1").and_then(Value::as_f64), Some(8.0));
    }

    #[test]
    fn test_unconnected_inputs_use_widget_values() {
        let mut graph = calculator_graph();
        let out = graph.create_node(OUTPUT).unwrap();
        let result = graph.evaluate_blocking().unwrap();
        assert_eq!(result.get("Value 1"), Some(&Value::Null));
        assert_eq!(result.len(), 2);
        assert!(graph.node(out).is_some());
    }

    #[test]
    fn test_missing_output_instance() {
        let mut graph = calculator_graph();
        graph.create_node(CONSTANT).unwrap();
        assert!(matches!(
            graph.evaluate_blocking(),
            Err(EvaluationError::NoOutputInstance(_))
        ));
    }

    #[test]
    fn test_cycle_rejected_before_evaluation() {
        let mut graph = calculator_graph();
        let a = graph.create_node(OPERATION).unwrap();
        let b = graph.create_node(OPERATION).unwrap();
        let out = graph.create_node(OUTPUT).unwrap();
        graph.connect_entries(a, "Output", b, "Value 1").unwrap();
        graph.connect_entries(b, "Output", a, "Value 1").unwrap();
        graph.connect_entries(b, "Output", out, "Value 1").unwrap();

        match graph.evaluate_blocking() {
            Err(EvaluationError::CyclicGraph(titles)) => assert_eq!(titles.len(), 2),
            other => panic!("expected a cycle, got {other:?}"),
        }
        assert!(graph.nodes().all(|n| !n.is_cached()));
    }

    #[test]
    fn test_node_output_detects_cycle_without_run() {
        let mut graph = calculator_graph();
        let a = graph.create_node(OPERATION).unwrap();
        let b = graph.create_node(OPERATION).unwrap();
        graph.connect_entries(a, "Output", b, "Value 1").unwrap();
        graph.connect_entries(b, "Output", a, "Value 1").unwrap();
        assert!(matches!(
            graph.node_output(a),
            Err(EvaluationError::CyclicGraph(_))
        ));
    }

    #[test]
    fn test_node_error_carries_title() {
        let mut graph = calculator_graph();
        let root = graph.create_node(SQUARE_ROOT).unwrap();
        let out = graph.create_node(OUTPUT).unwrap();
        graph.set_entry_value(root, "Value", json!(-4)).unwrap();
        graph.connect_entries(root, "Output", out, "Value 1").unwrap();
        match graph.evaluate_blocking() {
            Err(EvaluationError::Node { node, .. }) => assert_eq!(node, "Square root"),
            other => panic!("expected a node error, got {other:?}"),
        }
    }

    #[test]
    fn test_first_edge_wins_with_multiple_inputs() {
        let mut graph = calculator_graph();
        graph.set_config(EngineConfig {
            allow_multiple_inputs: true,
            ..EngineConfig::default()
        });
        let a = graph.create_node(CONSTANT).unwrap();
        let b = graph.create_node(CONSTANT).unwrap();
        let out = graph.create_node(OUTPUT).unwrap();
        graph.set_entry_value(a, "Value", json!(1)).unwrap();
        graph.set_entry_value(b, "Value", json!(2)).unwrap();
        graph.connect_entries(a, "Value", out, "Value 1").unwrap();
        graph.connect_entries(b, "Value", out, "Value 1").unwrap();
        let value = graph.calculate_value(out, "Value 1").unwrap();
        assert_eq!(value.as_f64(), Some(1.0));
    }

    #[test]
    fn test_depth_limit() {
        let mut graph = calculator_graph();
        let mut previous = graph.create_node(CONSTANT).unwrap();
        for _ in 0..5 {
            let root = graph.create_node(SQUARE_ROOT).unwrap();
            graph.connect_entries(previous, 0, root, "Value").unwrap();
            previous = root;
        }
        let mut context = EvaluationContext::new(&graph).with_max_depth(3);
        assert!(matches!(
            context.output(previous),
            Err(EvaluationError::DepthLimitExceeded(3))
        ));
        assert!(graph.node_output(previous).is_ok());
    }

    #[test]
    fn test_depth_limit_counts_chain_length_not_width() {
        let mut graph = calculator_graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let b = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        graph.set_entry_value(a, "Value", json!(4)).unwrap();
        graph.set_entry_value(b, "Value", json!(6)).unwrap();
        graph.connect_entries(a, "Value", op, "Value 1").unwrap();
        graph.connect_entries(b, "Value", op, "Value 2").unwrap();

        let outputs = EvaluationContext::new(&graph)
            .with_max_depth(2)
            .output(op)
            .unwrap();
        assert_eq!(outputs["Output"].as_f64(), Some(10.0));

        graph.invalidate_all();
        assert!(matches!(
            EvaluationContext::new(&graph).with_max_depth(1).output(op),
            Err(EvaluationError::DepthLimitExceeded(1))
        ));
    }

    #[test]
    fn test_shared_source_within_depth_limit() {
        let mut graph = calculator_graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        let root = graph.create_node(SQUARE_ROOT).unwrap();
        graph.set_entry_value(a, "Value", json!(8)).unwrap();
        graph.connect_entries(a, "Value", op, "Value 1").unwrap();
        graph.connect_entries(a, "Value", op, "Value 2").unwrap();
        graph.connect_entries(op, "Output", root, "Value").unwrap();

        let outputs = EvaluationContext::new(&graph)
            .with_max_depth(3)
            .output(root)
            .unwrap();
        assert_eq!(outputs["Output"].as_f64(), Some(4.0));
    }

    static EVALUATIONS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Counted;

    impl NodeLogic for Counted {
        fn create(&mut self, node: &mut NodeBuilder<'_>) -> Result<(), EntryError> {
            node.title("Counted");
            node.add_value_output("Value", ValueBox::new(1.0))?;
            Ok(())
        }

        fn evaluate(&self, values: &EntryValues, outputs: &mut OutputWriter<'_>) -> Result<(), NodeError> {
            EVALUATIONS.fetch_add(1, Ordering::SeqCst);
            outputs.set("Value", values["Value"].clone())
        }
    }

    fn counted() -> Box<dyn NodeLogic> {
        Box::new(Counted)
    }

    #[derive(Debug)]
    struct Forgetful;

    fn forgetful() -> Box<dyn NodeLogic> {
        Box::new(Forgetful)
    }

    impl NodeLogic for Forgetful {
        fn create(&mut self, node: &mut NodeBuilder<'_>) -> Result<(), EntryError> {
            node.title("Forgetful");
            node.add_label_output("A")?.add_label_output("B")?;
            Ok(())
        }

        fn evaluate(&self, _: &EntryValues, outputs: &mut OutputWriter<'_>) -> Result<(), NodeError> {
            outputs.set("A", 1)
        }
    }

    #[test]
    fn test_fan_out_node_evaluated_once() {
        let namespace = Namespace::new()
            .with_type(NodeType::new(0, "Output", calculator::output_logic))
            .with_type(NodeType::new(1, "Operation", calculator::operation_logic))
            .with_type(NodeType::new(10, "Counted", counted));
        let mut graph = Graph::new(Arc::new(NodeRegistry::new(namespace).unwrap()));
        graph.set_output_type(Some(NodeCode(0))).unwrap();

        let counted = graph.create_node(NodeCode(10)).unwrap();
        let left = graph.create_node(NodeCode(1)).unwrap();
        let right = graph.create_node(NodeCode(1)).unwrap();
        let out = graph.create_node(NodeCode(0)).unwrap();
        graph.connect_entries(counted, "Value", left, "Value 1").unwrap();
        graph.connect_entries(counted, "Value", right, "Value 1").unwrap();
        graph.connect_entries(left, "Output", out, "Value 1").unwrap();
        graph.connect_entries(right, "Output", out, "Value 2").unwrap();

        let before = EVALUATIONS.load(Ordering::SeqCst);
        let result = graph.evaluate_blocking().unwrap();
        assert_eq!(EVALUATIONS.load(Ordering::SeqCst) - before, 1);
        assert_eq!(result.get("Value 1").and_then(Value::as_f64), Some(1.0));
        assert_eq!(result.get("Value 2").and_then(Value::as_f64), Some(1.0));
    }

    #[test]
    fn test_incomplete_output() {
        let namespace = Namespace::new()
            .with_type(NodeType::new(0, "Output", calculator::output_logic))
            .with_type(NodeType::new(5, "Forgetful", forgetful));
        let mut graph = Graph::new(Arc::new(NodeRegistry::new(namespace).unwrap()));
        graph.set_output_type(Some(NodeCode(0))).unwrap();
        let forgetful = graph.create_node(NodeCode(5)).unwrap();
        let out = graph.create_node(NodeCode(0)).unwrap();
        graph.connect_entries(forgetful, "A", out, "Value 1").unwrap();

        match graph.evaluate_blocking() {
            Err(EvaluationError::IncompleteOutput { node, entry }) => {
                assert_eq!(node, "Forgetful");
                assert_eq!(entry, "B");
            }
            other => panic!("expected incomplete output, got {other:?}"),
        }
        assert!(!graph.node(forgetful).map(Node::is_cached).unwrap_or(true));
    }

    #[test]
    fn test_progress_reports_each_node() {
        let graph = calculator::example_graph().unwrap();
        let mut seen = Vec::new();
        EvaluationContext::new(&graph)
            .with_progress(|node| seen.push(node))
            .run()
            .unwrap();
        assert_eq!(seen.len(), graph.reachable_subgraph().unwrap().len() - 1);
    }
}
