// SPDX-License-Identifier: MIT OR Apache-2.0
//! Implementation of the command line subcommands.

use flowgraph_core::graphs::calculator;
use flowgraph_core::{
    ConfigError, EngineConfig, EvaluationError, EvaluationEvent, Evaluator, Graph, Outputs,
    RegistryError, RestoreReport, StateError, TopologyError,
};
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the command line
#[derive(Debug, Error)]
pub enum CliError {
    /// Settings could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The node types could not be registered
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The graph file could not be read or written
    #[error(transparent)]
    State(#[from] StateError),

    /// The graph could not be built
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Evaluation failed
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// The async runtime could not be started
    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Result type for commands
pub type Result<T> = std::result::Result<T, CliError>;

/// Load settings from a RON file, or use the defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Load a graph file using the calculator node set
pub fn load_graph(path: &Path, config: &EngineConfig) -> Result<(Graph, RestoreReport)> {
    let registry = Arc::new(calculator::create_calculator_registry()?);
    let mut graph = Graph::with_config(registry, config.clone());
    graph.set_output_type(Some(calculator::OUTPUT))?;
    let report = graph.load(path)?;
    if !report.is_complete() {
        tracing::warn!(
            "Graph restored partially: {} nodes and {} edges dropped, {} loads failed",
            report.dropped_nodes,
            report.dropped_edges,
            report.failed_loads
        );
    }
    Ok((graph, report))
}

/// Evaluate a graph file on the background worker
pub fn evaluate(path: &Path, config: &EngineConfig) -> Result<Outputs> {
    let (graph, _) = load_graph(path, config)?;
    let evaluator = Evaluator::new(Arc::new(RwLock::new(graph)));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()?;

    runtime.block_on(async {
        let mut run = evaluator.evaluate();
        let mut outcome = Err(EvaluationError::Cancelled);
        while let Some(event) = run.next_event().await {
            match event {
                EvaluationEvent::Progress { completed, total, .. } => {
                    tracing::debug!("Evaluated {completed}/{total} nodes");
                }
                EvaluationEvent::Evaluated(outputs) => outcome = Ok(outputs),
                EvaluationEvent::Errored(e) => outcome = Err(e),
                EvaluationEvent::Done => break,
            }
        }
        Ok(outcome?)
    })
}

/// Summary printed by `flowgraph check`
#[derive(Debug)]
pub struct CheckReport {
    /// Number of nodes
    pub nodes: usize,
    /// Number of edges
    pub edges: usize,
    /// Whether the graph has a cycle
    pub has_cycles: bool,
    /// Problem with the output node, if any
    pub output_problem: Option<String>,
    /// What could not be restored from the file
    pub restore: RestoreReport,
}

impl CheckReport {
    /// Whether the graph can be evaluated
    pub fn is_ok(&self) -> bool {
        !self.has_cycles && self.output_problem.is_none()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes:  {}", self.nodes)?;
        writeln!(f, "edges:  {}", self.edges)?;
        writeln!(f, "cycles: {}", if self.has_cycles { "yes" } else { "no" })?;
        match &self.output_problem {
            Some(problem) => writeln!(f, "output: {problem}")?,
            None => writeln!(f, "output: ok")?,
        }
        write!(
            f,
            "dropped: {} nodes, {} edges, {} failed loads",
            self.restore.dropped_nodes, self.restore.dropped_edges, self.restore.failed_loads
        )
    }
}

/// Inspect a graph file without evaluating it
pub fn check(path: &Path, config: &EngineConfig) -> Result<CheckReport> {
    let (graph, restore) = load_graph(path, config)?;
    Ok(CheckReport {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        has_cycles: graph.has_cycles(),
        output_problem: graph.find_output_node().err().map(|e| e.to_string()),
        restore,
    })
}

/// Write the calculator example graph to a file
pub fn demo(path: &Path) -> Result<()> {
    calculator::example_graph()?.save(path)?;
    Ok(())
}
