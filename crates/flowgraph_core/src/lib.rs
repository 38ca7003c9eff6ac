// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph evaluation engine.
//!
//! Users compose computation graphs out of nodes wired by edges and
//! evaluate them to a single result.
//!
//! ## Architecture
//!
//! - [`Socket`], [`Edge`], [`Entry`] and [`Node`] form the data model
//! - [`Graph`] owns nodes and edges and enforces connection rules
//! - [`EvaluationContext`] performs memoized, cycle-safe, pull-based evaluation
//! - [`Evaluator`] runs evaluation on a worker thread with progress events
//! - [`Serializable`] saves and restores every entity, remapping ids on paste
//! - [`Clipboard`] and [`History`] provide copy/paste and undo/redo

pub mod clipboard;
pub mod config;
pub mod dependency;
pub mod edge;
pub mod entry;
pub mod evaluation;
pub mod event;
pub mod graph;
pub mod graphs;
pub mod history;
pub mod node;
pub mod registry;
pub mod socket;
pub mod state;
pub mod widget;
pub mod worker;

pub use clipboard::Clipboard;
pub use config::{ConfigError, EngineConfig};
pub use dependency::DependencyGraph;
pub use edge::{resolve_scope, Edge, EdgeEnd, EdgeId, ScopeError};
pub use entry::{Entry, EntryError, EntryKind, EntryList, EntryRef};
pub use evaluation::{EvaluationContext, EvaluationError};
pub use event::GraphEvent;
pub use graph::{Graph, GraphId, TopologyError};
pub use history::{History, HistoryError};
pub use node::{
    EntryValues, Node, NodeBuilder, NodeCode, NodeError, NodeId, NodeLogic, OutputWriter, Outputs,
    Position,
};
pub use registry::{Namespace, NodeRegistry, NodeType, RegistryError};
pub use socket::{Socket, SocketId};
pub use state::{GraphState, IdMode, Inserted, RestoreReport, Serializable, StateError};
pub use widget::{ComboBox, EntryWidget, Label, TextBox, ValueBox, WidgetError};
pub use worker::{EvaluationEvent, Evaluator, RunHandle};
