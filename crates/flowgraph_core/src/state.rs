// SPDX-License-Identifier: MIT OR Apache-2.0
//! Saving and restoring graphs.
//!
//! Every entity can be turned into a plain state value and restored from
//! one. Graph files are the JSON form of [`GraphState`]:
//!
//! ```json
//! {
//!   "nodes": [{"code": 1, "title": "Constant", "pos_x": 0.0, "pos_y": 0.0,
//!              "entries": [{"socket": {"id": "..."}, "custom": {"value": 5.0}}],
//!              "custom": {}}],
//!   "edges": [{"start": "...", "end": "..."}]
//! }
//! ```
//!
//! Restoring with [`IdMode::Preserve`] keeps socket ids, which is what file
//! loading and undo need. [`IdMode::Fresh`] gives every socket a new id and
//! remaps edges through a lookup table, so that pasted copies never share
//! ids with their originals.

use crate::edge::EdgeId;
use crate::entry::Entry;
use crate::graph::{Graph, TopologyError};
use crate::node::{Node, NodeCode, NodeId, Position};
use crate::registry::RegistryError;
use crate::socket::{Socket, SocketId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Error when saving or restoring state
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid JSON, or JSON of the wrong shape
    #[error("Invalid graph JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A node state lists a different number of entries than the node has
    #[error("Node '{node}' has {expected} entries but its state has {found}")]
    EntryCountMismatch {
        /// Node title
        node: String,
        /// Entries on the node
        expected: usize,
        /// Entries in the state
        found: usize,
    },

    /// Creating a node failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Placing a node failed
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// How socket ids are handled when restoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    /// Take socket ids from the state
    Preserve,
    /// Keep the fresh ids of newly created sockets
    Fresh,
}

impl From<bool> for IdMode {
    fn from(restore_id: bool) -> Self {
        if restore_id {
            Self::Preserve
        } else {
            Self::Fresh
        }
    }
}

/// What could not be restored.
///
/// Restoring continues past these; a report with all counts at zero means
/// everything was restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Nodes skipped because their code is missing or unknown
    pub dropped_nodes: usize,
    /// Edges skipped because a socket id could not be resolved
    pub dropped_edges: usize,
    /// Widgets, sockets or nodes whose custom state could not be fully loaded
    pub failed_loads: usize,
}

impl RestoreReport {
    /// Whether everything was restored
    pub fn is_complete(&self) -> bool {
        self.dropped_nodes == 0 && self.dropped_edges == 0 && self.failed_loads == 0
    }

    /// Add the counts of another report
    pub fn merge(&mut self, other: RestoreReport) {
        self.dropped_nodes += other.dropped_nodes;
        self.dropped_edges += other.dropped_edges;
        self.failed_loads += other.failed_loads;
    }

    fn failed_if(ok: bool) -> Self {
        Self {
            failed_loads: usize::from(!ok),
            ..Self::default()
        }
    }
}

/// State of a socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketState {
    /// Socket ID
    pub id: SocketId,
}

/// State of an edge: the ids of its sockets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeState {
    /// Start socket
    pub start: Option<SocketId>,
    /// End socket
    pub end: Option<SocketId>,
}

/// State of an entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryState {
    /// Socket state, absent for static entries
    pub socket: Option<SocketState>,
    /// Widget state
    pub custom: Map<String, Value>,
}

/// State of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeState {
    /// Type code; nodes without one are skipped on restore
    pub code: Option<NodeCode>,
    /// Title
    pub title: String,
    /// Horizontal position
    pub pos_x: f64,
    /// Vertical position
    pub pos_y: f64,
    /// Entry states in entry order
    pub entries: Vec<EntryState>,
    /// State saved by the node logic
    pub custom: Map<String, Value>,
}

/// State of a whole graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphState {
    /// Node states in graph order
    pub nodes: Vec<NodeState>,
    /// Edge states in creation order
    pub edges: Vec<EdgeState>,
}

impl GraphState {
    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    pub fn from_json(text: &str) -> Result<Self, StateError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// An entity that can be saved to and restored from a state value
pub trait Serializable {
    /// The state representation
    type State;

    /// Capture the current state
    fn get_state(&self) -> Self::State;

    /// Restore from a state.
    ///
    /// Partial failures are reported, not raised; an `Err` means restoring
    /// could not continue at all.
    fn set_state(&mut self, state: &Self::State, ids: IdMode) -> Result<RestoreReport, StateError>;
}

impl Serializable for Socket {
    type State = SocketState;

    fn get_state(&self) -> SocketState {
        SocketState {
            id: self.id().clone(),
        }
    }

    fn set_state(&mut self, state: &SocketState, ids: IdMode) -> Result<RestoreReport, StateError> {
        if ids == IdMode::Preserve {
            self.set_id(state.id.clone());
        }
        Ok(RestoreReport::default())
    }
}

impl Serializable for Entry {
    type State = EntryState;

    fn get_state(&self) -> EntryState {
        EntryState {
            socket: self.socket().map(Serializable::get_state),
            custom: self.widget().save(),
        }
    }

    fn set_state(&mut self, state: &EntryState, ids: IdMode) -> Result<RestoreReport, StateError> {
        let mut report = RestoreReport::failed_if(self.widget_mut().load(&state.custom));
        match (self.socket_mut(), &state.socket) {
            (Some(socket), Some(socket_state)) => report.merge(socket.set_state(socket_state, ids)?),
            (None, None) => {}
            _ => report.failed_loads += 1,
        }
        Ok(report)
    }
}

impl Serializable for Node {
    type State = NodeState;

    fn get_state(&self) -> NodeState {
        let position = self.position();
        NodeState {
            code: Some(self.code()),
            title: self.title().to_string(),
            pos_x: position.x,
            pos_y: position.y,
            entries: self.entries().iter().map(Serializable::get_state).collect(),
            custom: self.logic().save(),
        }
    }

    /// Restores custom state first, since loading it may change the entries,
    /// then matches entry states to entries one to one.
    fn set_state(&mut self, state: &NodeState, ids: IdMode) -> Result<RestoreReport, StateError> {
        let mut report = RestoreReport::failed_if(self.logic_mut().load(&state.custom));
        self.set_title(state.title.clone());
        self.set_position(Position::new(state.pos_x, state.pos_y));

        if state.entries.len() != self.entries().len() {
            return Err(StateError::EntryCountMismatch {
                node: self.title().to_string(),
                expected: self.entries().len(),
                found: state.entries.len(),
            });
        }
        for (entry, entry_state) in self.entries_mut().iter_mut().zip(&state.entries) {
            report.merge(entry.set_state(entry_state, ids)?);
        }
        self.clear_output();
        Ok(report)
    }
}

impl Serializable for Graph {
    type State = GraphState;

    fn get_state(&self) -> GraphState {
        GraphState {
            nodes: self.nodes().map(Serializable::get_state).collect(),
            edges: self.edges().map(|edge| edge.get_state()).collect(),
        }
    }

    /// Replace the whole graph with the state
    fn set_state(&mut self, state: &GraphState, ids: IdMode) -> Result<RestoreReport, StateError> {
        self.clear();
        Ok(self.insert_state(state, ids)?.report)
    }
}

/// Result of [`Graph::insert_state`]
#[derive(Debug, Clone, Default)]
pub struct Inserted {
    /// Added nodes, in state order
    pub nodes: Vec<NodeId>,
    /// Added edges, in state order
    pub edges: Vec<EdgeId>,
    /// What could not be restored
    pub report: RestoreReport,
}

impl Graph {
    /// Add the nodes and edges of a state to the graph, keeping what is already there.
    ///
    /// Nodes with a missing or unknown code are skipped. Edges are restored
    /// through a table mapping saved socket ids to the ids of the new
    /// sockets; edges whose sockets are not in the table are skipped.
    pub fn insert_state(&mut self, state: &GraphState, ids: IdMode) -> Result<Inserted, StateError> {
        let mut inserted = Inserted::default();
        let mut lookup: HashMap<SocketId, SocketId> = HashMap::new();

        for node_state in &state.nodes {
            let Some(code) = node_state.code else {
                tracing::warn!("Skipping node '{}' without a code", node_state.title);
                inserted.report.dropped_nodes += 1;
                continue;
            };
            let mut node = match self.registry().create_node(code) {
                Ok(node) => node,
                Err(RegistryError::UnknownCode(code)) => {
                    tracing::warn!("Skipping node '{}' with unknown code {code}", node_state.title);
                    inserted.report.dropped_nodes += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            inserted.report.merge(node.set_state(node_state, ids)?);

            for (entry, entry_state) in node.entries().iter().zip(&node_state.entries) {
                if let (Some(socket), Some(saved)) = (entry.socket(), &entry_state.socket) {
                    lookup.insert(saved.id.clone(), socket.id().clone());
                }
            }
            inserted.nodes.push(self.add_node(node)?);
        }

        for edge_state in &state.edges {
            match self.restore_edge(edge_state, &lookup) {
                Some(edge) => inserted.edges.push(edge),
                None => {
                    tracing::warn!("Skipping edge {:?} -> {:?}", edge_state.start, edge_state.end);
                    inserted.report.dropped_edges += 1;
                }
            }
        }

        Ok(inserted)
    }

    /// Recreate an edge, mapping its socket ids through `lookup`.
    ///
    /// Returns `None` if either id is missing from the table or the graph,
    /// or if the sockets cannot be connected.
    pub fn restore_edge(&mut self, state: &EdgeState, lookup: &HashMap<SocketId, SocketId>) -> Option<EdgeId> {
        let start = lookup.get(state.start.as_ref()?)?;
        let end = lookup.get(state.end.as_ref()?)?;
        match self.connect(start, end) {
            Ok(edge) => Some(edge),
            Err(e) => {
                tracing::debug!("Failed to restore edge {start} -> {end}: {e}");
                None
            }
        }
    }

    /// Write the graph to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        std::fs::write(path, self.get_state().to_json()?)?;
        tracing::info!("Saved graph to {}", path.display());
        Ok(())
    }

    /// Replace the graph with the contents of a JSON file
    pub fn load(&mut self, path: &Path) -> Result<RestoreReport, StateError> {
        let content = std::fs::read_to_string(path)?;
        let state = GraphState::from_json(&content)?;
        let report = self.set_state(&state, IdMode::Preserve)?;
        tracing::info!(
            "Loaded graph from {} ({} nodes, {} edges)",
            path.display(),
            self.node_count(),
            self.edge_count()
        );
        Ok(report)
    }
}
