// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and edges.
//!
//! The graph owns every placed node and every edge. Sockets only record the
//! ids of their edges; all connection changes go through the graph so that
//! both ends of an edge stay consistent.

use crate::config::EngineConfig;
use crate::dependency::DependencyGraph;
use crate::edge::{resolve_scope, Edge, EdgeEnd, EdgeId, ScopeError};
use crate::entry::{Entry, EntryError, EntryKind, EntryRef};
use crate::evaluation::EvaluationError;
use crate::event::{GraphEvent, Observers};
use crate::node::{Node, NodeCode, NodeId, Position};
use crate::registry::{NodeRegistry, RegistryError};
use crate::socket::{Socket, SocketId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Create a new random graph ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error when editing the structure of a graph
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Node not in the graph
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Edge not in the graph
    #[error("Edge not found: {0:?}")]
    EdgeNotFound(EdgeId),

    /// Socket not in the graph
    #[error("Socket not found: {0}")]
    SocketNotFound(SocketId),

    /// The entry is static and has no socket
    #[error("Entry '{entry}' has no socket")]
    NoSocket {
        /// Owning node
        node: NodeId,
        /// Entry name
        entry: String,
    },

    /// Both sockets belong to the same node
    #[error("Cannot connect two sockets of the same node")]
    SameNode,

    /// Both sockets are inputs, or both are outputs
    #[error("Cannot connect two {0} sockets")]
    SamePolarity(EntryKind),

    /// The edge would belong to another graph
    #[error("Edge belongs to graph {0}, not this one")]
    ForeignScope(GraphId),

    /// The graph of an edge could not be determined
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// The node's type is not registered with this graph
    #[error("Node type with code {0} is not registered")]
    UnregisteredType(NodeCode),

    /// A socket with the same ID is already placed
    #[error("Socket {0} is already in the graph")]
    DuplicateSocket(SocketId),

    /// Creating a node failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Editing an entry failed
    #[error(transparent)]
    Entry(#[from] EntryError),
}

/// A node graph
#[derive(Debug)]
pub struct Graph {
    id: GraphId,
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    output_type: Option<NodeCode>,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, Node>,
    /// Edges between sockets
    edges: IndexMap<EdgeId, Edge>,
    /// Owning node of every placed socket
    sockets: HashMap<SocketId, NodeId>,
    observers: Observers,
}

impl Graph {
    /// Create a new empty graph using the given node types
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Create a new empty graph with custom settings
    pub fn with_config(registry: Arc<NodeRegistry>, config: EngineConfig) -> Self {
        Self {
            id: GraphId::new(),
            registry,
            config,
            output_type: None,
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            sockets: HashMap::new(),
            observers: Observers::default(),
        }
    }

    /// Graph ID
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Available node types
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the settings. Existing edges are kept as they are.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Receive an event for every change made from now on
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<GraphEvent> {
        self.observers.subscribe()
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        self.observers.emit(event);
    }

    // ------------------------------------------------------------------
    // Nodes

    /// Add a node to the graph
    pub fn add_node(&mut self, mut node: Node) -> Result<NodeId, TopologyError> {
        if !self.registry.contains(node.code()) {
            return Err(TopologyError::UnregisteredType(node.code()));
        }
        if let Some(socket) = node.sockets().find(|s| self.sockets.contains_key(s.id())) {
            return Err(TopologyError::DuplicateSocket(socket.id().clone()));
        }
        let id = node.id();
        for socket in node.sockets() {
            self.sockets.insert(socket.id().clone(), id);
        }
        node.set_graph(Some(self.id));
        self.nodes.insert(id, node);
        self.emit(GraphEvent::NodeAdded(id));
        Ok(id)
    }

    /// Create a node of a registered type and add it
    pub fn create_node(&mut self, code: NodeCode) -> Result<NodeId, TopologyError> {
        let node = self.registry.create_node(code)?;
        self.add_node(node)
    }

    /// Remove a node, removing its edges first
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node, TopologyError> {
        let edges: Vec<EdgeId> = self
            .node(node_id)
            .ok_or(TopologyError::NodeNotFound(node_id))?
            .sockets()
            .flat_map(|s| s.edges().iter().copied())
            .collect();
        for edge in edges {
            self.remove_edge(edge);
        }
        let mut node = self
            .nodes
            .shift_remove(&node_id)
            .ok_or(TopologyError::NodeNotFound(node_id))?;
        for socket in node.sockets() {
            self.sockets.remove(socket.id());
        }
        node.set_graph(None);
        node.clear_output();
        self.emit(GraphEvent::NodeRemoved(node_id));
        Ok(node)
    }

    /// Remove all nodes and edges
    pub fn clear(&mut self) {
        self.edges.clear();
        self.sockets.clear();
        self.nodes.clear();
        self.emit(GraphEvent::Cleared);
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Result<&mut Node, TopologyError> {
        self.nodes
            .get_mut(&node_id)
            .ok_or(TopologyError::NodeNotFound(node_id))
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the node is placed in this graph
    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Change the title of a node
    pub fn set_title(&mut self, node_id: NodeId, title: impl Into<String>) -> Result<(), TopologyError> {
        self.node_mut(node_id)?.set_title(title);
        self.emit(GraphEvent::NodeChanged(node_id));
        Ok(())
    }

    /// Move a node
    pub fn set_position(&mut self, node_id: NodeId, position: Position) -> Result<(), TopologyError> {
        self.node_mut(node_id)?.set_position(position);
        self.emit(GraphEvent::NodeChanged(node_id));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entries

    /// Append an entry to a placed node
    pub fn add_entry(&mut self, node_id: NodeId, entry: Entry) -> Result<usize, TopologyError> {
        self.ensure_new_socket(&entry)?;
        let socket = entry.socket().map(|s| s.id().clone());
        let index = self.node_mut(node_id)?.add_entry(entry)?;
        self.entry_added(node_id, socket);
        Ok(index)
    }

    /// Insert an entry into a placed node at `index`
    pub fn insert_entry(&mut self, node_id: NodeId, index: usize, entry: Entry) -> Result<(), TopologyError> {
        self.ensure_new_socket(&entry)?;
        let socket = entry.socket().map(|s| s.id().clone());
        self.node_mut(node_id)?.insert_entry(index, entry)?;
        self.entry_added(node_id, socket);
        Ok(())
    }

    fn ensure_new_socket(&self, entry: &Entry) -> Result<(), TopologyError> {
        match entry.socket() {
            Some(socket) if self.sockets.contains_key(socket.id()) => {
                Err(TopologyError::DuplicateSocket(socket.id().clone()))
            }
            _ => Ok(()),
        }
    }

    fn entry_added(&mut self, node_id: NodeId, socket: Option<SocketId>) {
        if let Some(socket) = socket {
            self.sockets.insert(socket, node_id);
        }
        self.invalidate_from(node_id);
        self.emit(GraphEvent::EntriesChanged(node_id));
    }

    /// Remove an entry by name or index, removing its edges first
    pub fn remove_entry(
        &mut self,
        node_id: NodeId,
        entry: impl Into<EntryRef>,
    ) -> Result<Entry, TopologyError> {
        let entry = entry.into();
        let edges: Vec<EdgeId> = self
            .node(node_id)
            .ok_or(TopologyError::NodeNotFound(node_id))?
            .entries()
            .resolve(&entry)
            .ok_or_else(|| EntryError::NotFound(entry.clone()))?
            .socket()
            .map(|s| s.edges().to_vec())
            .unwrap_or_default();
        for edge in edges {
            self.remove_edge(edge);
        }
        self.invalidate_from(node_id);
        let removed = self.node_mut(node_id)?.remove_entry(&entry)?;
        if let Some(socket) = removed.socket() {
            self.sockets.remove(socket.id());
        }
        self.emit(GraphEvent::EntriesChanged(node_id));
        Ok(removed)
    }

    /// Set the widget value of an entry.
    ///
    /// Drops the cached outputs of the node and of every node downstream of it.
    pub fn set_entry_value(
        &mut self,
        node_id: NodeId,
        entry: impl Into<EntryRef>,
        value: Value,
    ) -> Result<(), TopologyError> {
        let entry = entry.into();
        let node = self.node_mut(node_id)?;
        node.set_entry_value(&entry, value)?;
        let name = node
            .entries()
            .resolve(&entry)
            .map(|e| e.name().to_string())
            .unwrap_or_default();
        self.invalidate_from(node_id);
        self.emit(GraphEvent::EntryValueChanged { node: node_id, entry: name });
        Ok(())
    }

    /// Socket of an entry
    pub fn entry_socket(&self, node_id: NodeId, entry: impl Into<EntryRef>) -> Result<&SocketId, TopologyError> {
        let entry = entry.into();
        let found = self
            .node(node_id)
            .ok_or(TopologyError::NodeNotFound(node_id))?
            .entries()
            .resolve(&entry)
            .ok_or_else(|| EntryError::NotFound(entry.clone()))?;
        found
            .socket()
            .map(Socket::id)
            .ok_or_else(|| TopologyError::NoSocket {
                node: node_id,
                entry: found.name().to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Sockets

    /// Graph a socket is placed in, if it is placed in this one
    pub fn scope_of(&self, socket: &SocketId) -> Option<GraphId> {
        self.sockets.contains_key(socket).then_some(self.id)
    }

    /// Node owning a socket
    pub fn socket_owner(&self, socket: &SocketId) -> Option<NodeId> {
        self.sockets.get(socket).copied()
    }

    /// Node and entry owning a socket
    pub fn socket_entry(&self, socket: &SocketId) -> Option<(&Node, &Entry)> {
        let node = self.node(self.socket_owner(socket)?)?;
        let entry = node
            .entries()
            .iter()
            .find(|e| e.socket().is_some_and(|s| s.id() == socket))?;
        Some((node, entry))
    }

    /// A placed socket
    pub fn socket(&self, socket: &SocketId) -> Option<&Socket> {
        self.socket_entry(socket).and_then(|(_, entry)| entry.socket())
    }

    /// All placed sockets
    pub fn socket_instances(&self) -> impl Iterator<Item = &Socket> {
        self.nodes.values().flat_map(Node::sockets)
    }

    fn socket_mut(&mut self, socket: &SocketId) -> Option<&mut Socket> {
        let owner = self.socket_owner(socket)?;
        self.nodes
            .get_mut(&owner)?
            .entries_mut()
            .iter_mut()
            .find_map(|e| e.socket_mut().filter(|s| s.id() == socket))
    }

    fn attach(&mut self, socket: &SocketId, edge: EdgeId) {
        if let Some(target) = self.socket_mut(socket) {
            if target.add_edge(edge) {
                self.emit(GraphEvent::SocketConnected {
                    socket: socket.clone(),
                    edge,
                });
            }
        }
    }

    fn detach(&mut self, socket: &SocketId, edge: EdgeId) {
        if let Some(target) = self.socket_mut(socket) {
            if target.remove_edge(edge) {
                self.emit(GraphEvent::SocketDisconnected {
                    socket: socket.clone(),
                    edge,
                });
            }
        }
    }

    /// Remove every edge of a socket, oldest first. Returns the number removed.
    pub fn disconnect_socket(&mut self, socket: &SocketId) -> usize {
        let edges = self
            .socket(socket)
            .map(|s| s.edges().to_vec())
            .unwrap_or_default();
        edges.into_iter().filter(|edge| self.remove_edge(*edge)).count()
    }

    // ------------------------------------------------------------------
    // Edges

    /// Connect two sockets of this graph
    pub fn connect(&mut self, start: &SocketId, end: &SocketId) -> Result<EdgeId, TopologyError> {
        self.connect_scoped(start, end, None)
    }

    /// Connect two sockets, optionally naming the graph the edge belongs to.
    ///
    /// Without an explicit graph the edge joins the graph of its sockets.
    /// All checks happen before anything is changed.
    pub fn connect_scoped(
        &mut self,
        start: &SocketId,
        end: &SocketId,
        scope: Option<GraphId>,
    ) -> Result<EdgeId, TopologyError> {
        let scope = resolve_scope(self.scope_of(start), self.scope_of(end), scope)?;
        if scope != self.id {
            return Err(TopologyError::ForeignScope(scope));
        }
        let input = self.check_pair(start, end)?;

        if !self.config.allow_multiple_inputs {
            let evicted = self
                .socket(&input)
                .map(|s| s.edges().to_vec())
                .unwrap_or_default();
            for edge in evicted {
                self.remove_edge(edge);
            }
        }

        let edge = Edge::new(start.clone(), end.clone());
        let id = edge.id;
        self.edges.insert(id, edge);
        self.attach(start, id);
        self.attach(end, id);
        if let Some(owner) = self.socket_owner(&input) {
            self.invalidate_from(owner);
        }
        tracing::trace!("Connected {start} to {end}");
        self.emit(GraphEvent::EdgeAdded(id));
        Ok(id)
    }

    /// Connect two entries by node and entry name or index
    pub fn connect_entries(
        &mut self,
        start_node: NodeId,
        start_entry: impl Into<EntryRef>,
        end_node: NodeId,
        end_entry: impl Into<EntryRef>,
    ) -> Result<EdgeId, TopologyError> {
        let start = self.entry_socket(start_node, start_entry)?.clone();
        let end = self.entry_socket(end_node, end_entry)?.clone();
        self.connect(&start, &end)
    }

    /// Validate that two placed sockets may be joined and return the input one
    fn check_pair(&self, a: &SocketId, b: &SocketId) -> Result<SocketId, TopologyError> {
        let (a_node, a_entry) = self
            .socket_entry(a)
            .ok_or_else(|| TopologyError::SocketNotFound(a.clone()))?;
        let (b_node, b_entry) = self
            .socket_entry(b)
            .ok_or_else(|| TopologyError::SocketNotFound(b.clone()))?;
        if a_node.id() == b_node.id() {
            return Err(TopologyError::SameNode);
        }
        match (a_entry.kind(), b_entry.kind()) {
            (EntryKind::Input, EntryKind::Output) => Ok(a.clone()),
            (EntryKind::Output, EntryKind::Input) => Ok(b.clone()),
            (kind, _) => Err(TopologyError::SamePolarity(kind)),
        }
    }

    /// Move the start of an edge to another socket
    pub fn set_edge_start(&mut self, edge: EdgeId, socket: &SocketId) -> Result<(), TopologyError> {
        self.retarget(edge, EdgeEnd::Start, socket)
    }

    /// Move the end of an edge to another socket
    pub fn set_edge_end(&mut self, edge: EdgeId, socket: &SocketId) -> Result<(), TopologyError> {
        self.retarget(edge, EdgeEnd::End, socket)
    }

    fn retarget(&mut self, edge_id: EdgeId, end: EdgeEnd, socket: &SocketId) -> Result<(), TopologyError> {
        let edge = self.edges.get(&edge_id).ok_or(TopologyError::EdgeNotFound(edge_id))?;
        let previous = edge.socket(end).clone();
        if previous == *socket {
            return Ok(());
        }
        let other = match end {
            EdgeEnd::Start => edge.end().clone(),
            EdgeEnd::End => edge.start().clone(),
        };
        let input = self.check_pair(socket, &other)?;
        let previous_input = self.check_pair(&previous, &other).ok();

        if !self.config.allow_multiple_inputs && input == *socket {
            let evicted: Vec<EdgeId> = self
                .socket(socket)
                .map(|s| s.edges().iter().copied().filter(|e| *e != edge_id).collect())
                .unwrap_or_default();
            for evicted in evicted {
                self.remove_edge(evicted);
            }
        }

        self.detach(&previous, edge_id);
        if let Some(edge) = self.edges.get_mut(&edge_id) {
            edge.set_socket(end, socket.clone());
        }
        self.attach(socket, edge_id);

        for changed in [previous_input, Some(input)].into_iter().flatten() {
            if let Some(owner) = self.socket_owner(&changed) {
                self.invalidate_from(owner);
            }
        }
        self.emit(GraphEvent::EdgeRetargeted {
            edge: edge_id,
            end,
            from: previous,
            to: socket.clone(),
        });
        Ok(())
    }

    /// Remove an edge, detaching it from both sockets. Returns `false` if it was already gone.
    pub fn remove_edge(&mut self, edge_id: EdgeId) -> bool {
        let Some(edge) = self.edges.shift_remove(&edge_id) else {
            return false;
        };
        let input = self.check_pair(edge.start(), edge.end()).ok();
        self.detach(edge.start(), edge_id);
        self.detach(edge.end(), edge_id);
        if let Some(owner) = input.and_then(|socket| self.socket_owner(&socket)) {
            self.invalidate_from(owner);
        }
        self.emit(GraphEvent::EdgeRemoved(edge_id));
        true
    }

    /// Get an edge by ID
    pub fn edge(&self, edge_id: EdgeId) -> Option<&Edge> {
        self.edges.get(&edge_id)
    }

    /// Get all edges in creation order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Output entry an input entry reads from: the far end of its first edge
    pub fn input_source(&self, entry: &Entry) -> Option<(&Node, &Entry)> {
        if !entry.is_connected_input() {
            return None;
        }
        let socket = entry.socket()?;
        let edge = self.edges.get(&socket.first_edge()?)?;
        self.socket_entry(edge.opposite(socket.id())?)
    }

    // ------------------------------------------------------------------
    // Output node

    /// Code of the node type whose instance produces the graph result
    pub fn output_type(&self) -> Option<NodeCode> {
        self.output_type
    }

    /// Set the output node type. The code must be registered.
    pub fn set_output_type(&mut self, code: Option<NodeCode>) -> Result<(), TopologyError> {
        if let Some(code) = code {
            if !self.registry.contains(code) {
                return Err(TopologyError::UnregisteredType(code));
            }
        }
        self.output_type = code;
        self.emit(GraphEvent::OutputTypeChanged(code));
        Ok(())
    }

    /// Use the type of a node as the output node type
    pub fn set_output_type_of(&mut self, node: &Node) -> Result<(), TopologyError> {
        self.set_output_type(Some(node.code()))
    }

    /// The single instance of the output node type
    pub fn find_output_node(&self) -> Result<NodeId, EvaluationError> {
        let code = self.output_type.ok_or(EvaluationError::NoOutputTypeSet)?;
        let mut instances = self.nodes.values().filter(|n| n.code() == code);
        match (instances.next(), instances.count()) {
            (None, _) => Err(EvaluationError::NoOutputInstance(code)),
            (Some(node), 0) => Ok(node.id()),
            (Some(_), more) => Err(EvaluationError::MultipleOutputInstances {
                code,
                count: more + 1,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Analysis

    /// Dependency graph over the nodes: the node on the input side of an
    /// edge depends on the node on the output side
    pub fn build_dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new(self.nodes.keys().copied());
        for edge in self.edges.values() {
            let (Some((a_node, a_entry)), Some((b_node, _))) =
                (self.socket_entry(edge.start()), self.socket_entry(edge.end()))
            else {
                continue;
            };
            if a_entry.is_input() {
                graph.add_dependency(b_node.id(), a_node.id());
            } else {
                graph.add_dependency(a_node.id(), b_node.id());
            }
        }
        graph
    }

    /// Whether the graph contains a directed cycle
    pub fn has_cycles(&self) -> bool {
        self.build_dependency_graph().has_cycles()
    }

    /// The output node and every node it depends on
    pub fn reachable_subgraph(&self) -> Result<IndexSet<NodeId>, EvaluationError> {
        let output = self.find_output_node()?;
        Ok(self.build_dependency_graph().ancestors_of(output))
    }

    /// Drop the cached outputs of a node and of every node downstream of it
    pub fn invalidate_from(&self, node_id: NodeId) {
        let dependencies = self.build_dependency_graph();
        if !dependencies.contains(node_id) {
            return;
        }
        for node in dependencies.descendants_of(node_id) {
            if let Some(node) = self.nodes.get(&node) {
                node.clear_output();
            }
        }
    }

    /// Drop the cached outputs of every node
    pub fn invalidate_all(&self) {
        for node in self.nodes.values() {
            node.clear_output();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::calculator::{self, CONSTANT, OPERATION, OUTPUT};
    use serde_json::json;

    fn graph() -> Graph {
        let mut graph = Graph::new(Arc::new(calculator::create_calculator_registry().unwrap()));
        graph.set_output_type(Some(OUTPUT)).unwrap();
        graph
    }

    #[test]
    fn test_add_and_remove_node() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let b = graph.create_node(OPERATION).unwrap();
        graph.connect_entries(a, "Value", b, "Value 1").unwrap();
        assert_eq!(graph.edge_count(), 1);

        let removed = graph.remove_node(a).unwrap();
        assert!(removed.graph().is_none());
        assert_eq!(graph.edge_count(), 0);
        assert!(graph
            .node(b)
            .unwrap()
            .sockets()
            .all(|s| !s.is_connected()));
        assert!(matches!(graph.remove_node(a), Err(TopologyError::NodeNotFound(_))));
    }

    #[test]
    fn test_unregistered_node_rejected() {
        let mut graph = Graph::new(Arc::new(NodeRegistry::default()));
        let node = calculator::create_calculator_registry().unwrap().create_node(CONSTANT).unwrap();
        assert!(matches!(
            graph.add_node(node),
            Err(TopologyError::UnregisteredType(_))
        ));
    }

    #[test]
    fn test_same_polarity_rejected_without_mutation() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let b = graph.create_node(CONSTANT).unwrap();
        let result = graph.connect_entries(a, "Value", b, "Value");
        assert!(matches!(result, Err(TopologyError::SamePolarity(EntryKind::Output))));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.socket_instances().all(|s| !s.is_connected()));
    }

    #[test]
    fn test_same_node_rejected() {
        let mut graph = graph();
        let op = graph.create_node(OPERATION).unwrap();
        let result = graph.connect_entries(op, "Output", op, "Value 1");
        assert!(matches!(result, Err(TopologyError::SameNode)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_static_entry_has_no_socket() {
        let mut graph = graph();
        let op = graph.create_node(OPERATION).unwrap();
        assert!(matches!(
            graph.entry_socket(op, "Operation"),
            Err(TopologyError::NoSocket { .. })
        ));
    }

    #[test]
    fn test_second_input_edge_evicts_first() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let b = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        let first = graph.connect_entries(a, "Value", op, "Value 1").unwrap();
        let second = graph.connect_entries(b, "Value", op, "Value 1").unwrap();
        assert!(graph.edge(first).is_none());
        assert!(graph.edge(second).is_some());
        let socket = graph.entry_socket(op, "Value 1").unwrap().clone();
        assert_eq!(graph.socket(&socket).unwrap().edges(), &[second]);
    }

    #[test]
    fn test_multiple_inputs_when_allowed() {
        let mut graph = graph();
        graph.set_config(EngineConfig {
            allow_multiple_inputs: true,
            ..EngineConfig::default()
        });
        let a = graph.create_node(CONSTANT).unwrap();
        let b = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        graph.connect_entries(a, "Value", op, "Value 1").unwrap();
        graph.connect_entries(b, "Value", op, "Value 1").unwrap();
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_output_can_fan_out() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        graph.connect_entries(a, "Value", op, "Value 1").unwrap();
        graph.connect_entries(a, "Value", op, "Value 2").unwrap();
        let socket = graph.entry_socket(a, "Value").unwrap().clone();
        assert_eq!(graph.socket(&socket).unwrap().len(), 2);
    }

    #[test]
    fn test_disconnect_socket_removes_all_edges() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let left = graph.create_node(OPERATION).unwrap();
        let right = graph.create_node(OPERATION).unwrap();
        let first = graph.connect_entries(a, "Value", left, "Value 1").unwrap();
        let second = graph.connect_entries(a, "Value", right, "Value 2").unwrap();
        let socket = graph.entry_socket(a, "Value").unwrap().clone();
        let left_input = graph.entry_socket(left, "Value 1").unwrap().clone();
        let right_input = graph.entry_socket(right, "Value 2").unwrap().clone();

        let mut events = graph.subscribe();
        assert_eq!(graph.disconnect_socket(&socket), 2);
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.socket(&socket).unwrap().is_connected());
        assert!(!graph.socket(&left_input).unwrap().is_connected());
        assert!(!graph.socket(&right_input).unwrap().is_connected());

        let mut removed = Vec::new();
        let mut disconnected = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                GraphEvent::EdgeRemoved(edge) => removed.push(edge),
                GraphEvent::SocketDisconnected { socket: s, edge } if s == socket => {
                    disconnected.push(edge);
                }
                _ => {}
            }
        }
        assert_eq!(removed, [first, second]);
        assert_eq!(disconnected, [first, second]);
        assert_eq!(graph.disconnect_socket(&socket), 0);
    }

    #[test]
    fn test_remove_edge_is_idempotent() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        let edge = graph.connect_entries(a, "Value", op, "Value 1").unwrap();
        assert!(graph.remove_edge(edge));
        assert!(!graph.remove_edge(edge));
    }

    #[test]
    fn test_foreign_scope_rejected() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        let start = graph.entry_socket(a, "Value").unwrap().clone();
        let end = graph.entry_socket(op, "Value 1").unwrap().clone();
        let other = GraphId::new();
        assert!(matches!(
            graph.connect_scoped(&start, &end, Some(other)),
            Err(TopologyError::ForeignScope(id)) if id == other
        ));
        assert!(matches!(
            graph.connect(&SocketId::new(), &SocketId::new()),
            Err(TopologyError::Scope(ScopeError::Missing))
        ));
    }

    #[test]
    fn test_retarget_edge_end() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        let edge = graph.connect_entries(a, "Value", op, "Value 1").unwrap();
        let old = graph.entry_socket(op, "Value 1").unwrap().clone();
        let new = graph.entry_socket(op, "Value 2").unwrap().clone();

        let mut events = graph.subscribe();
        graph.set_edge_end(edge, &new).unwrap();
        assert_eq!(graph.edge(edge).unwrap().end(), &new);
        assert!(!graph.socket(&old).unwrap().is_connected());
        assert_eq!(graph.socket(&new).unwrap().edges(), &[edge]);

        let mut retargeted = false;
        while let Ok(event) = events.try_recv() {
            retargeted |= matches!(event, GraphEvent::EdgeRetargeted { .. });
        }
        assert!(retargeted);

        let output = graph.entry_socket(op, "Output").unwrap().clone();
        let constant = graph.entry_socket(a, "Value").unwrap().clone();
        assert!(graph.set_edge_end(edge, &constant).is_err());
        assert!(matches!(
            graph.set_edge_end(edge, &output),
            Err(TopologyError::SamePolarity(_)) | Err(TopologyError::SameNode)
        ));
    }

    #[test]
    fn test_remove_entry_cascades_edges() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        graph.connect_entries(a, "Value", op, "Value 1").unwrap();

        let removed = graph.remove_entry(op, "Value 1").unwrap();
        assert_eq!(removed.name(), "Value 1");
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.node(op).unwrap().entries().contains("Value 1"));
        assert!(graph.socket_owner(removed.socket().unwrap().id()).is_none());
    }

    #[test]
    fn test_add_entry_registers_socket() {
        let mut graph = graph();
        let out = graph.create_node(OUTPUT).unwrap();
        let index = graph.add_entry(out, Entry::label("Value 3", EntryKind::Input)).unwrap();
        assert_eq!(index, 2);
        let socket = graph.entry_socket(out, "Value 3").unwrap().clone();
        assert_eq!(graph.socket_owner(&socket), Some(out));
    }

    #[test]
    fn test_find_output_node_cardinality() {
        let mut graph = graph();
        assert!(matches!(
            graph.find_output_node(),
            Err(EvaluationError::NoOutputInstance(_))
        ));
        let out = graph.create_node(OUTPUT).unwrap();
        assert_eq!(graph.find_output_node().unwrap(), out);
        graph.create_node(OUTPUT).unwrap();
        assert!(matches!(
            graph.find_output_node(),
            Err(EvaluationError::MultipleOutputInstances { count: 2, .. })
        ));
        graph.set_output_type(None).unwrap();
        assert!(matches!(
            graph.find_output_node(),
            Err(EvaluationError::NoOutputTypeSet)
        ));
        assert!(graph.set_output_type(Some(NodeCode(99))).is_err());
    }

    #[test]
    fn test_two_cycle_detected() {
        let mut graph = graph();
        let a = graph.create_node(OPERATION).unwrap();
        let b = graph.create_node(OPERATION).unwrap();
        graph.connect_entries(a, "Output", b, "Value 1").unwrap();
        assert!(!graph.has_cycles());
        graph.connect_entries(b, "Output", a, "Value 1").unwrap();
        assert!(graph.has_cycles());
    }

    #[test]
    fn test_set_entry_value_invalidates_downstream() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let op = graph.create_node(OPERATION).unwrap();
        let out = graph.create_node(OUTPUT).unwrap();
        graph.connect_entries(a, "Value", op, "Value 1").unwrap();
        graph.connect_entries(op, "Output", out, "Value 1").unwrap();
        graph.evaluate_blocking().unwrap();
        assert!(graph.node(a).unwrap().is_cached());
        assert!(graph.node(op).unwrap().is_cached());

        graph.set_entry_value(a, "Value", json!(2)).unwrap();
        assert!(!graph.node(a).unwrap().is_cached());
        assert!(!graph.node(op).unwrap().is_cached());
    }

    #[test]
    fn test_reachable_subgraph_excludes_unrelated_nodes() {
        let mut graph = graph();
        let a = graph.create_node(CONSTANT).unwrap();
        let out = graph.create_node(OUTPUT).unwrap();
        let stray = graph.create_node(CONSTANT).unwrap();
        graph.connect_entries(a, "Value", out, "Value 1").unwrap();
        let reachable = graph.reachable_subgraph().unwrap();
        assert!(reachable.contains(&a) && reachable.contains(&out));
        assert!(!reachable.contains(&stray));
    }
}
