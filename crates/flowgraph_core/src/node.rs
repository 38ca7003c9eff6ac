// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph framework.
//!
//! A [`Node`] is an ordered list of entries plus a [`NodeLogic`] that fills
//! the entries in [`NodeLogic::create`] and computes the outputs in
//! [`NodeLogic::evaluate`]. Computed outputs are cached on the node until
//! something they depend on changes.

use crate::entry::{Entry, EntryError, EntryKind, EntryList, EntryRef};
use crate::graph::GraphId;
use crate::socket::Socket;
use crate::widget::{ComboBox, TextBox, ValueBox};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Author-assigned code identifying a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeCode(pub i64);

impl From<i64> for NodeCode {
    fn from(code: i64) -> Self {
        Self(code)
    }
}

impl fmt::Display for NodeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Position of a node in the editor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Position {
    /// Create a position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Computed output values of a node by entry name
pub type Outputs = IndexMap<String, Value>;

/// Values of all entries of a node by entry name, passed to [`NodeLogic::evaluate`]
pub type EntryValues = IndexMap<String, Value>;

/// Error raised by node logic
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Attempt to set a value on an entry that is not an output of the node
    #[error("Entry '{0}' is not an output of this node")]
    InvalidEntry(String),

    /// A value the node needs is missing
    #[error("Missing value for entry '{0}'")]
    MissingValue(String),

    /// A value has the wrong type
    #[error("Entry '{entry}' expected {expected}, got {found}")]
    TypeMismatch {
        /// Entry name
        entry: String,
        /// Expected type
        expected: &'static str,
        /// Actual value
        found: Value,
    },

    /// The computation failed
    #[error("{0}")]
    Failed(String),

    /// Any other error from user code
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl NodeError {
    /// Read a numeric entry value
    pub fn number(values: &EntryValues, entry: &str) -> Result<f64, NodeError> {
        let value = values
            .get(entry)
            .ok_or_else(|| NodeError::MissingValue(entry.to_string()))?;
        value.as_f64().ok_or_else(|| NodeError::TypeMismatch {
            entry: entry.to_string(),
            expected: "a number",
            found: value.clone(),
        })
    }
}

/// Collects the outputs of a node during [`NodeLogic::evaluate`].
///
/// Every output entry starts unset and must be set before `evaluate` returns.
#[derive(Debug)]
pub struct OutputWriter<'a> {
    entries: &'a EntryList,
    values: IndexMap<String, Option<Value>>,
}

impl<'a> OutputWriter<'a> {
    pub(crate) fn new(entries: &'a EntryList) -> Self {
        let values = entries
            .iter()
            .filter(|entry| entry.is_output())
            .map(|entry| (entry.name().to_string(), None))
            .collect();
        Self { entries, values }
    }

    /// Set the value of an output entry
    pub fn set(&mut self, entry: &str, value: impl Into<Value>) -> Result<(), NodeError> {
        match self.values.get_mut(entry) {
            Some(slot) => {
                *slot = Some(value.into());
                Ok(())
            }
            None => Err(NodeError::InvalidEntry(entry.to_string())),
        }
    }

    /// Whether an output has been set
    pub fn is_set(&self, entry: &str) -> bool {
        self.values.get(entry).is_some_and(Option::is_some)
    }

    /// Entries of the node being evaluated
    pub fn entries(&self) -> &EntryList {
        self.entries
    }

    /// All outputs, or the name of the first one left unset
    pub(crate) fn finish(self) -> Result<Outputs, String> {
        self.values
            .into_iter()
            .map(|(name, value)| match value {
                Some(value) => Ok((name, value)),
                None => Err(name),
            })
            .collect()
    }
}

/// Behaviour of a node type.
///
/// `create` and `evaluate` are required; `save` and `load` default to
/// persisting nothing.
pub trait NodeLogic: fmt::Debug + Send + Sync {
    /// Set the title and add the entries of a freshly created node
    fn create(&mut self, node: &mut NodeBuilder<'_>) -> Result<(), EntryError>;

    /// Compute the outputs from the values of all entries
    fn evaluate(&self, values: &EntryValues, outputs: &mut OutputWriter<'_>)
        -> Result<(), NodeError>;

    /// Node-specific state, stored under `custom`
    fn save(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Restore node-specific state. Returns `false` if part of it was unusable.
    fn load(&mut self, custom: &Map<String, Value>) -> bool {
        let _ = custom;
        true
    }
}

/// Handed to [`NodeLogic::create`] to set up a new node
pub struct NodeBuilder<'a> {
    title: &'a mut String,
    entries: &'a mut EntryList,
}

impl NodeBuilder<'_> {
    /// Set the node title
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        *self.title = title.into();
        self
    }

    /// Append an entry
    pub fn add_entry(&mut self, entry: Entry) -> Result<&mut Self, EntryError> {
        self.entries.add(entry)?;
        Ok(self)
    }

    /// Insert an entry at `index`
    pub fn insert_entry(&mut self, index: usize, entry: Entry) -> Result<&mut Self, EntryError> {
        self.entries.insert(index, entry)?;
        Ok(self)
    }

    /// Append an entry with a value box
    pub fn add_value_entry(
        &mut self,
        name: &str,
        kind: EntryKind,
        value_box: ValueBox,
    ) -> Result<&mut Self, EntryError> {
        self.add_entry(Entry::new(name, kind, value_box)?)
    }

    /// Append an input with a value box
    pub fn add_value_input(&mut self, name: &str, value_box: ValueBox) -> Result<&mut Self, EntryError> {
        self.add_value_entry(name, EntryKind::Input, value_box)
    }

    /// Append an output with a value box
    pub fn add_value_output(&mut self, name: &str, value_box: ValueBox) -> Result<&mut Self, EntryError> {
        self.add_value_entry(name, EntryKind::Output, value_box)
    }

    /// Append an entry showing only its name
    pub fn add_label_entry(&mut self, name: &str, kind: EntryKind) -> Result<&mut Self, EntryError> {
        self.add_entry(Entry::label(name, kind))
    }

    /// Append an input showing only its name
    pub fn add_label_input(&mut self, name: &str) -> Result<&mut Self, EntryError> {
        self.add_label_entry(name, EntryKind::Input)
    }

    /// Append an output showing only its name
    pub fn add_label_output(&mut self, name: &str) -> Result<&mut Self, EntryError> {
        self.add_label_entry(name, EntryKind::Output)
    }

    /// Append an entry with a text box
    pub fn add_text_entry(
        &mut self,
        name: &str,
        kind: EntryKind,
        text_box: TextBox,
    ) -> Result<&mut Self, EntryError> {
        self.add_entry(Entry::new(name, kind, text_box)?)
    }

    /// Append an input with a text box
    pub fn add_text_input(&mut self, name: &str, text_box: TextBox) -> Result<&mut Self, EntryError> {
        self.add_text_entry(name, EntryKind::Input, text_box)
    }

    /// Append a static entry with a combo box
    pub fn add_combo_box_entry(&mut self, name: &str, combo_box: ComboBox) -> Result<&mut Self, EntryError> {
        self.add_entry(Entry::new(name, EntryKind::Static, combo_box)?)
    }
}

/// A node instance
pub struct Node {
    id: NodeId,
    code: NodeCode,
    title: String,
    position: Position,
    entries: EntryList,
    logic: Box<dyn NodeLogic>,
    output: Mutex<Option<Outputs>>,
    graph: Option<GraphId>,
}

impl Node {
    /// Create a node and let its logic populate the entries
    pub fn new(code: NodeCode, mut logic: Box<dyn NodeLogic>) -> Result<Self, EntryError> {
        let mut title = String::from("Node");
        let mut entries = EntryList::new();
        logic.create(&mut NodeBuilder {
            title: &mut title,
            entries: &mut entries,
        })?;
        Ok(Self {
            id: NodeId::new(),
            code,
            title,
            position: Position::default(),
            entries,
            logic,
            output: Mutex::new(None),
            graph: None,
        })
    }

    /// Set the position
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Unique instance ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Type code
    pub fn code(&self) -> NodeCode {
        self.code
    }

    /// Display title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Change the display title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Position in the editor
    pub fn position(&self) -> Position {
        self.position
    }

    /// Move the node
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Graph the node is placed in
    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    /// The node's logic
    pub fn logic(&self) -> &dyn NodeLogic {
        self.logic.as_ref()
    }

    /// Entries in order
    pub fn entries(&self) -> &EntryList {
        &self.entries
    }

    /// Entry by name
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Sockets of all input and output entries, in entry order
    pub fn sockets(&self) -> impl Iterator<Item = &Socket> {
        self.entries.iter().filter_map(Entry::socket)
    }

    /// Append an entry
    pub fn add_entry(&mut self, entry: Entry) -> Result<usize, EntryError> {
        let index = self.entries.add(entry)?;
        self.clear_output();
        Ok(index)
    }

    /// Insert an entry at `index`
    pub fn insert_entry(&mut self, index: usize, entry: Entry) -> Result<(), EntryError> {
        self.entries.insert(index, entry)?;
        self.clear_output();
        Ok(())
    }

    /// Remove an entry that has no connected edges.
    ///
    /// Use [`Graph::remove_entry`](crate::Graph::remove_entry) to remove a
    /// connected entry together with its edges.
    pub fn remove_entry(&mut self, entry: &EntryRef) -> Result<Entry, EntryError> {
        let found = self
            .entries
            .resolve(entry)
            .ok_or_else(|| EntryError::NotFound(entry.clone()))?;
        if found.socket().is_some_and(Socket::is_connected) {
            return Err(EntryError::Connected(found.name().to_string()));
        }
        self.clear_output();
        self.entries
            .remove(entry)
            .ok_or_else(|| EntryError::NotFound(entry.clone()))
    }

    /// Set the widget value of an entry
    pub fn set_entry_value(&mut self, entry: &EntryRef, value: Value) -> Result<(), EntryError> {
        self.entries
            .resolve_mut(entry)
            .ok_or_else(|| EntryError::NotFound(entry.clone()))?
            .set_value(value)?;
        self.clear_output();
        Ok(())
    }

    /// Cached outputs, if the node has been evaluated since the last invalidation
    pub fn cached_output(&self) -> Option<Outputs> {
        self.output.lock().clone()
    }

    /// Whether outputs are cached
    pub fn is_cached(&self) -> bool {
        self.output.lock().is_some()
    }

    /// Drop the cached outputs
    pub fn clear_output(&self) {
        *self.output.lock() = None;
    }

    pub(crate) fn store_output(&self, outputs: Outputs) {
        *self.output.lock() = Some(outputs);
    }

    pub(crate) fn entries_mut(&mut self) -> &mut EntryList {
        &mut self.entries
    }

    pub(crate) fn logic_mut(&mut self) -> &mut dyn NodeLogic {
        self.logic.as_mut()
    }

    pub(crate) fn set_graph(&mut self, graph: Option<GraphId>) {
        self.graph = graph;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("title", &self.title)
            .field("position", &self.position)
            .field("entries", &self.entries)
            .field("logic", &self.logic)
            .field("cached", &self.is_cached())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Node '{}' with {} entries>", self.title, self.entries.len())
    }
}
