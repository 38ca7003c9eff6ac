// SPDX-License-Identifier: MIT OR Apache-2.0
//! Entries: the named slots of a node.

use crate::socket::Socket;
use crate::widget::{EntryWidget, Label, WidgetError};
use serde_json::Value;
use std::fmt;

/// What an entry does within its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A value the user sets, without a socket
    Static,
    /// A value read from a connected output, or from the widget when unconnected
    Input,
    /// A value computed by the node
    Output,
}

impl EntryKind {
    /// Whether entries of this kind carry a socket
    pub fn has_socket(self) -> bool {
        !matches!(self, Self::Static)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => f.write_str("static"),
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Refers to an entry of a node either by name or by position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryRef {
    /// Entry with this name
    Name(String),
    /// Entry at this index
    Index(usize),
}

impl From<&str> for EntryRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for EntryRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for EntryRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "'{name}'"),
            Self::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// Error when building or editing the entries of a node
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntryError {
    /// Another entry already uses the name
    #[error("An entry with the name '{0}' already exists")]
    DuplicateName(String),

    /// No such entry
    #[error("Entry {0} does not exist")]
    NotFound(EntryRef),

    /// Insertion index past the end of the entry list
    #[error("Cannot insert entry at index {index}, node has {len} entries")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Current number of entries
        len: usize,
    },

    /// The widget may only be used on static entries
    #[error("Entry '{name}': {widget} entries can only be static")]
    StaticOnly {
        /// Entry name
        name: String,
        /// Widget kind
        widget: &'static str,
    },

    /// The entry still has connected edges
    #[error("Entry '{0}' still has connected edges")]
    Connected(String),

    /// The widget refused a value
    #[error("Entry '{name}': {source}")]
    Widget {
        /// Entry name
        name: String,
        /// Widget error
        #[source]
        source: WidgetError,
    },
}

/// A named slot on a node: a widget providing a value, plus a socket for
/// inputs and outputs.
#[derive(Debug)]
pub struct Entry {
    name: String,
    kind: EntryKind,
    widget: Box<dyn EntryWidget>,
    socket: Option<Socket>,
}

impl Entry {
    /// Create an entry around a widget
    pub fn new(
        name: impl Into<String>,
        kind: EntryKind,
        widget: impl EntryWidget + 'static,
    ) -> Result<Self, EntryError> {
        Self::with_widget(name, kind, Box::new(widget))
    }

    /// Create an entry around a boxed widget
    pub fn with_widget(
        name: impl Into<String>,
        kind: EntryKind,
        widget: Box<dyn EntryWidget>,
    ) -> Result<Self, EntryError> {
        let name = name.into();
        if widget.static_only() && kind != EntryKind::Static {
            return Err(EntryError::StaticOnly {
                name,
                widget: widget.kind(),
            });
        }
        Ok(Self {
            name,
            kind,
            widget,
            socket: kind.has_socket().then(Socket::new),
        })
    }

    /// Create an entry that only shows its name
    pub fn label(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            widget: Box::new(Label),
            socket: kind.has_socket().then(Socket::new),
        }
    }

    /// Entry name, unique within its node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry kind
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Whether this is an input entry
    pub fn is_input(&self) -> bool {
        self.kind == EntryKind::Input
    }

    /// Whether this is an output entry
    pub fn is_output(&self) -> bool {
        self.kind == EntryKind::Output
    }

    /// The socket, present for inputs and outputs
    pub fn socket(&self) -> Option<&Socket> {
        self.socket.as_ref()
    }

    pub(crate) fn socket_mut(&mut self) -> Option<&mut Socket> {
        self.socket.as_mut()
    }

    /// Whether an input reads its value through an edge rather than its widget
    pub fn is_connected_input(&self) -> bool {
        self.is_input() && self.socket.as_ref().is_some_and(Socket::is_connected)
    }

    /// The widget providing the value
    pub fn widget(&self) -> &dyn EntryWidget {
        self.widget.as_ref()
    }

    pub(crate) fn widget_mut(&mut self) -> &mut dyn EntryWidget {
        self.widget.as_mut()
    }

    /// Current widget value
    pub fn widget_value(&self) -> Value {
        self.widget.value()
    }

    /// Set the widget value
    pub fn set_value(&mut self, value: Value) -> Result<(), EntryError> {
        self.widget
            .set_value(value)
            .map_err(|source| EntryError::Widget {
                name: self.name.clone(),
                source,
            })
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} entry '{}'>", self.kind, self.name)
    }
}

/// Ordered entries of a node with unique names
#[derive(Debug, Default)]
pub struct EntryList {
    entries: Vec<Entry>,
}

impl EntryList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, returning its index
    pub fn add(&mut self, entry: Entry) -> Result<usize, EntryError> {
        self.ensure_unique(entry.name())?;
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    /// Insert an entry at `index`, shifting later entries back
    pub fn insert(&mut self, index: usize, entry: Entry) -> Result<(), EntryError> {
        self.ensure_unique(entry.name())?;
        if index > self.entries.len() {
            return Err(EntryError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.entries.insert(index, entry);
        Ok(())
    }

    /// Remove an entry
    pub fn remove(&mut self, entry: &EntryRef) -> Option<Entry> {
        let index = self.index_of(entry)?;
        Some(self.entries.remove(index))
    }

    /// Position of an entry
    pub fn index_of(&self, entry: &EntryRef) -> Option<usize> {
        match entry {
            EntryRef::Name(name) => self.entries.iter().position(|e| e.name == *name),
            EntryRef::Index(index) => (*index < self.entries.len()).then_some(*index),
        }
    }

    /// Entry by name
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entry by reference
    pub fn resolve(&self, entry: &EntryRef) -> Option<&Entry> {
        self.index_of(entry).map(|index| &self.entries[index])
    }

    pub(crate) fn resolve_mut(&mut self, entry: &EntryRef) -> Option<&mut Entry> {
        let index = self.index_of(entry)?;
        self.entries.get_mut(index)
    }

    /// Whether an entry with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Entry names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Entry::name)
    }

    /// Iterate over the entries in order
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entry> {
        self.entries.iter_mut()
    }

    /// The entries as a slice
    pub fn as_slice(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_unique(&self, name: &str) -> Result<(), EntryError> {
        if self.contains(name) {
            return Err(EntryError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a EntryList {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{ComboBox, ValueBox};
    use serde_json::json;

    #[test]
    fn test_socket_only_for_inputs_and_outputs() {
        assert!(Entry::label("a", EntryKind::Static).socket().is_none());
        assert!(Entry::label("b", EntryKind::Input).socket().is_some());
        assert!(Entry::label("c", EntryKind::Output).socket().is_some());
    }

    #[test]
    fn test_static_only_widget_rejected_on_input() {
        let result = Entry::new("op", EntryKind::Input, ComboBox::new(["a"]));
        assert!(matches!(result, Err(EntryError::StaticOnly { .. })));
        assert!(Entry::new("op", EntryKind::Static, ComboBox::new(["a"])).is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut list = EntryList::new();
        list.add(Entry::label("Value", EntryKind::Input)).unwrap();
        let err = list.add(Entry::label("Value", EntryKind::Output)).unwrap_err();
        assert_eq!(err, EntryError::DuplicateName("Value".into()));
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut list = EntryList::new();
        list.add(Entry::label("a", EntryKind::Static)).unwrap();
        list.add(Entry::label("c", EntryKind::Static)).unwrap();
        list.insert(1, Entry::label("b", EntryKind::Static)).unwrap();
        assert_eq!(list.names().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert!(list.insert(9, Entry::label("d", EntryKind::Static)).is_err());
    }

    #[test]
    fn test_remove_by_name_or_index() {
        let mut list = EntryList::new();
        list.add(Entry::label("a", EntryKind::Static)).unwrap();
        list.add(Entry::label("b", EntryKind::Static)).unwrap();
        list.add(Entry::label("c", EntryKind::Static)).unwrap();

        assert_eq!(list.remove(&"b".into()).map(|e| e.name().to_string()), Some("b".into()));
        assert_eq!(list.remove(&0.into()).map(|e| e.name().to_string()), Some("a".into()));
        assert!(list.remove(&"zzz".into()).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_set_value_through_widget() {
        let mut entry = Entry::new("v", EntryKind::Input, ValueBox::new(1.0)).unwrap();
        entry.set_value(json!(3.5)).unwrap();
        assert_eq!(entry.widget_value(), json!(3.5));
        assert!(matches!(
            entry.set_value(json!("x")),
            Err(EntryError::Widget { .. })
        ));
    }
}
