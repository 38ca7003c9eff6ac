// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sockets: the connection points of input and output entries.

use crate::edge::EdgeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a socket.
///
/// Socket ids are strings so that saved graphs can reference them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(String);

impl SocketId {
    /// Mint a fresh, globally unique socket ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SocketId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SocketId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection endpoint owned by an input or output entry.
///
/// The socket only records which edges are attached to it; the edges
/// themselves live in the graph. Attaching and detaching is driven by the
/// graph so that both sockets of an edge stay consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    id: SocketId,
    edges: Vec<EdgeId>,
}

impl Socket {
    /// Create an unconnected socket with a fresh ID
    pub fn new() -> Self {
        Self {
            id: SocketId::new(),
            edges: Vec::new(),
        }
    }

    /// Socket ID
    pub fn id(&self) -> &SocketId {
        &self.id
    }

    /// Connected edges, oldest first
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// First connected edge, the one an input reads its value through
    pub fn first_edge(&self) -> Option<EdgeId> {
        self.edges.first().copied()
    }

    /// Whether any edge is attached
    pub fn is_connected(&self) -> bool {
        !self.edges.is_empty()
    }

    /// Number of attached edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether no edge is attached
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Append an edge. Returns `false` if it was already attached.
    pub(crate) fn add_edge(&mut self, edge: EdgeId) -> bool {
        if self.edges.contains(&edge) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Detach an edge. Returns `false` (and changes nothing) if it was not attached.
    pub(crate) fn remove_edge(&mut self, edge: EdgeId) -> bool {
        match self.edges.iter().position(|e| *e == edge) {
            Some(index) => {
                self.edges.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_id(&mut self, id: SocketId) {
        self.id = id;
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}
