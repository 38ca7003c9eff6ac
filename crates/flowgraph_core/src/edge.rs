// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edges between sockets and the rules for which graph an edge belongs to.

use crate::graph::GraphId;
use crate::socket::SocketId;
use crate::state::EdgeState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    /// Create a new random edge ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

/// One of the two ends of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeEnd {
    /// The socket the edge was dragged from
    Start,
    /// The socket the edge was dropped on
    End,
}

/// A connection between two sockets of opposite polarity.
///
/// Start and end carry no direction of data flow: the input side always
/// reads from the output side, whichever end each of them is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Unique edge ID
    pub id: EdgeId,
    start: SocketId,
    end: SocketId,
}

impl Edge {
    pub(crate) fn new(start: SocketId, end: SocketId) -> Self {
        Self {
            id: EdgeId::new(),
            start,
            end,
        }
    }

    /// Socket at the start of the edge
    pub fn start(&self) -> &SocketId {
        &self.start
    }

    /// Socket at the end of the edge
    pub fn end(&self) -> &SocketId {
        &self.end
    }

    /// Socket at the given end
    pub fn socket(&self, end: EdgeEnd) -> &SocketId {
        match end {
            EdgeEnd::Start => &self.start,
            EdgeEnd::End => &self.end,
        }
    }

    /// The socket on the other side of `socket`, if `socket` is one of the ends
    pub fn opposite(&self, socket: &SocketId) -> Option<&SocketId> {
        if *socket == self.start {
            Some(&self.end)
        } else if *socket == self.end {
            Some(&self.start)
        } else {
            None
        }
    }

    pub(crate) fn set_socket(&mut self, end: EdgeEnd, socket: SocketId) -> SocketId {
        match end {
            EdgeEnd::Start => std::mem::replace(&mut self.start, socket),
            EdgeEnd::End => std::mem::replace(&mut self.end, socket),
        }
    }

    /// Serializable state: the IDs of both sockets
    pub fn get_state(&self) -> EdgeState {
        EdgeState {
            start: Some(self.start.clone()),
            end: Some(self.end.clone()),
        }
    }
}

/// Error when the graph an edge belongs to cannot be determined
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// Neither socket is placed in a graph and none was given
    #[error("No graph provided and none could be deduced from the sockets")]
    Missing,

    /// The sockets are placed in different graphs
    #[error("Start and end sockets are in different graphs ({start:?} and {end:?})")]
    Conflicting {
        /// Graph of the start socket
        start: GraphId,
        /// Graph of the end socket
        end: GraphId,
    },
}

/// Decide which graph a new edge belongs to.
///
/// An explicitly given graph always wins. Otherwise the edge joins the
/// graph of whichever socket is placed; if both are placed they must agree.
pub fn resolve_scope(
    start: Option<GraphId>,
    end: Option<GraphId>,
    explicit: Option<GraphId>,
) -> Result<GraphId, ScopeError> {
    if let Some(graph) = explicit {
        return Ok(graph);
    }
    match (start, end) {
        (Some(start), None) => Ok(start),
        (None, Some(end)) => Ok(end),
        (Some(start), Some(end)) if start == end => Ok(start),
        (Some(start), Some(end)) => Err(ScopeError::Conflicting { start, end }),
        (None, None) => Err(ScopeError::Missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_prefers_explicit_graph() {
        let a = GraphId::new();
        let b = GraphId::new();
        assert_eq!(resolve_scope(Some(a), Some(b), Some(b)), Ok(b));
    }

    #[test]
    fn test_scope_inferred_from_placed_socket() {
        let a = GraphId::new();
        assert_eq!(resolve_scope(Some(a), None, None), Ok(a));
        assert_eq!(resolve_scope(None, Some(a), None), Ok(a));
        assert_eq!(resolve_scope(Some(a), Some(a), None), Ok(a));
    }

    #[test]
    fn test_scope_errors() {
        let a = GraphId::new();
        let b = GraphId::new();
        assert_eq!(resolve_scope(None, None, None), Err(ScopeError::Missing));
        assert_eq!(
            resolve_scope(Some(a), Some(b), None),
            Err(ScopeError::Conflicting { start: a, end: b })
        );
    }

    #[test]
    fn test_opposite_socket() {
        let start = SocketId::from("s");
        let end = SocketId::from("e");
        let edge = Edge::new(start.clone(), end.clone());
        assert_eq!(edge.opposite(&start), Some(&end));
        assert_eq!(edge.opposite(&end), Some(&start));
        assert_eq!(edge.opposite(&SocketId::from("x")), None);
    }
}
