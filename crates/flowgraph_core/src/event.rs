// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notifications emitted by a [`Graph`](crate::Graph).

use crate::edge::{EdgeEnd, EdgeId};
use crate::node::{NodeCode, NodeId};
use crate::socket::SocketId;
use tokio::sync::mpsc;

/// A change to a graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A node was added
    NodeAdded(NodeId),
    /// A node was removed, after its edges
    NodeRemoved(NodeId),
    /// An edge was created
    EdgeAdded(EdgeId),
    /// An edge was removed
    EdgeRemoved(EdgeId),
    /// One end of an edge moved to another socket
    EdgeRetargeted {
        /// The edge
        edge: EdgeId,
        /// Which end moved
        end: EdgeEnd,
        /// Previous socket
        from: SocketId,
        /// New socket
        to: SocketId,
    },
    /// An edge was attached to a socket
    SocketConnected {
        /// The socket
        socket: SocketId,
        /// The edge
        edge: EdgeId,
    },
    /// An edge was detached from a socket
    SocketDisconnected {
        /// The socket
        socket: SocketId,
        /// The edge
        edge: EdgeId,
    },
    /// The value of an entry changed
    EntryValueChanged {
        /// Owning node
        node: NodeId,
        /// Entry name
        entry: String,
    },
    /// Entries were added to or removed from a node
    EntriesChanged(NodeId),
    /// Title or position of a node changed
    NodeChanged(NodeId),
    /// The output node type changed
    OutputTypeChanged(Option<NodeCode>),
    /// All nodes and edges were removed
    Cleared,
}

/// Registered listeners for graph events
#[derive(Debug, Default)]
pub(crate) struct Observers {
    senders: Vec<mpsc::UnboundedSender<GraphEvent>>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self) -> mpsc::UnboundedReceiver<GraphEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx);
        rx
    }

    /// Deliver an event, dropping listeners whose receiver is gone
    pub(crate) fn emit(&mut self, event: GraphEvent) {
        if self.senders.is_empty() {
            return;
        }
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_receivers_are_dropped() {
        let mut observers = Observers::default();
        let mut kept = observers.subscribe();
        drop(observers.subscribe());

        observers.emit(GraphEvent::Cleared);
        assert_eq!(observers.senders.len(), 1);
        assert_eq!(kept.try_recv().unwrap(), GraphEvent::Cleared);
    }
}
