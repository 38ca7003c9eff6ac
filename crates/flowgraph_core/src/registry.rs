// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of node types, keyed by code.
//!
//! Node types are arranged in a nested [`Namespace`] for presentation
//! (menus, palettes). Codes must be unique across the whole namespace.

use crate::entry::EntryError;
use crate::node::{Node, NodeCode, NodeLogic};
use indexmap::IndexMap;
use std::fmt;

/// Factory producing fresh logic for a node type
pub type NodeFactory = fn() -> Box<dyn NodeLogic>;

/// A registered node type
#[derive(Clone)]
pub struct NodeType {
    /// Unique code
    pub code: NodeCode,
    /// Display name
    pub name: String,
    /// Logic factory
    pub factory: NodeFactory,
}

impl NodeType {
    /// Create a node type
    pub fn new(code: impl Into<NodeCode>, name: impl Into<String>, factory: NodeFactory) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            factory,
        }
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("code", &self.code)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Item of a namespace: a node type or a nested section
#[derive(Debug, Clone)]
pub enum NamespaceItem {
    /// A node type
    Type(NodeType),
    /// A nested section
    Section(Namespace),
}

/// Nested, ordered collection of node types
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    items: IndexMap<String, NamespaceItem>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node type under its name
    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.items
            .insert(node_type.name.clone(), NamespaceItem::Type(node_type));
        self
    }

    /// Add a nested section
    pub fn with_section(mut self, name: impl Into<String>, section: Namespace) -> Self {
        self.items.insert(name.into(), NamespaceItem::Section(section));
        self
    }

    /// Items in insertion order
    pub fn items(&self) -> impl Iterator<Item = (&str, &NamespaceItem)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    /// All node types, depth first
    pub fn types(&self) -> Vec<&NodeType> {
        let mut types = Vec::new();
        self.collect_types(&mut types);
        types
    }

    fn collect_types<'a>(&'a self, types: &mut Vec<&'a NodeType>) {
        for item in self.items.values() {
            match item {
                NamespaceItem::Type(node_type) => types.push(node_type),
                NamespaceItem::Section(section) => section.collect_types(types),
            }
        }
    }
}

/// Error from the node type registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two node types share a code
    #[error("Duplicate node code {code}: '{existing}' and '{duplicate}'")]
    DuplicateNodeCode {
        /// The shared code
        code: NodeCode,
        /// Name of the type registered first
        existing: String,
        /// Name of the type registered second
        duplicate: String,
    },

    /// No type is registered under the code
    #[error("No node type registered with code {0}")]
    UnknownCode(NodeCode),

    /// The node type failed to create its entries
    #[error("Failed to create node with code {code}: {source}")]
    Create {
        /// Code of the node type
        code: NodeCode,
        /// Entry error raised by `create`
        #[source]
        source: EntryError,
    },
}

/// Validated lookup of node types by code
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    namespace: Namespace,
    types: IndexMap<NodeCode, NodeType>,
}

impl NodeRegistry {
    /// Build a registry, failing if any code appears twice anywhere in the namespace
    pub fn new(namespace: Namespace) -> Result<Self, RegistryError> {
        let mut types: IndexMap<NodeCode, NodeType> = IndexMap::new();
        for node_type in namespace.types() {
            if let Some(existing) = types.get(&node_type.code) {
                return Err(RegistryError::DuplicateNodeCode {
                    code: node_type.code,
                    existing: existing.name.clone(),
                    duplicate: node_type.name.clone(),
                });
            }
            types.insert(node_type.code, node_type.clone());
        }
        Ok(Self { namespace, types })
    }

    /// Add a node type at the top level of the namespace
    pub fn register(&mut self, node_type: NodeType) -> Result<(), RegistryError> {
        if let Some(existing) = self.types.get(&node_type.code) {
            return Err(RegistryError::DuplicateNodeCode {
                code: node_type.code,
                existing: existing.name.clone(),
                duplicate: node_type.name,
            });
        }
        self.types.insert(node_type.code, node_type.clone());
        self.namespace = std::mem::take(&mut self.namespace).with_type(node_type);
        Ok(())
    }

    /// The namespace the registry was built from
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Node type by code
    pub fn get(&self, code: NodeCode) -> Option<&NodeType> {
        self.types.get(&code)
    }

    /// Whether a type is registered under the code
    pub fn contains(&self, code: NodeCode) -> bool {
        self.types.contains_key(&code)
    }

    /// All registered codes
    pub fn codes(&self) -> impl Iterator<Item = NodeCode> + '_ {
        self.types.keys().copied()
    }

    /// Instantiate a node of the given type
    pub fn create_node(&self, code: NodeCode) -> Result<Node, RegistryError> {
        let node_type = self.get(code).ok_or(RegistryError::UnknownCode(code))?;
        Node::new(code, (node_type.factory)()).map_err(|source| RegistryError::Create { code, source })
    }
}
