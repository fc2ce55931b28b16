//! Schema descriptors.
//!
//! The schema system itself lives outside the member; registrations only carry
//! the descriptor of the concrete type they expect at their depth.

use crate::domain::key::Key;
use serde::{Deserialize, Serialize};

/// One node on the path from the namespace root to a schema type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaStep {
    /// Node name.
    pub name: String,
    /// List key leaf names, empty for containers.
    pub key_names: Vec<String>,
}

impl SchemaStep {
    /// Container node.
    pub fn container(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_names: Vec::new(),
        }
    }

    /// List node keyed by `key_names`.
    pub fn list<I, S>(name: impl Into<String>, key_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            key_names: key_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// Concrete type of a registration's subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Type name (message descriptor id).
    pub type_name: String,
    /// Path from the namespace root.
    pub path: Vec<SchemaStep>,
}

impl SchemaDescriptor {
    /// Create a descriptor.
    pub fn new(type_name: impl Into<String>, path: Vec<SchemaStep>) -> Self {
        Self {
            type_name: type_name.into(),
            path,
        }
    }

    /// Depth of the described node.
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// A key that has been narrowed to a concrete schema type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedKey {
    /// The key.
    pub key: Key,
    /// Concrete type name.
    pub type_name: String,
}
