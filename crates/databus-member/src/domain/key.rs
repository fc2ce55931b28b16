//! # Hierarchical Keys
//!
//! A key addresses one node of the namespace as a sequence of path
//! elements, e.g. `/colony[name=c1]/bundle-ether[name=be1]`.
//!
//! - An element with predicates addresses a list entry.
//! - A predicate value of `*` is a wildcard.
//! - An element without predicates is a container.

use crate::domain::schema::{SchemaDescriptor, TypedKey};
use crate::error::KeyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Wildcard predicate text.
pub const WILDCARD: &str = "*";

/// Value side of a list predicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredicateValue {
    /// Concrete value.
    Exact(String),
    /// Matches any value.
    Wildcard,
}

impl PredicateValue {
    fn compatible(&self, other: &PredicateValue) -> bool {
        match (self, other) {
            (Self::Wildcard, _) | (_, Self::Wildcard) => true,
            (Self::Exact(a), Self::Exact(b)) => a == b,
        }
    }

    fn covers(&self, other: &PredicateValue) -> bool {
        match (self, other) {
            (Self::Wildcard, _) => true,
            (Self::Exact(_), Self::Wildcard) => false,
            (Self::Exact(a), Self::Exact(b)) => a == b,
        }
    }

    /// Whether a JSON leaf carries this value. Non-string leaves compare by
    /// their JSON text, so `[id=3]` matches both `"3"` and `3`.
    pub fn matches_leaf(&self, leaf: &Value) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Exact(v) => leaf_text(leaf).as_deref() == Some(v.as_str()),
        }
    }
}

/// Text form of a JSON key leaf.
pub fn leaf_text(leaf: &Value) -> Option<String> {
    match leaf {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One `[name=value]` predicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    /// Key leaf name.
    pub name: String,
    /// Key leaf value.
    pub value: PredicateValue,
}

/// One step of a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathElement {
    /// Node name.
    pub name: String,
    /// List predicates, empty for containers.
    pub predicates: Vec<Predicate>,
}

impl PathElement {
    /// Container element.
    pub fn container(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicates: Vec::new(),
        }
    }

    /// List entry element with concrete predicates.
    pub fn entry<I, K, V>(name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            predicates: keys
                .into_iter()
                .map(|(k, v)| {
                    let v = v.into();
                    Predicate {
                        name: k.into(),
                        value: if v == WILDCARD {
                            PredicateValue::Wildcard
                        } else {
                            PredicateValue::Exact(v)
                        },
                    }
                })
                .collect(),
        }
    }

    /// Whether this element addresses a list entry.
    pub fn is_list(&self) -> bool {
        !self.predicates.is_empty()
    }

    /// Whether any predicate is a wildcard.
    pub fn has_wildcards(&self) -> bool {
        self.predicates
            .iter()
            .any(|p| p.value == PredicateValue::Wildcard)
    }

    /// Look up a predicate value by key leaf name.
    pub fn predicate(&self, name: &str) -> Option<&PredicateValue> {
        self.predicates
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    fn same_shape(&self, other: &PathElement) -> bool {
        self.name == other.name
            && self.predicates.len() == other.predicates.len()
            && self
                .predicates
                .iter()
                .all(|p| other.predicate(&p.name).is_some())
    }

    /// Both elements can address the same node.
    pub fn compatible(&self, other: &PathElement) -> bool {
        self.same_shape(other)
            && self.predicates.iter().all(|p| {
                other
                    .predicate(&p.name)
                    .is_some_and(|v| p.value.compatible(v))
            })
    }

    /// Every node `other` addresses is also addressed by `self`.
    pub fn covers(&self, other: &PathElement) -> bool {
        self.same_shape(other)
            && self.predicates.iter().all(|p| {
                other
                    .predicate(&p.name)
                    .is_some_and(|v| p.value.covers(v))
            })
    }

    /// Fill wildcards in `self` from concrete values in `other`.
    pub fn merge(&self, other: &PathElement) -> PathElement {
        let predicates = self
            .predicates
            .iter()
            .map(|p| match (&p.value, other.predicate(&p.name)) {
                (PredicateValue::Wildcard, Some(v @ PredicateValue::Exact(_))) => Predicate {
                    name: p.name.clone(),
                    value: v.clone(),
                },
                _ => p.clone(),
            })
            .collect();
        PathElement {
            name: self.name.clone(),
            predicates,
        }
    }

    /// Whether a JSON list entry matches every predicate.
    pub fn matches_entry(&self, entry: &Value) -> bool {
        let Some(obj) = entry.as_object() else {
            return false;
        };
        self.predicates.iter().all(|p| match &p.value {
            PredicateValue::Wildcard => obj.contains_key(&p.name),
            exact => obj.get(&p.name).is_some_and(|leaf| exact.matches_leaf(leaf)),
        })
    }

    /// Concrete copy of `self` with wildcards resolved from a list entry.
    pub fn concretize(&self, entry: &Value) -> PathElement {
        let predicates = self
            .predicates
            .iter()
            .map(|p| match &p.value {
                PredicateValue::Wildcard => {
                    let value = entry
                        .get(&p.name)
                        .and_then(leaf_text)
                        .map_or(PredicateValue::Wildcard, PredicateValue::Exact);
                    Predicate {
                        name: p.name.clone(),
                        value,
                    }
                }
                PredicateValue::Exact(_) => p.clone(),
            })
            .collect();
        PathElement {
            name: self.name.clone(),
            predicates,
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for p in &self.predicates {
            match &p.value {
                PredicateValue::Exact(v) => write!(f, "[{}={}]", p.name, v)?,
                PredicateValue::Wildcard => write!(f, "[{}={}]", p.name, WILDCARD)?,
            }
        }
        Ok(())
    }
}

/// Hierarchical key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    elements: Vec<PathElement>,
}

impl Key {
    /// The root key `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a key from elements.
    pub fn from_elements(elements: Vec<PathElement>) -> Self {
        Self { elements }
    }

    /// Path elements, root first.
    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Number of path elements.
    pub fn depth(&self) -> usize {
        self.elements.len()
    }

    /// Whether any element carries a wildcard.
    pub fn has_wildcards(&self) -> bool {
        self.elements.iter().any(PathElement::has_wildcards)
    }

    /// `self` is an ancestor-or-self of `other`.
    pub fn is_subkey_of(&self, other: &Key) -> bool {
        self.depth() <= other.depth()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| a.covers(b))
    }

    /// The subtrees rooted at `self` and `other` overlap.
    pub fn intersects(&self, other: &Key) -> bool {
        self.elements
            .iter()
            .zip(&other.elements)
            .all(|(a, b)| a.compatible(b))
    }

    /// Combine two intersecting keys into the longer one, resolving
    /// wildcards from whichever side is concrete.
    pub fn merge(&self, other: &Key) -> Option<Key> {
        if !self.intersects(other) {
            return None;
        }
        let (long, short) = if self.depth() >= other.depth() {
            (self, other)
        } else {
            (other, self)
        };
        let elements = long
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| match short.elements.get(i) {
                Some(s) => e.merge(s),
                None => e.clone(),
            })
            .collect();
        Some(Key { elements })
    }

    /// The first `depth` elements.
    pub fn truncate(&self, depth: usize) -> Key {
        Key {
            elements: self.elements.iter().take(depth).cloned().collect(),
        }
    }

    /// Append one element.
    pub fn child(&self, element: PathElement) -> Key {
        let mut elements = self.elements.clone();
        elements.push(element);
        Key { elements }
    }

    /// Validate the key against a schema descriptor and tag it with the
    /// descriptor's concrete type.
    pub fn narrow(&self, schema: &SchemaDescriptor) -> Result<TypedKey, KeyError> {
        let mismatch = |reason: String| KeyError::SchemaMismatch {
            key: self.to_string(),
            type_name: schema.type_name.clone(),
            reason,
        };

        if schema.path.len() != self.depth() {
            return Err(mismatch(format!(
                "depth {} != schema depth {}",
                self.depth(),
                schema.path.len()
            )));
        }
        for (element, step) in self.elements.iter().zip(&schema.path) {
            if element.name != step.name {
                return Err(mismatch(format!(
                    "element {} != schema node {}",
                    element.name, step.name
                )));
            }
            let names: Vec<&str> = element.predicates.iter().map(|p| p.name.as_str()).collect();
            let expected: Vec<&str> = step.key_names.iter().map(String::as_str).collect();
            if names != expected {
                return Err(mismatch(format!(
                    "predicates {:?} != schema keys {:?}",
                    names, expected
                )));
            }
        }
        Ok(TypedKey {
            key: self.clone(),
            type_name: schema.type_name.clone(),
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elements.is_empty() {
            return f.write_str("/");
        }
        for e in &self.elements {
            write!(f, "/{}", e)?;
        }
        Ok(())
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(KeyError::Empty);
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(KeyError::MissingLeadingSlash(s.to_string()));
        };
        if rest.is_empty() {
            return Ok(Key::root());
        }

        let mut elements = Vec::new();
        let mut chars = rest.chars().peekable();
        loop {
            let position = elements.len();
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '/' || c == '[' {
                    break;
                }
                if c == ']' || c == '=' {
                    return Err(KeyError::InvalidName { position, found: c });
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(KeyError::EmptyElement { position });
            }

            let mut predicates: Vec<Predicate> = Vec::new();
            while chars.peek() == Some(&'[') {
                chars.next();
                let mut body = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    body.push(c);
                }
                if !closed {
                    return Err(KeyError::UnterminatedPredicate { element: name });
                }
                let Some((k, v)) = body.split_once('=') else {
                    return Err(KeyError::MalformedPredicate {
                        element: name,
                        predicate: body,
                    });
                };
                if k.is_empty() || v.is_empty() {
                    return Err(KeyError::MalformedPredicate {
                        element: name,
                        predicate: body,
                    });
                }
                if predicates.iter().any(|p| p.name == k) {
                    return Err(KeyError::DuplicatePredicate {
                        element: name,
                        name: k.to_string(),
                    });
                }
                predicates.push(Predicate {
                    name: k.to_string(),
                    value: if v == WILDCARD {
                        PredicateValue::Wildcard
                    } else {
                        PredicateValue::Exact(v.to_string())
                    },
                });
            }
            elements.push(PathElement { name, predicates });

            match chars.next() {
                None => break,
                Some('/') => {
                    if chars.peek().is_none() {
                        return Err(KeyError::EmptyElement {
                            position: elements.len(),
                        });
                    }
                }
                Some(c) => {
                    return Err(KeyError::InvalidName {
                        position: elements.len() - 1,
                        found: c,
                    })
                }
            }
        }
        Ok(Key { elements })
    }
}
