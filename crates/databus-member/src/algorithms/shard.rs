//! # Shard Index
//!
//! Tree of path elements partitioning registrations by publisher and
//! subscriber role at each node. Lookup cost is proportional to the depth
//! of the query key plus the size of the subtree below it.
//!
//! Registration keys with wildcards are kept apart from exact ones so that
//! a concrete query element is a hash lookup plus a short pattern scan.
//! Nodes are keyed with predicates sorted by name, so `[a=1][b=2]` and
//! `[b=2][a=1]` land on the same node.

use crate::domain::key::{Key, PathElement};
use crate::domain::registration::{RegistrationId, Role};
use std::collections::HashMap;

/// One node of the shard tree.
#[derive(Debug, Default)]
pub struct Shard {
    exact: HashMap<PathElement, Shard>,
    patterned: Vec<(PathElement, Shard)>,
    publishers: Vec<RegistrationId>,
    subscribers: Vec<RegistrationId>,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a registration at `key`.
    pub fn insert(&mut self, key: &Key, id: RegistrationId, role: Role) {
        let mut node = self;
        for element in key.elements() {
            node = node.child_mut(element);
        }
        let ids = node.ids_mut(role);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Remove a registration. Empty nodes are pruned.
    pub fn remove(&mut self, key: &Key, id: RegistrationId, role: Role) -> bool {
        self.remove_at(key.elements(), id, role)
    }

    fn remove_at(&mut self, path: &[PathElement], id: RegistrationId, role: Role) -> bool {
        let Some((head, rest)) = path.split_first() else {
            let ids = self.ids_mut(role);
            let before = ids.len();
            ids.retain(|r| *r != id);
            return ids.len() != before;
        };

        let head = slot(head);
        if head.has_wildcards() {
            let Some(pos) = self.patterned.iter().position(|(e, _)| *e == head) else {
                return false;
            };
            let removed = self.patterned[pos].1.remove_at(rest, id, role);
            if self.patterned[pos].1.is_empty() {
                self.patterned.remove(pos);
            }
            removed
        } else {
            let Some(child) = self.exact.get_mut(&head) else {
                return false;
            };
            let removed = child.remove_at(rest, id, role);
            if child.is_empty() {
                self.exact.remove(&head);
            }
            removed
        }
    }

    /// Registrations of `role` whose key intersects `key`: every registration
    /// on the path to `key` and every registration in the subtree below it.
    /// Sorted by id, which is store order.
    pub fn candidates(&self, key: &Key, role: Role) -> Vec<RegistrationId> {
        let mut out = Vec::new();
        self.collect(key.elements(), role, &mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Number of indexed registrations.
    pub fn len(&self) -> usize {
        self.publishers.len()
            + self.subscribers.len()
            + self.exact.values().map(Shard::len).sum::<usize>()
            + self.patterned.iter().map(|(_, s)| s.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
            && self.subscribers.is_empty()
            && self.exact.is_empty()
            && self.patterned.is_empty()
    }

    fn collect(&self, path: &[PathElement], role: Role, out: &mut Vec<RegistrationId>) {
        out.extend_from_slice(self.ids(role));

        let Some((head, rest)) = path.split_first() else {
            self.collect_subtree(role, out);
            return;
        };

        if head.has_wildcards() {
            for (element, child) in &self.exact {
                if element.compatible(head) {
                    child.collect(rest, role, out);
                }
            }
        } else if let Some(child) = self.exact.get(&slot(head)) {
            child.collect(rest, role, out);
        }
        for (element, child) in &self.patterned {
            if element.compatible(head) {
                child.collect(rest, role, out);
            }
        }
    }

    fn collect_subtree(&self, role: Role, out: &mut Vec<RegistrationId>) {
        let children = self
            .exact
            .values()
            .chain(self.patterned.iter().map(|(_, s)| s));
        for child in children {
            out.extend_from_slice(child.ids(role));
            child.collect_subtree(role, out);
        }
    }

    fn child_mut(&mut self, element: &PathElement) -> &mut Shard {
        let element = slot(element);
        if !element.has_wildcards() {
            return self.exact.entry(element).or_default();
        }
        let pos = match self.patterned.iter().position(|(e, _)| *e == element) {
            Some(pos) => pos,
            None => {
                self.patterned.push((element, Shard::default()));
                self.patterned.len() - 1
            }
        };
        &mut self.patterned[pos].1
    }

    fn ids(&self, role: Role) -> &[RegistrationId] {
        match role {
            Role::Publisher => &self.publishers,
            Role::Subscriber => &self.subscribers,
        }
    }

    fn ids_mut(&mut self, role: Role) -> &mut Vec<RegistrationId> {
        match role {
            Role::Publisher => &mut self.publishers,
            Role::Subscriber => &mut self.subscribers,
        }
    }
}

/// Index form of an element: predicates sorted by name.
fn slot(element: &PathElement) -> PathElement {
    let mut element = element.clone();
    element.predicates.sort_by(|a, b| a.name.cmp(&b.name));
    element
}
