//! # Transaction Store
//!
//! In-flight transactions keyed by id.

use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::MemberError;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TransactionStore {
    xacts: HashMap<TransactionId, Transaction>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, xact: Transaction) {
        self.xacts.insert(xact.id, xact);
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.xacts.contains_key(&id)
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.xacts.get(&id)
    }

    pub fn get_mut(&mut self, id: TransactionId) -> Option<&mut Transaction> {
        self.xacts.get_mut(&id)
    }

    /// Lookup that fails with `UnknownTransaction`.
    pub fn require(&mut self, id: TransactionId) -> Result<&mut Transaction, MemberError> {
        self.xacts
            .get_mut(&id)
            .ok_or(MemberError::UnknownTransaction(id))
    }

    pub fn len(&self) -> usize {
        self.xacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xacts.is_empty()
    }

    /// Remove every removable transaction. Returns the removed ids.
    pub fn sweep(&mut self) -> Vec<TransactionId> {
        let done: Vec<TransactionId> = self
            .xacts
            .values()
            .filter(|x| x.is_removable())
            .map(|x| x.id)
            .collect();
        for id in &done {
            self.xacts.remove(id);
        }
        done
    }
}
