//! # Registration Store
//!
//! Ordered collection of a member's registrations plus the shard index over
//! them. Iteration order is id order, which is creation order.

use crate::algorithms::matching::CandidateSource;
use crate::algorithms::shard::Shard;
use crate::domain::key::Key;
use crate::domain::registration::{
    RegFlags, Registration, RegistrationId, RegistrationRequest, Role,
};
use crate::domain::response::ResponseStatsSnapshot;
use crate::error::RegistrationError;
use crate::ports::outbound::RegistrationHandler;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registrations owned by one member.
#[derive(Debug)]
pub struct RegistrationStore {
    member: String,
    regs: BTreeMap<RegistrationId, Arc<Registration>>,
    shard: Shard,
    next_id: u64,
}

impl RegistrationStore {
    pub fn new(member: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            regs: BTreeMap::new(),
            shard: Shard::new(),
            next_id: 0,
        }
    }

    /// Validate and install a registration.
    pub fn register(
        &mut self,
        request: RegistrationRequest,
        handler: Arc<dyn RegistrationHandler>,
    ) -> Result<Arc<Registration>, RegistrationError> {
        request.flags.validate()?;
        let key: Key = request.key.parse()?;
        if let Some(schema) = &request.schema {
            key.narrow(schema)?;
        }
        self.check_conflicts(&key, &request)?;

        self.next_id += 1;
        let id = RegistrationId(self.next_id);
        let reg = Arc::new(Registration::new(
            id,
            key,
            request.flags,
            request.category,
            request.schema,
            self.member.clone(),
            handler,
        ));
        self.shard.insert(reg.key(), id, reg.role());
        self.regs.insert(id, Arc::clone(&reg));

        info!(
            reg_id = %id,
            "[member:{}] Registered {} at {} ({:?})",
            self.member,
            id,
            reg.key(),
            reg.flags()
        );
        Ok(reg)
    }

    fn check_conflicts(
        &self,
        key: &Key,
        request: &RegistrationRequest,
    ) -> Result<(), RegistrationError> {
        let same_key = self.regs.values().filter(|r| r.is_active() && r.key() == key);

        let requested = request.schema.as_ref().map(|s| s.type_name.as_str());
        for existing in same_key {
            if let (Some(have), Some(want)) = (existing.type_name(), requested) {
                if have != want {
                    return Err(RegistrationError::ConflictingSchema {
                        key: key.to_string(),
                        existing: have.to_string(),
                        requested: want.to_string(),
                    });
                }
            }

            let both_publish =
                existing.role() == Role::Publisher && request.flags.role() == Role::Publisher;
            let shared = existing.flags().contains(RegFlags::SHARED)
                && request.flags.contains(RegFlags::SHARED);
            if both_publish && !shared {
                return Err(RegistrationError::AlreadyPublished(key.to_string()));
            }
        }
        Ok(())
    }

    /// Mark a registration for deletion. It stays indexed, visible to reads
    /// only, until [`reap`](Self::reap) drops it. Returns `false` for unknown
    /// or already pending registrations.
    pub fn deregister(&mut self, id: RegistrationId) -> bool {
        let Some(reg) = self.regs.get(&id) else {
            debug!(reg_id = %id, "[member:{}] Deregister of unknown {}", self.member, id);
            return false;
        };
        if !reg.mark_delete_pending() {
            return false;
        }
        info!(reg_id = %id, "[member:{}] Deregistered {} at {}", self.member, id, reg.key());
        true
    }

    /// Drop pending registrations no match refers to any more.
    pub fn reap(&mut self) -> Vec<RegistrationId> {
        let done: Vec<RegistrationId> = self
            .regs
            .values()
            .filter(|r| !r.is_active() && Arc::strong_count(r) == 1)
            .map(|r| r.id())
            .collect();
        for id in &done {
            if let Some(reg) = self.regs.remove(id) {
                self.shard.remove(reg.key(), *id, reg.role());
            }
            debug!(reg_id = %id, "[member:{}] Reaped {}", self.member, id);
        }
        done
    }

    pub fn get(&self, id: RegistrationId) -> Option<&Arc<Registration>> {
        self.regs.get(&id)
    }

    /// Registrations held, including those pending deletion.
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Registration>> {
        self.regs.values()
    }

    pub fn begin_audit(&self, id: RegistrationId) -> Result<(), RegistrationError> {
        let reg = self.regs.get(&id).ok_or(RegistrationError::NotFound(id))?;
        reg.begin_audit();
        Ok(())
    }

    pub fn finish_audit(&self, id: RegistrationId) -> Result<bool, RegistrationError> {
        let reg = self.regs.get(&id).ok_or(RegistrationError::NotFound(id))?;
        Ok(reg.finish_audit())
    }

    pub fn stats(&self) -> Vec<(RegistrationId, ResponseStatsSnapshot)> {
        self.regs
            .values()
            .map(|r| (r.id(), r.stats().snapshot()))
            .collect()
    }
}

impl CandidateSource for RegistrationStore {
    fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    fn shard_candidates(&self, key: &Key, role: Role) -> Vec<Arc<Registration>> {
        self.shard
            .candidates(key, role)
            .into_iter()
            .filter_map(|id| self.regs.get(&id).cloned())
            .collect()
    }

    fn scan(&self) -> Vec<Arc<Registration>> {
        self.regs.values().cloned().collect()
    }
}
