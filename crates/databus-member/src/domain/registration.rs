//! # Registrations
//!
//! A registration declares a member's interest (publisher, subscriber,
//! cache) in one subtree of the key namespace.
//!
//! Registrations are shared as `Arc<Registration>`: the store holds one
//! reference and every live `MatchInfo` holds another. A deregistered
//! registration stays in `DeletePending` until only the store's reference
//! remains, then the store drops it.

use crate::domain::key::Key;
use crate::domain::response::{ResponseCode, ResponseStats};
use crate::domain::schema::SchemaDescriptor;
use crate::error::RegistrationError;
use crate::ports::outbound::RegistrationHandler;
use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Monotonic per-member registration identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg-{}", self.0)
    }
}

bitflags! {
    /// Registration role and behaviour flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RegFlags: u32 {
        const PUBLISHER = 1 << 0;
        const SUBSCRIBER = 1 << 1;
        /// Keeps a local copy of subscribed data and may answer reads.
        const CACHE = 1 << 2;
        /// Reads only at the registration's own depth.
        const DEPTH_ONE = 1 << 3;
        /// Reads at the registration's depth or one level below.
        const DEPTH_LISTS = 1 << 4;
        /// Publisher shares the key with other publishers.
        const SHARED = 1 << 5;
    }
}

impl RegFlags {
    /// Reject inconsistent flag combinations.
    pub fn validate(self) -> Result<(), RegistrationError> {
        let roles = self & (Self::PUBLISHER | Self::SUBSCRIBER);
        if roles.bits().count_ones() != 1 {
            return Err(RegistrationError::InvalidFlags(
                "exactly one of PUBLISHER or SUBSCRIBER is required".to_string(),
            ));
        }
        if self.contains(Self::DEPTH_ONE | Self::DEPTH_LISTS) {
            return Err(RegistrationError::InvalidFlags(
                "DEPTH_ONE and DEPTH_LISTS are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// The role these flags declare.
    pub fn role(self) -> Role {
        if self.contains(Self::PUBLISHER) {
            Role::Publisher
        } else {
            Role::Subscriber
        }
    }
}

/// Publisher/subscriber partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Publisher,
    Subscriber,
}

/// Data category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Data,
    Config,
    #[default]
    Any,
}

impl Category {
    /// Either side is `Any`, or both are equal.
    pub fn compatible(self, other: Category) -> bool {
        self == Category::Any || other == Category::Any || self == other
    }
}

/// Lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Active,
    DeletePending,
}

/// Audit-recovery state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditState {
    #[default]
    Idle,
    InProgress,
    /// A live write arrived during the audit; cached results are stale.
    Invalidated,
}

/// Parameters of a `register` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Subtree of interest, in key text form.
    pub key: String,
    pub flags: RegFlags,
    pub category: Category,
    /// Concrete type expected at the registration depth.
    pub schema: Option<SchemaDescriptor>,
}

impl RegistrationRequest {
    pub fn new(key: impl Into<String>, flags: RegFlags) -> Self {
        Self {
            key: key.into(),
            flags,
            category: Category::Any,
            schema: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Caller-side handle returned by `register`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationHandle {
    pub id: RegistrationId,
    pub key: Key,
}

/// A live registration.
pub struct Registration {
    id: RegistrationId,
    key: Key,
    flags: RegFlags,
    category: Category,
    schema: Option<SchemaDescriptor>,
    /// Name of the owning member.
    member: String,
    handler: Arc<dyn RegistrationHandler>,
    state: RwLock<RegistrationState>,
    audit: Mutex<AuditState>,
    stats: ResponseStats,
}

impl Registration {
    /// Create an active registration.
    pub fn new(
        id: RegistrationId,
        key: Key,
        flags: RegFlags,
        category: Category,
        schema: Option<SchemaDescriptor>,
        member: impl Into<String>,
        handler: Arc<dyn RegistrationHandler>,
    ) -> Self {
        Self {
            id,
            key,
            flags,
            category,
            schema,
            member: member.into(),
            handler,
            state: RwLock::new(RegistrationState::Active),
            audit: Mutex::new(AuditState::Idle),
            stats: ResponseStats::default(),
        }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn depth(&self) -> usize {
        self.key.depth()
    }

    pub fn flags(&self) -> RegFlags {
        self.flags
    }

    pub fn role(&self) -> Role {
        self.flags.role()
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn schema(&self) -> Option<&SchemaDescriptor> {
        self.schema.as_ref()
    }

    /// Concrete type name, if a schema was supplied.
    pub fn type_name(&self) -> Option<&str> {
        self.schema.as_ref().map(|s| s.type_name.as_str())
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn handler(&self) -> &Arc<dyn RegistrationHandler> {
        &self.handler
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == RegistrationState::Active
    }

    /// Mark for deletion. Returns `false` if already pending.
    pub fn mark_delete_pending(&self) -> bool {
        let mut state = self.state.write();
        if *state == RegistrationState::DeletePending {
            return false;
        }
        *state = RegistrationState::DeletePending;
        true
    }

    pub fn audit_state(&self) -> AuditState {
        *self.audit.lock()
    }

    pub fn begin_audit(&self) {
        *self.audit.lock() = AuditState::InProgress;
    }

    /// Invalidate an in-progress audit. Returns `true` if one was running.
    pub fn invalidate_audit(&self) -> bool {
        let mut audit = self.audit.lock();
        if *audit == AuditState::InProgress {
            *audit = AuditState::Invalidated;
            return true;
        }
        false
    }

    /// End the audit; `true` when its cached results are still valid.
    pub fn finish_audit(&self) -> bool {
        let mut audit = self.audit.lock();
        let valid = *audit == AuditState::InProgress;
        *audit = AuditState::Idle;
        valid
    }

    pub fn record_response(&self, code: ResponseCode) {
        self.stats.record(code);
    }

    pub fn stats(&self) -> &ResponseStats {
        &self.stats
    }

    pub fn handle(&self) -> RegistrationHandle {
        RegistrationHandle {
            id: self.id,
            key: self.key.clone(),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("key", &self.key.to_string())
            .field("flags", &self.flags)
            .field("category", &self.category)
            .field("state", &self.state())
            .field("member", &self.member)
            .finish()
    }
}
