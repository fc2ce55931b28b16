//! Inbound Ports (Driving Ports)
//!
//! `RouterApi` is the router-facing RPC surface; results come back through
//! the member's `RouterSink`, not as return values. `MemberApi` is what
//! application code uses to manage registrations.

use crate::domain::registration::{RegistrationHandle, RegistrationId, RegistrationRequest};
use crate::domain::transaction::TransactionId;
use crate::error::MemberError;
use crate::events::requests::{RequestHeader, TransactionMsg};
use crate::metrics::MemberStats;
use crate::ports::outbound::RegistrationHandler;
use async_trait::async_trait;
use std::sync::Arc;

/// Router-facing API (Driving Port)
#[async_trait]
pub trait RouterApi: Send + Sync {
    /// Start a transaction. The result is deferred.
    async fn prepare(
        &self,
        header: RequestHeader,
        transaction: TransactionMsg,
    ) -> Result<(), MemberError>;

    async fn precommit(
        &self,
        header: RequestHeader,
        xact_id: TransactionId,
    ) -> Result<(), MemberError>;

    async fn commit(&self, header: RequestHeader, xact_id: TransactionId)
        -> Result<(), MemberError>;

    async fn abort(&self, header: RequestHeader, xact_id: TransactionId)
        -> Result<(), MemberError>;
}

/// Application-facing registration API (Driving Port)
#[async_trait]
pub trait MemberApi: Send + Sync {
    /// Declare interest in a subtree. `reg_ready` fires once installed.
    async fn register(
        &self,
        request: RegistrationRequest,
        handler: Arc<dyn RegistrationHandler>,
    ) -> Result<RegistrationHandle, MemberError>;

    /// Remove a registration. `Ok(false)` when it was already gone.
    async fn deregister(&self, handle: &RegistrationHandle) -> Result<bool, MemberError>;

    /// Start audit recovery on a registration.
    async fn begin_audit(&self, id: RegistrationId) -> Result<(), MemberError>;

    /// End audit recovery; `true` when no live write interfered.
    async fn finish_audit(&self, id: RegistrationId) -> Result<bool, MemberError>;

    async fn stats(&self) -> Result<MemberStats, MemberError>;
}
