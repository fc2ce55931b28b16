//! # Member Runtime
//!
//! Runs a [`Member`] on a dedicated tokio task. Router requests and
//! application calls arrive through a bounded channel; work the member
//! schedules for itself (deferred responses, completions, `reg_ready`) sits
//! on its internal queue and is always drained first.
//!
//! ```ignore
//! let (handle, task) = MemberRuntime::spawn(MemberConfig::new("m1"), sink)?;
//! let reg = handle.register(request, handler).await?;
//! handle.prepare(header, TransactionMsg::single(xact_id, query)).await?;
//! handle.shutdown().await?;
//! task.await??;
//! ```

use crate::config::MemberConfig;
use crate::domain::registration::{RegistrationHandle, RegistrationId, RegistrationRequest};
use crate::domain::transaction::TransactionId;
use crate::error::MemberError;
use crate::events::commands::MemberCommand;
use crate::events::requests::{RequestHeader, RouterRequest, TransactionMsg};
use crate::metrics::{MemberStats, Metrics};
use crate::ports::inbound::{MemberApi, RouterApi};
use crate::ports::outbound::{RegistrationHandler, RouterSink};
use crate::service::member::Member;
use async_trait::async_trait;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Spawns member tasks.
pub struct MemberRuntime;

impl MemberRuntime {
    /// Start a member. The task ends on `shutdown`, when every handle is
    /// dropped, or with the first fatal error.
    pub fn spawn(
        config: MemberConfig,
        sink: Arc<dyn RouterSink>,
    ) -> Result<(MemberHandle, JoinHandle<Result<(), MemberError>>), MemberError> {
        let capacity = config.queue_capacity;
        let (member, internal) = Member::new(config, sink)?;
        let (tx, external) = mpsc::channel(capacity);
        let handle = MemberHandle {
            name: member.name().to_string(),
            tx,
            metrics: Arc::clone(member.metrics()),
        };
        let task = tokio::spawn(run(member, internal, external));
        Ok((handle, task))
    }
}

async fn run(
    mut member: Member,
    mut internal: UnboundedReceiver<MemberCommand>,
    mut external: Receiver<MemberCommand>,
) -> Result<(), MemberError> {
    info!(
        "[member:{}] Started (instance {})",
        member.name(),
        member.instance()
    );
    loop {
        let cmd = tokio::select! {
            biased;
            Some(cmd) = internal.recv() => cmd,
            cmd = external.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };
        match member.dispatch(cmd) {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => break,
            Err(e) => {
                error!("[member:{}] Fatal: {}", member.name(), e);
                return Err(e);
            }
        }
    }
    info!(
        "[member:{}] Stopped with {} transaction(s) in flight",
        member.name(),
        member.transaction_count()
    );
    Ok(())
}

/// Cloneable client of a running member.
#[derive(Clone)]
pub struct MemberHandle {
    name: String,
    tx: Sender<MemberCommand>,
    metrics: Arc<Metrics>,
}

impl MemberHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live counters of the member.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Ask the member to stop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), MemberError> {
        self.send(MemberCommand::Shutdown).await
    }

    async fn send(&self, cmd: MemberCommand) -> Result<(), MemberError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| MemberError::RuntimeStopped)
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> MemberCommand,
    ) -> Result<T, MemberError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| MemberError::RuntimeStopped)
    }
}

#[async_trait]
impl RouterApi for MemberHandle {
    async fn prepare(
        &self,
        header: RequestHeader,
        transaction: TransactionMsg,
    ) -> Result<(), MemberError> {
        self.send(MemberCommand::Router(RouterRequest::Prepare {
            header,
            transaction,
        }))
        .await
    }

    async fn precommit(
        &self,
        header: RequestHeader,
        xact_id: TransactionId,
    ) -> Result<(), MemberError> {
        self.send(MemberCommand::Router(RouterRequest::Precommit {
            header,
            xact_id,
        }))
        .await
    }

    async fn commit(&self, header: RequestHeader, xact_id: TransactionId) -> Result<(), MemberError> {
        self.send(MemberCommand::Router(RouterRequest::Commit { header, xact_id }))
            .await
    }

    async fn abort(&self, header: RequestHeader, xact_id: TransactionId) -> Result<(), MemberError> {
        self.send(MemberCommand::Router(RouterRequest::Abort { header, xact_id }))
            .await
    }
}

#[async_trait]
impl MemberApi for MemberHandle {
    async fn register(
        &self,
        request: RegistrationRequest,
        handler: Arc<dyn RegistrationHandler>,
    ) -> Result<RegistrationHandle, MemberError> {
        let result = self
            .call(|reply| MemberCommand::Register {
                request,
                handler,
                reply,
            })
            .await?;
        Ok(result?)
    }

    async fn deregister(&self, handle: &RegistrationHandle) -> Result<bool, MemberError> {
        let id = handle.id;
        self.call(|reply| MemberCommand::Deregister { id, reply }).await
    }

    async fn begin_audit(&self, id: RegistrationId) -> Result<(), MemberError> {
        let result = self
            .call(|reply| MemberCommand::BeginAudit { id, reply })
            .await?;
        Ok(result?)
    }

    async fn finish_audit(&self, id: RegistrationId) -> Result<bool, MemberError> {
        let result = self
            .call(|reply| MemberCommand::FinishAudit { id, reply })
            .await?;
        Ok(result?)
    }

    async fn stats(&self) -> Result<MemberStats, MemberError> {
        self.call(|reply| MemberCommand::Stats { reply }).await
    }
}
