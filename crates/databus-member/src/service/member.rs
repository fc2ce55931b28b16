//! # Member Engine
//!
//! Owns a member's registrations and in-flight transactions and executes
//! `MemberCommand`s one at a time. Nothing here locks: the engine is driven
//! from a single execution context (see `adapters::runtime`).

use crate::config::MemberConfig;
use crate::domain::registration::{RegistrationHandle, RegistrationId, RegistrationRequest};
use crate::domain::transaction::{MemberAddress, Transaction, TransactionId};
use crate::error::{MemberError, RegistrationError, TransportError};
use crate::events::commands::{MemberCommand, XactEvent};
use crate::events::requests::RouterRequest;
use crate::events::responses::ResultMessage;
use crate::metrics::{MemberStats, Metrics};
use crate::ports::outbound::{RegistrationHandler, RouterSink};
use crate::service::registry::RegistrationStore;
use crate::service::xact_store::TransactionStore;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

/// The member transaction engine.
pub struct Member {
    pub(crate) config: MemberConfig,
    /// Distinguishes restarts of the same named member in traceroutes.
    pub(crate) instance: Uuid,
    pub(crate) registry: RegistrationStore,
    pub(crate) xacts: TransactionStore,
    pub(crate) sink: Arc<dyn RouterSink>,
    /// The member's own FIFO queue, for scheduled work and completions.
    pub(crate) queue: UnboundedSender<MemberCommand>,
    pub(crate) metrics: Arc<Metrics>,
}

impl Member {
    /// Create an engine and the receiving end of its internal queue.
    pub fn new(
        config: MemberConfig,
        sink: Arc<dyn RouterSink>,
    ) -> Result<(Self, UnboundedReceiver<MemberCommand>), MemberError> {
        config.validate()?;
        let (queue, rx) = mpsc::unbounded_channel();
        let member = Self {
            registry: RegistrationStore::new(config.name.clone()),
            config,
            instance: Uuid::new_v4(),
            xacts: TransactionStore::new(),
            sink,
            queue,
            metrics: Arc::new(Metrics::new()),
        };
        Ok((member, rx))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn instance(&self) -> Uuid {
        self.instance
    }

    pub fn config(&self) -> &MemberConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn registry(&self) -> &RegistrationStore {
        &self.registry
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.xacts.get(id)
    }

    pub fn transaction_count(&self) -> usize {
        self.xacts.len()
    }

    /// Sender for the member's own queue.
    pub fn queue(&self) -> UnboundedSender<MemberCommand> {
        self.queue.clone()
    }

    /// Execute one command. `Break` asks the caller to stop.
    ///
    /// Only fatal errors are returned; everything else is logged and the
    /// affected request is answered with a code.
    pub fn dispatch(&mut self, cmd: MemberCommand) -> Result<ControlFlow<()>, MemberError> {
        debug!("[member:{}] Dispatch {}", self.config.name, cmd.kind());

        let outcome = match cmd {
            MemberCommand::Router(request) => self.on_router(request),
            MemberCommand::QueryResponse {
                xact_id,
                query_index,
                match_id,
                code,
                data,
            } => {
                if self.xacts.contains(xact_id) {
                    let event = XactEvent::QueryRsp {
                        query_index,
                        match_id,
                        code,
                        data,
                    };
                    self.xact_run(xact_id, event)
                } else {
                    warn!(
                        xact_id = %xact_id,
                        "[member:{}] Completion for unknown {} dropped",
                        self.config.name, xact_id
                    );
                    Ok(())
                }
            }
            MemberCommand::SendResponse {
                xact_id,
                header,
                code,
            } => {
                if let Some(xact) = self.xacts.get_mut(xact_id) {
                    xact.release();
                }
                self.send_result(xact_id, &header, code)
            }
            MemberCommand::RunPhase { xact_id, event } => {
                if let Some(xact) = self.xacts.get_mut(xact_id) {
                    xact.release();
                }
                self.xact_run(xact_id, event)
            }
            MemberCommand::RegReady(id) => {
                if let Some(reg) = self.registry.get(id) {
                    reg.handler().reg_ready(id);
                }
                Ok(())
            }
            MemberCommand::Register {
                request,
                handler,
                reply,
            } => {
                let _ = reply.send(self.register(request, handler));
                Ok(())
            }
            MemberCommand::Deregister { id, reply } => {
                let _ = reply.send(self.deregister(id));
                Ok(())
            }
            MemberCommand::BeginAudit { id, reply } => {
                let _ = reply.send(self.registry.begin_audit(id));
                Ok(())
            }
            MemberCommand::FinishAudit { id, reply } => {
                let _ = reply.send(self.registry.finish_audit(id));
                Ok(())
            }
            MemberCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
                Ok(())
            }
            MemberCommand::Shutdown => return Ok(ControlFlow::Break(())),
        };

        self.sweep();

        match outcome {
            Ok(()) => Ok(ControlFlow::Continue(())),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("[member:{}] {}", self.config.name, e);
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    fn on_router(&mut self, request: RouterRequest) -> Result<(), MemberError> {
        let xact_id = request.xact_id();
        let (header, event) = match request {
            RouterRequest::Prepare {
                header,
                transaction,
            } => {
                self.metrics.record_prepare();
                let event = XactEvent::Prepare {
                    header,
                    transaction,
                };
                return self.xact_run(xact_id, event);
            }
            RouterRequest::Precommit { header, .. } => {
                self.metrics.record_precommit();
                (header.clone(), XactEvent::Precommit { header })
            }
            RouterRequest::Commit { header, .. } => {
                self.metrics.record_commit();
                (header.clone(), XactEvent::Commit { header })
            }
            RouterRequest::Abort { header, .. } => {
                self.metrics.record_abort();
                (header.clone(), XactEvent::Abort { header })
            }
        };

        // Nothing to wait on for an unknown id: answer now, create nothing.
        if !self.xacts.contains(xact_id) {
            self.metrics.record_unknown_xact();
            warn!(
                xact_id = %xact_id,
                "[member:{}] {} for unknown {}, NACK",
                self.config.name,
                event.kind(),
                xact_id
            );
            return self.deliver(&header.route, ResultMessage::nack(xact_id, header.request_id));
        }

        let xact = self.xacts.require(xact_id)?;
        xact.hold();
        if self
            .queue
            .send(MemberCommand::RunPhase { xact_id, event })
            .is_err()
        {
            xact.release();
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }

    /// Install a registration; `reg_ready` follows from the queue.
    pub fn register(
        &mut self,
        request: RegistrationRequest,
        handler: Arc<dyn RegistrationHandler>,
    ) -> Result<RegistrationHandle, RegistrationError> {
        let reg = self.registry.register(request, handler)?;
        let _ = self.queue.send(MemberCommand::RegReady(reg.id()));
        Ok(reg.handle())
    }

    pub fn deregister(&mut self, id: RegistrationId) -> bool {
        let removed = self.registry.deregister(id);
        self.registry.reap();
        removed
    }

    pub fn stats(&self) -> MemberStats {
        MemberStats {
            metrics: self.metrics.snapshot(),
            registrations: self.registry.len(),
            transactions: self.xacts.len(),
            registration_stats: self.registry.stats(),
        }
    }

    /// Drop finished transactions, then registrations they kept alive.
    pub(crate) fn sweep(&mut self) {
        for id in self.xacts.sweep() {
            self.metrics.record_xact_removed();
            debug!(xact_id = %id, "[member:{}] Removed {}", self.config.name, id);
        }
        self.registry.reap();
    }

    /// Hand a result to the router sink.
    pub(crate) fn deliver(
        &self,
        route: &MemberAddress,
        result: ResultMessage,
    ) -> Result<(), MemberError> {
        self.sink.send_result(route, result)?;
        self.metrics.record_result_sent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::channel_sink::ChannelRouterSink;
    use crate::domain::query::{Action, QuerySpec};
    use crate::domain::registration::RegFlags;
    use crate::domain::response::ResponseCode;
    use crate::domain::transaction::RequestId;
    use crate::events::requests::{RequestHeader, TransactionMsg};
    use crate::ports::outbound::{MockHandler, Phase};

    fn header(request: u64) -> RequestHeader {
        RequestHeader::new(RequestId(request), MemberAddress("router".to_string()))
    }

    fn drain(member: &mut Member, rx: &mut UnboundedReceiver<MemberCommand>) {
        while let Ok(next) = rx.try_recv() {
            member.dispatch(next).unwrap();
        }
    }

    /// Dispatch a command and then everything it queued.
    fn pump(
        member: &mut Member,
        rx: &mut UnboundedReceiver<MemberCommand>,
        cmd: MemberCommand,
    ) {
        member.dispatch(cmd).unwrap();
        drain(member, rx);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (sink, _rx) = ChannelRouterSink::new();
        let mut config = MemberConfig::for_testing();
        config.name.clear();
        assert!(matches!(
            Member::new(config, Arc::new(sink)),
            Err(MemberError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_xact_is_nacked_without_creating_it() {
        let (sink, mut results) = ChannelRouterSink::new();
        let (mut member, mut rx) = Member::new(MemberConfig::for_testing(), Arc::new(sink)).unwrap();

        let request = RouterRequest::Commit {
            header: header(1),
            xact_id: TransactionId(77),
        };
        pump(&mut member, &mut rx, MemberCommand::Router(request));

        let (route, result) = results.try_recv().unwrap();
        assert_eq!(route.0, "router");
        assert_eq!(result.code, ResponseCode::Nack);
        assert_eq!(member.transaction_count(), 0);
        assert_eq!(member.stats().metrics.unknown_xact_nacks, 1);
    }

    #[test]
    fn test_reg_ready_runs_from_queue() {
        let (sink, _results) = ChannelRouterSink::new();
        let (mut member, mut rx) = Member::new(MemberConfig::for_testing(), Arc::new(sink)).unwrap();
        let handler = Arc::new(MockHandler::new(ResponseCode::Ack));

        member
            .register(
                RegistrationRequest::new("/a", RegFlags::SUBSCRIBER),
                handler.clone(),
            )
            .unwrap();
        assert!(handler.phases().is_empty());

        let next = rx.try_recv().unwrap();
        member.dispatch(next).unwrap();
        assert_eq!(handler.phases(), vec![Phase::RegReady]);
    }

    #[test]
    fn test_prepare_commit_round_trip() {
        let (sink, mut results) = ChannelRouterSink::new();
        let (mut member, mut rx) = Member::new(MemberConfig::for_testing(), Arc::new(sink)).unwrap();
        let handler = Arc::new(MockHandler::new(ResponseCode::Ack));
        member
            .register(
                RegistrationRequest::new("/colony[name=c1]", RegFlags::SUBSCRIBER | RegFlags::CACHE),
                handler.clone(),
            )
            .unwrap();
        drain(&mut member, &mut rx);

        let xact_id = TransactionId(10);
        let prepare = RouterRequest::Prepare {
            header: header(1),
            transaction: TransactionMsg::single(
                xact_id,
                QuerySpec::new(Action::Create, "/colony[name=c1]/bundle-ether[name=be1]"),
            ),
        };
        pump(&mut member, &mut rx, MemberCommand::Router(prepare));
        let (_, result) = results.try_recv().unwrap();
        assert_eq!(result.code, ResponseCode::Ack);

        let commit = RouterRequest::Commit {
            header: header(2),
            xact_id,
        };
        pump(&mut member, &mut rx, MemberCommand::Router(commit));
        let (_, result) = results.try_recv().unwrap();
        assert_eq!(result.code, ResponseCode::Ack);
        assert_eq!(
            handler.phases(),
            vec![Phase::RegReady, Phase::Prepare, Phase::Commit]
        );
        assert_eq!(member.transaction_count(), 0);
    }

    #[test]
    fn test_shutdown_breaks() {
        let (sink, _results) = ChannelRouterSink::new();
        let (mut member, _rx) = Member::new(MemberConfig::for_testing(), Arc::new(sink)).unwrap();
        assert_eq!(
            member.dispatch(MemberCommand::Shutdown).unwrap(),
            ControlFlow::Break(())
        );
    }
}
