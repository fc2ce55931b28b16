//! # Transaction State Machine
//!
//! `xact_run` is the single entry point for protocol events. Handlers are
//! invoked synchronously on the member's context; a prepare handler that
//! defers leaves its query `ASYNC` until a `QueryRsp` event resolves it.
//!
//! | From                   | Event     | To                   |
//! |------------------------|-----------|----------------------|
//! | Init                   | Prepare   | Prepare              |
//! | Prepare                | Prepare   | Prepare (duplicate)  |
//! | Prepare                | QueryRsp  | Prepare              |
//! | Prepare                | Precommit | Precommit            |
//! | Prepare, Precommit     | Commit    | Commit               |
//! | Init, Prepare, Precommit | Abort   | Abort, then AbortRsp |
//! | Prepare                | End       | Commit (reads and `NO_TRANSACTION` only) |
//! | Commit, AbortRsp       | any       | unchanged, last code |

use crate::algorithms::aggregate::aggregate_codes;
use crate::algorithms::matching::find_matches;
use crate::domain::invariants::{invariant_not_removable_while_pending, invariant_single_query};
use crate::domain::match_info::MatchId;
use crate::domain::query::{Block, BlockId, Query};
use crate::domain::response::ResponseCode;
use crate::domain::transaction::{
    MemberState, NewBlock, NewBlockState, Transaction, TransactionId,
};
use crate::error::MemberError;
use crate::events::commands::XactEvent;
use crate::events::requests::{RequestHeader, TransactionMsg};
use crate::events::responses::ResultMessage;
use crate::ports::outbound::{CallbackContext, PrepareContext, RegistrationHandler};
use crate::service::member::Member;
use serde_json::Value;
use tracing::{debug, error, info, warn};

impl Member {
    /// Drive one transaction with one event.
    pub(crate) fn xact_run(
        &mut self,
        xact_id: TransactionId,
        event: XactEvent,
    ) -> Result<(), MemberError> {
        debug!(
            xact_id = %xact_id,
            "[member:{}] xact_run {} {}",
            self.config.name,
            xact_id,
            event.kind()
        );
        match event {
            XactEvent::Prepare {
                header,
                transaction,
            } => self.on_prepare(header, transaction),
            XactEvent::Precommit { header } => self.on_precommit(xact_id, header),
            XactEvent::Commit { header } => self.on_commit(xact_id, header),
            XactEvent::Abort { header } => self.on_abort(xact_id, header),
            XactEvent::QueryRsp {
                query_index,
                match_id,
                code,
                data,
            } => self.on_query_rsp(xact_id, query_index, match_id, code, data),
            XactEvent::End => self.on_end(xact_id),
        }
    }

    fn on_prepare(
        &mut self,
        header: RequestHeader,
        msg: TransactionMsg,
    ) -> Result<(), MemberError> {
        let xact_id = msg.xact_id;
        if self.xacts.contains(xact_id) {
            return self.on_duplicate_prepare(xact_id, header);
        }

        let queries_in_first = msg.blocks.first().map_or(0, |b| b.queries.len());
        if let Err(e) = invariant_single_query(msg.blocks.len(), queries_in_first) {
            error!(xact_id = %xact_id, "[member:{}] {} rejected: {}", self.config.name, xact_id, e);
            if let Err(send) = self.deliver(
                &header.route,
                ResultMessage::nack(xact_id, header.request_id),
            ) {
                warn!(
                    xact_id = %xact_id,
                    "[member:{}] NACK for {} not delivered: {}",
                    self.config.name, xact_id, send
                );
            }
            return Err(e);
        }

        let Some(block_msg) = msg.blocks.into_iter().next() else {
            return Err(MemberError::Unsupported("transaction without blocks".to_string()));
        };
        let default_category = self.config.default_category;
        let queries = block_msg
            .queries
            .into_iter()
            .enumerate()
            .map(|(i, spec)| Query::from_spec(i, spec, default_category, xact_id, header.request_id))
            .collect();
        let mut xact = Transaction::new(
            xact_id,
            Block {
                id: block_msg.id,
                queries,
            },
            header.route.clone(),
            header.request_id,
            header.debug,
        );
        xact.transition_to(MemberState::Prepare)?;
        self.xacts.insert(xact);
        self.metrics.record_xact_created();

        self.run_prepare(xact_id)?;

        let xact = self.xacts.require(xact_id)?;
        invariant_not_removable_while_pending(xact)?;
        let code = aggregate_codes(xact.queries().map(|q| q.response_code));
        if code == ResponseCode::Async {
            debug!(
                xact_id = %xact_id,
                "[member:{}] {} deferred, awaiting completion",
                self.config.name, xact_id
            );
            return Ok(());
        }
        self.respond_router(xact_id, code, header, false)
    }

    /// Match every query and run the prepare handlers.
    fn run_prepare(&mut self, xact_id: TransactionId) -> Result<(), MemberError> {
        let Member {
            config,
            registry,
            xacts,
            queue,
            metrics,
            ..
        } = self;
        let xact = xacts.require(xact_id)?;
        let lookup = config.lookup();
        let mut next_block = xact.next_block_id();
        let mut budget = config.max_new_blocks.saturating_sub(xact.new_blocks.len());
        let mut created = Vec::new();

        for query in xact.queries_mut() {
            match find_matches(&*registry, query, lookup) {
                Ok(n) => metrics.record_matches(n),
                Err(e) => {
                    warn!(
                        xact_id = %xact_id,
                        "[member:{}] {} query {} rejected: {}",
                        config.name, xact_id, query.key, e
                    );
                    query.errors.push(e.to_string());
                    query.response_code = ResponseCode::Nack;
                    continue;
                }
            }

            for i in 0..query.matches.len() {
                let (code, effects) = {
                    let m = &query.matches[i];
                    let info = CallbackContext {
                        xact_id,
                        registration_id: m.registration_id(),
                        action: query.action,
                        key: &m.key,
                        original_key: &m.original_key,
                        payload: m.payload.as_ref(),
                        flags: query.flags,
                    };
                    let mut ctx =
                        PrepareContext::new(info, query.index, m.id, queue, next_block, budget);
                    let code = m.registration.handler().prepare(&mut ctx);
                    (code, ctx.into_effects())
                };

                let code = match code {
                    ResponseCode::Async if !effects.deferred => {
                        let reason = format!(
                            "{} answered ASYNC without deferring",
                            query.matches[i].registration_id()
                        );
                        warn!(
                            xact_id = %xact_id,
                            reg_id = %query.matches[i].registration_id(),
                            "[member:{}] {}",
                            config.name,
                            reason
                        );
                        query.errors.push(reason);
                        ResponseCode::Nack
                    }
                    ResponseCode::None => ResponseCode::NotApplicable,
                    other => other,
                };
                if code == ResponseCode::Async {
                    metrics.record_async_deferral();
                }

                let m = &mut query.matches[i];
                m.response = code;
                if effects.result.is_some() {
                    m.result = effects.result;
                }
                m.registration.record_response(code);

                for (id, queries) in effects.new_blocks {
                    next_block = id.0.checked_add(1).map(BlockId);
                    budget = budget.saturating_sub(1);
                    created.push(NewBlock {
                        id,
                        queries,
                        state: NewBlockState::Notify,
                    });
                }
            }

            let code = query.recompute_response();
            debug!(
                xact_id = %xact_id,
                "[member:{}] {} query {} prepared: {} ({} matches)",
                config.name,
                xact_id,
                query.index,
                code,
                query.matches.len()
            );
        }

        if !created.is_empty() {
            info!(
                xact_id = %xact_id,
                "[member:{}] {} gained {} follow-on block(s)",
                config.name,
                xact_id,
                created.len()
            );
        }
        xact.new_blocks.extend(created);
        Ok(())
    }

    /// Same id prepared again: answer on the new request without
    /// re-running handlers.
    fn on_duplicate_prepare(
        &mut self,
        xact_id: TransactionId,
        header: RequestHeader,
    ) -> Result<(), MemberError> {
        let xact = self.xacts.require(xact_id)?;
        xact.route = header.route.clone();
        xact.request_id = header.request_id;
        xact.debug = header.debug;
        for q in xact.queries_mut() {
            q.request_id = header.request_id;
        }

        if xact.member_state != MemberState::Prepare {
            let code = xact.last_code;
            return self.respond_router(xact_id, code, header, false);
        }
        if xact.queries().any(|q| q.pending_response) {
            debug!(
                xact_id = %xact_id,
                "[member:{}] Duplicate prepare for {} joins pending completion",
                self.config.name, xact_id
            );
            return Ok(());
        }
        let code = aggregate_codes(xact.queries().map(|q| q.response_code));
        self.respond_router(xact_id, code, header, false)
    }

    fn on_query_rsp(
        &mut self,
        xact_id: TransactionId,
        query_index: usize,
        match_id: MatchId,
        code: ResponseCode,
        data: Option<Value>,
    ) -> Result<(), MemberError> {
        let name = &self.config.name;
        let xact = self.xacts.require(xact_id)?;
        if xact.member_state != MemberState::Prepare {
            warn!(
                xact_id = %xact_id,
                "[member:{}] Late completion for {} in {}, ignored",
                name, xact_id, xact.member_state
            );
            return Ok(());
        }
        let Some(query) = xact.query_mut(query_index) else {
            warn!(xact_id = %xact_id, "[member:{}] {} has no query {}", name, xact_id, query_index);
            return Ok(());
        };
        let Some(m) = query.match_mut(match_id) else {
            warn!(xact_id = %xact_id, "[member:{}] {} has no {}", name, xact_id, match_id);
            return Ok(());
        };
        if !m.is_pending() {
            warn!(
                xact_id = %xact_id,
                "[member:{}] {} {} already answered {}",
                name, xact_id, match_id, m.response
            );
            return Ok(());
        }

        let code = if code.is_final() {
            code
        } else {
            warn!(
                xact_id = %xact_id,
                "[member:{}] {} {} completed with {}, treated as NACK",
                name, xact_id, match_id, code
            );
            ResponseCode::Nack
        };
        m.response = code;
        if data.is_some() {
            m.result = data;
        }
        m.registration.record_response(code);
        query.recompute_response();

        if xact.queries().any(|q| q.pending_response) {
            return Ok(());
        }
        let code = aggregate_codes(xact.queries().map(|q| q.response_code));
        let header = header_of(xact);
        self.respond_router(xact_id, code, header, true)
    }

    fn on_precommit(
        &mut self,
        xact_id: TransactionId,
        header: RequestHeader,
    ) -> Result<(), MemberError> {
        let name = &self.config.name;
        let xact = self.xacts.require(xact_id)?;
        match xact.member_state {
            MemberState::Prepare => {}
            MemberState::Precommit | MemberState::Commit | MemberState::AbortRsp => {
                let code = xact.last_code;
                return self.respond_router(xact_id, code, header, true);
            }
            state => {
                warn!(
                    xact_id = %xact_id,
                    "[member:{}] PRECOMMIT for {} in {}",
                    name, xact_id, state
                );
                return self.respond_router(xact_id, ResponseCode::Nack, header, true);
            }
        }
        if xact.queries().any(|q| q.pending_response) {
            warn!(
                xact_id = %xact_id,
                "[member:{}] PRECOMMIT for {} while prepare is pending, NACK",
                name, xact_id
            );
            return self.respond_router(xact_id, ResponseCode::Nack, header, true);
        }

        xact.transition_to(MemberState::Precommit)?;
        let mut codes: Vec<ResponseCode> = xact
            .queries()
            .filter(|q| q.response_code == ResponseCode::Nack)
            .map(|q| q.response_code)
            .collect();
        run_callbacks(xact, true, |handler, ctx| {
            let code = match handler.precommit(ctx) {
                ResponseCode::Async => {
                    warn!(
                        xact_id = %ctx.xact_id,
                        reg_id = %ctx.registration_id,
                        "[member:{}] {} answered ASYNC at precommit, treated as ACK",
                        name, ctx.registration_id
                    );
                    ResponseCode::Ack
                }
                ResponseCode::None => ResponseCode::Ack,
                other => other,
            };
            codes.push(code);
        });
        let code = aggregate_codes(codes);
        xact.last_code = code;
        info!(xact_id = %xact_id, "[member:{}] {} precommitted: {}", name, xact_id, code);
        self.respond_router(xact_id, code, header, true)
    }

    fn on_commit(
        &mut self,
        xact_id: TransactionId,
        header: RequestHeader,
    ) -> Result<(), MemberError> {
        let name = &self.config.name;
        let xact = self.xacts.require(xact_id)?;
        match xact.member_state {
            MemberState::Prepare | MemberState::Precommit => {}
            state if state.is_terminal() => {
                let code = xact.last_code;
                return self.respond_router(xact_id, code, header, true);
            }
            state => {
                warn!(xact_id = %xact_id, "[member:{}] COMMIT for {} in {}", name, xact_id, state);
                return self.respond_router(xact_id, ResponseCode::Nack, header, true);
            }
        }
        if xact.queries().any(|q| q.pending_response) {
            warn!(
                xact_id = %xact_id,
                "[member:{}] COMMIT for {} while prepare is pending, NACK",
                name, xact_id
            );
            return self.respond_router(xact_id, ResponseCode::Nack, header, true);
        }

        xact.transition_to(MemberState::Commit)?;
        run_callbacks(xact, true, |handler, ctx| handler.commit(ctx));
        xact.last_code = ResponseCode::Ack;
        info!(xact_id = %xact_id, "[member:{}] {} committed", name, xact_id);
        self.respond_router(xact_id, ResponseCode::Ack, header, true)
    }

    fn on_abort(
        &mut self,
        xact_id: TransactionId,
        header: RequestHeader,
    ) -> Result<(), MemberError> {
        let name = &self.config.name;
        let xact = self.xacts.require(xact_id)?;
        if xact.member_state.is_terminal() {
            let code = xact.last_code;
            return self.respond_router(xact_id, code, header, true);
        }

        // Outstanding completions are cancelled; late ones are ignored.
        for query in xact.queries_mut() {
            if !query.pending_response {
                continue;
            }
            for m in query.matches.iter_mut().filter(|m| m.is_pending()) {
                m.response = ResponseCode::Nack;
            }
            query.recompute_response();
        }

        if xact.member_state != MemberState::Abort {
            xact.transition_to(MemberState::Abort)?;
        }
        run_callbacks(xact, false, |handler, ctx| handler.abort(ctx));
        xact.transition_to(MemberState::AbortRsp)?;
        xact.last_code = ResponseCode::Ack;
        info!(xact_id = %xact_id, "[member:{}] {} aborted", name, xact_id);
        self.respond_router(xact_id, ResponseCode::Ack, header, true)
    }

    /// Every query has been answered.
    fn on_end(&mut self, xact_id: TransactionId) -> Result<(), MemberError> {
        let name = &self.config.name;
        let xact = self.xacts.require(xact_id)?;
        if xact.ended {
            return Ok(());
        }
        xact.ended = true;
        if xact.member_state == MemberState::Prepare && xact.completes_at_prepare() {
            let code = aggregate_codes(xact.queries().map(|q| q.response_code));
            xact.transition_to(MemberState::Commit)?;
            xact.last_code = code;
            debug!(xact_id = %xact_id, "[member:{}] {} complete at prepare: {}", name, xact_id, code);
        }
        Ok(())
    }
}

/// Header for answering on the request a transaction is associated with.
pub(crate) fn header_of(xact: &Transaction) -> RequestHeader {
    RequestHeader {
        request_id: xact.request_id,
        route: xact.route.clone(),
        debug: xact.debug,
    }
}

/// Invoke `f` for every match, or only for matches that acknowledged
/// prepare.
fn run_callbacks<F>(xact: &Transaction, participants_only: bool, mut f: F)
where
    F: FnMut(&dyn RegistrationHandler, &CallbackContext<'_>),
{
    for query in xact.queries() {
        let matches: Vec<_> = if participants_only {
            query.participants().collect()
        } else {
            query.matches.iter().collect()
        };
        for m in matches {
            let ctx = CallbackContext {
                xact_id: xact.id,
                registration_id: m.registration_id(),
                action: query.action,
                key: &m.key,
                original_key: &m.original_key,
                payload: m.payload.as_ref(),
                flags: query.flags,
            };
            f(&**m.registration.handler(), &ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::channel_sink::ChannelRouterSink;
    use crate::config::MemberConfig;
    use crate::domain::query::{Action, QuerySpec};
    use crate::domain::registration::{RegFlags, RegistrationRequest};
    use crate::domain::transaction::{MemberAddress, RequestId};
    use crate::events::commands::MemberCommand;
    use crate::events::requests::{BlockMsg, RouterRequest};
    use crate::ports::outbound::{MockHandler, Phase};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        member: Member,
        rx: UnboundedReceiver<MemberCommand>,
        results: UnboundedReceiver<(MemberAddress, ResultMessage)>,
    }

    impl Harness {
        fn new() -> Self {
            let (sink, results) = ChannelRouterSink::new();
            let (member, rx) = Member::new(MemberConfig::for_testing(), Arc::new(sink)).unwrap();
            let mut h = Self {
                member,
                rx,
                results,
            };
            h.drain();
            h
        }

        fn drain(&mut self) {
            while let Ok(cmd) = self.rx.try_recv() {
                self.member.dispatch(cmd).unwrap();
            }
        }

        fn register(&mut self, key: &str, flags: RegFlags, handler: Arc<MockHandler>) {
            self.member
                .register(RegistrationRequest::new(key, flags), handler)
                .unwrap();
            self.drain();
        }

        fn send(&mut self, request: RouterRequest) {
            self.member.dispatch(MemberCommand::Router(request)).unwrap();
            self.drain();
        }

        fn prepare(&mut self, xact: u64, request: u64, query: QuerySpec) {
            self.send(RouterRequest::Prepare {
                header: header(request),
                transaction: TransactionMsg::single(TransactionId(xact), query),
            });
        }

        fn result(&mut self) -> ResultMessage {
            self.results.try_recv().unwrap().1
        }

        fn no_result(&mut self) -> bool {
            self.results.try_recv().is_err()
        }
    }

    fn header(request: u64) -> RequestHeader {
        RequestHeader::new(RequestId(request), MemberAddress("router".to_string()))
    }

    #[test]
    fn test_end_to_end_create_commit() {
        let mut h = Harness::new();
        let handler = Arc::new(MockHandler::new(ResponseCode::Ack));
        h.register(
            "/colony[name=c1]",
            RegFlags::SUBSCRIBER | RegFlags::CACHE,
            handler.clone(),
        );

        h.prepare(
            1,
            1,
            QuerySpec::new(Action::Create, "/colony[name=c1]/bundle-ether[name=be1]"),
        );
        let result = h.result();
        assert_eq!(result.code, ResponseCode::Ack);
        assert_eq!(result.results().len(), 1);
        let calls = handler.calls();
        assert_eq!(calls[1].phase, Phase::Prepare);
        assert_eq!(calls[1].action, Some(Action::Create));

        h.send(RouterRequest::Commit {
            header: header(2),
            xact_id: TransactionId(1),
        });
        assert_eq!(h.result().code, ResponseCode::Ack);

        h.send(RouterRequest::Commit {
            header: header(3),
            xact_id: TransactionId(424_242),
        });
        assert_eq!(h.result().code, ResponseCode::Nack);
        assert_eq!(h.member.transaction_count(), 0);
    }

    #[test]
    fn test_not_applicable_prepare_is_removed() {
        let mut h = Harness::new();
        h.register("/a", RegFlags::SUBSCRIBER, Arc::new(MockHandler::new(ResponseCode::Ack)));
        h.prepare(5, 1, QuerySpec::new(Action::Update, "/b"));
        assert_eq!(h.result().code, ResponseCode::NotApplicable);
        assert_eq!(h.member.transaction_count(), 0);
    }

    #[test]
    fn test_bad_key_is_nacked_with_error_report() {
        let mut h = Harness::new();
        h.register("/a", RegFlags::SUBSCRIBER, Arc::new(MockHandler::new(ResponseCode::Ack)));
        let debug = crate::domain::transaction::DebugOptions {
            error_report: true,
            traceroute: false,
        };
        h.send(RouterRequest::Prepare {
            header: header(1).with_debug(debug),
            transaction: TransactionMsg::single(
                TransactionId(6),
                QuerySpec::new(Action::Create, "/a[n=*]"),
            ),
        });
        let result = h.result();
        assert_eq!(result.code, ResponseCode::Nack);
        let report = result.debug.unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(report.traceroute.is_empty());
    }

    #[test]
    fn test_async_prepare_completes_later() {
        let mut h = Harness::new();
        let handler = Arc::new(MockHandler::new(ResponseCode::Async));
        h.register("/a", RegFlags::SUBSCRIBER, handler.clone());

        h.prepare(7, 1, QuerySpec::new(Action::Update, "/a"));
        assert!(h.no_result());
        let xact = h.member.transaction(TransactionId(7)).unwrap();
        assert_eq!(xact.ref_count(), 1);

        // A duplicate prepare joins the pending computation.
        h.prepare(7, 2, QuerySpec::new(Action::Update, "/a"));
        assert!(h.no_result());
        assert_eq!(handler.phases(), vec![Phase::RegReady, Phase::Prepare]);

        for handle in handler.take_pending() {
            handle.complete(ResponseCode::Ack).unwrap();
        }
        h.drain();
        let result = h.result();
        assert_eq!(result.code, ResponseCode::Ack);
        assert_eq!(result.request_id, RequestId(2));
        assert_eq!(h.member.stats().metrics.async_deferrals, 1);
    }

    #[test]
    fn test_async_without_defer_is_nack() {
        struct Sloppy;
        impl RegistrationHandler for Sloppy {
            fn prepare(&self, _ctx: &mut PrepareContext<'_>) -> ResponseCode {
                ResponseCode::Async
            }
        }
        let mut h = Harness::new();
        h.member
            .register(RegistrationRequest::new("/a", RegFlags::SUBSCRIBER), Arc::new(Sloppy))
            .unwrap();
        h.drain();
        h.prepare(8, 1, QuerySpec::new(Action::Update, "/a"));
        assert_eq!(h.result().code, ResponseCode::Nack);
    }

    #[test]
    fn test_precommit_while_pending_is_nack() {
        let mut h = Harness::new();
        h.register("/a", RegFlags::SUBSCRIBER, Arc::new(MockHandler::new(ResponseCode::Async)));
        h.prepare(9, 1, QuerySpec::new(Action::Update, "/a"));
        h.send(RouterRequest::Precommit {
            header: header(2),
            xact_id: TransactionId(9),
        });
        assert_eq!(h.result().code, ResponseCode::Nack);
        assert_eq!(
            h.member.transaction(TransactionId(9)).unwrap().member_state,
            MemberState::Prepare
        );
    }

    #[test]
    fn test_three_phase_with_precommit_nack() {
        let mut h = Harness::new();
        let yes = Arc::new(MockHandler::new(ResponseCode::Ack));
        let no = Arc::new(MockHandler::new(ResponseCode::Ack).with_precommit(ResponseCode::Nack));
        h.register("/a", RegFlags::SUBSCRIBER, yes.clone());
        h.register("/a", RegFlags::SUBSCRIBER, no.clone());

        h.prepare(10, 1, QuerySpec::new(Action::Update, "/a"));
        assert_eq!(h.result().code, ResponseCode::Ack);

        h.send(RouterRequest::Precommit {
            header: header(2),
            xact_id: TransactionId(10),
        });
        assert_eq!(h.result().code, ResponseCode::Nack);

        h.send(RouterRequest::Abort {
            header: header(3),
            xact_id: TransactionId(10),
        });
        assert_eq!(h.result().code, ResponseCode::Ack);
        assert_eq!(
            yes.phases(),
            vec![Phase::RegReady, Phase::Prepare, Phase::Precommit, Phase::Abort]
        );
        assert_eq!(h.member.transaction_count(), 0);
    }

    #[test]
    fn test_abort_cancels_pending_and_ignores_late_completion() {
        let mut h = Harness::new();
        let handler = Arc::new(MockHandler::new(ResponseCode::Async));
        h.register("/a", RegFlags::SUBSCRIBER, handler.clone());
        h.prepare(11, 1, QuerySpec::new(Action::Update, "/a"));

        h.send(RouterRequest::Abort {
            header: header(2),
            xact_id: TransactionId(11),
        });
        assert_eq!(h.result().code, ResponseCode::Ack);
        assert_eq!(h.member.transaction_count(), 0);

        for handle in handler.take_pending() {
            handle.complete(ResponseCode::Ack).unwrap();
        }
        h.drain();
        assert!(h.no_result());
    }

    #[test]
    fn test_terminal_transaction_repeats_last_code() {
        let mut h = Harness::new();
        let handler = Arc::new(MockHandler::new(ResponseCode::Ack));
        h.register("/a", RegFlags::SUBSCRIBER, handler);
        h.prepare(12, 1, QuerySpec::new(Action::Update, "/a"));
        h.result();

        // Hold the transaction open across two protocol events.
        h.member.xacts.require(TransactionId(12)).unwrap().hold();
        h.send(RouterRequest::Commit {
            header: header(2),
            xact_id: TransactionId(12),
        });
        assert_eq!(h.result().code, ResponseCode::Ack);
        h.send(RouterRequest::Abort {
            header: header(3),
            xact_id: TransactionId(12),
        });
        let result = h.result();
        assert_eq!(result.code, ResponseCode::Ack);
        assert_eq!(
            h.member.transaction(TransactionId(12)).unwrap().member_state,
            MemberState::Commit
        );
    }

    #[test]
    fn test_read_completes_at_prepare_with_data() {
        let mut h = Harness::new();
        let handler = Arc::new(
            MockHandler::new(ResponseCode::Ack).with_result(json!({"mtu": 9000})),
        );
        h.register(
            "/colony[name=c1]/bundle-ether[name=be1]",
            RegFlags::PUBLISHER,
            handler,
        );
        h.prepare(13, 1, QuerySpec::new(Action::Read, "/colony[name=c1]"));
        let result = h.result();
        assert_eq!(result.code, ResponseCode::Ack);
        assert_eq!(
            result.results()[0].payload,
            Some(json!({"bundle-ether": [{"name": "be1", "mtu": 9000}]}))
        );
        assert_eq!(h.member.transaction_count(), 0);
    }

    #[test]
    fn test_new_blocks_reported_once() {
        let mut h = Harness::new();
        let handler = Arc::new(
            MockHandler::new(ResponseCode::Ack)
                .with_follow_on(vec![QuerySpec::new(Action::Create, "/dep")]),
        );
        h.register("/a", RegFlags::SUBSCRIBER, handler);
        h.prepare(14, 1, QuerySpec::new(Action::Update, "/a"));
        assert_eq!(h.result().new_blocks, vec![BlockId(2)]);

        h.prepare(14, 2, QuerySpec::new(Action::Update, "/a"));
        let again = h.result();
        assert_eq!(again.request_id, RequestId(2));
        assert!(again.new_blocks.is_empty());
    }

    #[test]
    fn test_follow_on_refused_when_block_ids_exhausted() {
        let mut h = Harness::new();
        let handler = Arc::new(
            MockHandler::new(ResponseCode::Ack)
                .with_follow_on(vec![QuerySpec::new(Action::Create, "/dep")]),
        );
        h.register("/a", RegFlags::SUBSCRIBER, handler);
        h.send(RouterRequest::Prepare {
            header: header(1),
            transaction: TransactionMsg {
                xact_id: TransactionId(16),
                blocks: vec![BlockMsg {
                    id: BlockId(u32::MAX),
                    queries: vec![QuerySpec::new(Action::Update, "/a")],
                }],
            },
        });
        let result = h.result();
        assert_eq!(result.code, ResponseCode::Ack);
        assert!(result.new_blocks.is_empty());
        assert!(h
            .member
            .transaction(TransactionId(16))
            .unwrap()
            .new_blocks
            .is_empty());
    }

    #[test]
    fn test_rejected_prepare_never_aborts_unprepared_handlers() {
        let mut h = Harness::new();
        let deep = Arc::new(MockHandler::new(ResponseCode::Ack));
        let shallow = Arc::new(MockHandler::new(ResponseCode::Ack));
        h.register(
            "/colony[name=c1]/bundle-ether[name=be1]",
            RegFlags::SUBSCRIBER,
            deep.clone(),
        );
        h.register("/colony[name=c1]", RegFlags::SUBSCRIBER, shallow.clone());

        h.prepare(
            17,
            1,
            QuerySpec::new(Action::Create, "/colony[name=c1]/bundle-ether[name=be1]")
                .with_payload(json!(5)),
        );
        assert_eq!(h.result().code, ResponseCode::Nack);
        let xact = h.member.transaction(TransactionId(17)).unwrap();
        assert!(xact.queries().all(|q| q.matches.is_empty()));

        h.send(RouterRequest::Abort {
            header: header(2),
            xact_id: TransactionId(17),
        });
        assert_eq!(h.result().code, ResponseCode::Ack);
        for handler in [&deep, &shallow] {
            assert_eq!(handler.phases(), vec![Phase::RegReady]);
        }
    }

    #[test]
    fn test_multiple_blocks_is_fatal() {
        let mut h = Harness::new();
        let q = QuerySpec::new(Action::Update, "/a");
        let request = RouterRequest::Prepare {
            header: header(1),
            transaction: TransactionMsg {
                xact_id: TransactionId(15),
                blocks: vec![
                    BlockMsg {
                        id: BlockId(1),
                        queries: vec![q.clone()],
                    },
                    BlockMsg {
                        id: BlockId(2),
                        queries: vec![q],
                    },
                ],
            },
        };
        let err = h.member.dispatch(MemberCommand::Router(request)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(h.result().code, ResponseCode::Nack);
        assert_eq!(h.member.transaction_count(), 0);
    }
}
