//! # Outbound Ports
//!
//! What the member engine calls out to: the application's per-registration
//! handlers and the transport that carries results back to the router.
//!
//! Handlers run on the member's execution context and must not block. A
//! prepare handler that needs more time calls [`PrepareContext::defer`],
//! returns `ASYNC` and later resolves the returned [`CompletionHandle`].

use crate::domain::key::Key;
use crate::domain::match_info::MatchId;
use crate::domain::query::{Action, BlockId, QueryFlags, QuerySpec};
use crate::domain::registration::RegistrationId;
use crate::domain::response::ResponseCode;
use crate::domain::transaction::{MemberAddress, TransactionId};
use crate::error::TransportError;
use crate::events::commands::MemberCommand;
use crate::events::responses::ResultMessage;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

/// Application callbacks of one registration.
pub trait RegistrationHandler: Send + Sync {
    /// Vote on a proposed change, or answer a read.
    fn prepare(&self, ctx: &mut PrepareContext<'_>) -> ResponseCode;

    /// Second-phase vote. Only called for matches that acknowledged prepare.
    fn precommit(&self, _ctx: &CallbackContext<'_>) -> ResponseCode {
        ResponseCode::Ack
    }

    /// Apply the change.
    fn commit(&self, _ctx: &CallbackContext<'_>) {}

    /// Drop the change.
    fn abort(&self, _ctx: &CallbackContext<'_>) {}

    /// The registration is installed and will be matched.
    fn reg_ready(&self, _id: RegistrationId) {}
}

/// Handler that acknowledges everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AckHandler;

impl RegistrationHandler for AckHandler {
    fn prepare(&self, _ctx: &mut PrepareContext<'_>) -> ResponseCode {
        ResponseCode::Ack
    }
}

/// Transport back to the router.
pub trait RouterSink: Send + Sync {
    fn send_result(&self, route: &MemberAddress, result: ResultMessage)
        -> Result<(), TransportError>;
}

/// What a handler sees of the match it is called for.
#[derive(Clone, Copy, Debug)]
pub struct CallbackContext<'a> {
    pub xact_id: TransactionId,
    pub registration_id: RegistrationId,
    pub action: Action,
    /// Key reconciled to the registration's depth.
    pub key: &'a Key,
    /// Query key as received.
    pub original_key: &'a Key,
    pub payload: Option<&'a Value>,
    pub flags: QueryFlags,
}

/// Prepare-phase context: the match plus the side effects a prepare
/// handler may request.
pub struct PrepareContext<'a> {
    info: CallbackContext<'a>,
    query_index: usize,
    match_id: MatchId,
    queue: &'a UnboundedSender<MemberCommand>,
    next_block: Option<BlockId>,
    block_budget: usize,
    deferred: bool,
    result: Option<Value>,
    new_blocks: Vec<(BlockId, Vec<QuerySpec>)>,
}

/// Side effects collected from one prepare call.
#[derive(Debug, Default)]
pub struct PrepareEffects {
    pub deferred: bool,
    pub result: Option<Value>,
    pub new_blocks: Vec<(BlockId, Vec<QuerySpec>)>,
}

impl<'a> PrepareContext<'a> {
    pub(crate) fn new(
        info: CallbackContext<'a>,
        query_index: usize,
        match_id: MatchId,
        queue: &'a UnboundedSender<MemberCommand>,
        next_block: Option<BlockId>,
        block_budget: usize,
    ) -> Self {
        Self {
            info,
            query_index,
            match_id,
            queue,
            next_block,
            block_budget,
            deferred: false,
            result: None,
            new_blocks: Vec::new(),
        }
    }

    pub fn xact_id(&self) -> TransactionId {
        self.info.xact_id
    }

    pub fn registration_id(&self) -> RegistrationId {
        self.info.registration_id
    }

    pub fn action(&self) -> Action {
        self.info.action
    }

    pub fn key(&self) -> &Key {
        self.info.key
    }

    pub fn original_key(&self) -> &Key {
        self.info.original_key
    }

    pub fn payload(&self) -> Option<&Value> {
        self.info.payload
    }

    pub fn flags(&self) -> QueryFlags {
        self.info.flags
    }

    pub fn info(&self) -> &CallbackContext<'a> {
        &self.info
    }

    /// Take responsibility for answering later. The handler must then
    /// return `ASYNC`.
    pub fn defer(&mut self) -> CompletionHandle {
        self.deferred = true;
        CompletionHandle {
            xact_id: self.info.xact_id,
            query_index: self.query_index,
            match_id: self.match_id,
            queue: self.queue.clone(),
        }
    }

    /// Read data rooted at [`key`](Self::key).
    pub fn set_result(&mut self, data: Value) {
        self.result = Some(data);
    }

    /// Add a follow-on block to the transaction. Returns `None` once the
    /// member's new-block limit is reached or no block id is left.
    pub fn enqueue_block(&mut self, queries: Vec<QuerySpec>) -> Option<BlockId> {
        if self.block_budget == 0 {
            return None;
        }
        let id = self.next_block?;
        self.block_budget -= 1;
        self.next_block = id.0.checked_add(1).map(BlockId);
        self.new_blocks.push((id, queries));
        Some(id)
    }

    pub(crate) fn into_effects(self) -> PrepareEffects {
        PrepareEffects {
            deferred: self.deferred,
            result: self.result,
            new_blocks: self.new_blocks,
        }
    }
}

/// Resolves one deferred prepare.
#[derive(Debug)]
pub struct CompletionHandle {
    xact_id: TransactionId,
    query_index: usize,
    match_id: MatchId,
    queue: UnboundedSender<MemberCommand>,
}

impl CompletionHandle {
    pub fn xact_id(&self) -> TransactionId {
        self.xact_id
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn complete(self, code: ResponseCode) -> Result<(), TransportError> {
        self.post(code, None)
    }

    pub fn complete_with_data(self, code: ResponseCode, data: Value) -> Result<(), TransportError> {
        self.post(code, Some(data))
    }

    fn post(self, code: ResponseCode, data: Option<Value>) -> Result<(), TransportError> {
        self.queue
            .send(MemberCommand::QueryResponse {
                xact_id: self.xact_id,
                query_index: self.query_index,
                match_id: self.match_id,
                code,
                data,
            })
            .map_err(|_| TransportError::Closed)
    }
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Callback phase recorded by [`MockHandler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Precommit,
    Commit,
    Abort,
    RegReady,
}

/// One recorded callback.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerCall {
    pub phase: Phase,
    pub action: Option<Action>,
    pub key: Option<String>,
    pub payload: Option<Value>,
}

/// Scripted handler: answers prepare and precommit with fixed codes and
/// records every callback. A prepare code of `ASYNC` defers and parks the
/// completion handle.
pub struct MockHandler {
    prepare_code: ResponseCode,
    precommit_code: ResponseCode,
    result: Option<Value>,
    follow_on: Option<Vec<QuerySpec>>,
    calls: Mutex<Vec<HandlerCall>>,
    pending: Mutex<Vec<CompletionHandle>>,
}

impl MockHandler {
    pub fn new(prepare_code: ResponseCode) -> Self {
        Self {
            prepare_code,
            precommit_code: ResponseCode::Ack,
            result: None,
            follow_on: None,
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_precommit(mut self, code: ResponseCode) -> Self {
        self.precommit_code = code;
        self
    }

    /// Answer reads with `data`.
    pub fn with_result(mut self, data: Value) -> Self {
        self.result = Some(data);
        self
    }

    /// Enqueue a follow-on block during prepare.
    pub fn with_follow_on(mut self, queries: Vec<QuerySpec>) -> Self {
        self.follow_on = Some(queries);
        self
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.calls.lock().iter().map(|c| c.phase).collect()
    }

    /// Completion handles parked by deferred prepares.
    pub fn take_pending(&self) -> Vec<CompletionHandle> {
        std::mem::take(&mut *self.pending.lock())
    }

    fn record(&self, phase: Phase, ctx: Option<&CallbackContext<'_>>) {
        self.calls.lock().push(HandlerCall {
            phase,
            action: ctx.map(|c| c.action),
            key: ctx.map(|c| c.key.to_string()),
            payload: ctx.and_then(|c| c.payload.cloned()),
        });
    }
}

impl RegistrationHandler for MockHandler {
    fn prepare(&self, ctx: &mut PrepareContext<'_>) -> ResponseCode {
        self.record(Phase::Prepare, Some(ctx.info()));
        if let Some(data) = &self.result {
            ctx.set_result(data.clone());
        }
        if let Some(queries) = &self.follow_on {
            ctx.enqueue_block(queries.clone());
        }
        if self.prepare_code == ResponseCode::Async {
            let handle = ctx.defer();
            self.pending.lock().push(handle);
        }
        self.prepare_code
    }

    fn precommit(&self, ctx: &CallbackContext<'_>) -> ResponseCode {
        self.record(Phase::Precommit, Some(ctx));
        self.precommit_code
    }

    fn commit(&self, ctx: &CallbackContext<'_>) {
        self.record(Phase::Commit, Some(ctx));
    }

    fn abort(&self, ctx: &CallbackContext<'_>) {
        self.record(Phase::Abort, Some(ctx));
    }

    fn reg_ready(&self, _id: RegistrationId) {
        self.record(Phase::RegReady, None);
    }
}
