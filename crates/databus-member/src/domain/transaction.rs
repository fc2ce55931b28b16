//! # Transactions
//!
//! In-flight unit of coordinated change, owned by the transaction store and
//! looked up by id on every router message.
//!
//! ## Member state machine
//!
//! ```text
//! Init ──► Prepare ──► Precommit ──► Commit (terminal)
//!   │         │  └───────────────────► Commit (single-phase)
//!   │         ▼            │
//!   └──────► Abort ◄───────┘
//!             │
//!             ▼
//!          AbortRsp (terminal)
//! ```

use crate::domain::query::{Block, BlockId, Query, QuerySpec};
use crate::domain::response::ResponseCode;
use crate::error::MemberError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// System-wide transaction identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xact-{}", self.0)
    }
}

/// Router request identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Member routing address supplied by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberAddress(pub String);

impl fmt::Display for MemberAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Diagnostics a request asks to have attached to its result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugOptions {
    pub error_report: bool,
    pub traceroute: bool,
}

impl DebugOptions {
    pub fn any(self) -> bool {
        self.error_report || self.traceroute
    }
}

/// Member-side transaction state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    #[default]
    Init,
    Prepare,
    Precommit,
    Commit,
    Abort,
    AbortRsp,
}

impl MemberState {
    /// Check if transition to next state is valid.
    pub fn can_transition_to(self, next: MemberState) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Prepare)
                | (Self::Prepare, Self::Precommit)
                | (Self::Prepare, Self::Commit)
                | (Self::Precommit, Self::Commit)
                | (Self::Init, Self::Abort)
                | (Self::Prepare, Self::Abort)
                | (Self::Precommit, Self::Abort)
                | (Self::Abort, Self::AbortRsp)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Commit | Self::AbortRsp)
    }

    /// Past prepare: results carry the last recorded code.
    pub fn past_prepare(self) -> bool {
        matches!(
            self,
            Self::Precommit | Self::Commit | Self::Abort | Self::AbortRsp
        )
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Prepare => "PREPARE",
            Self::Precommit => "PRECOMMIT",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::AbortRsp => "ABORT_RSP",
        };
        f.write_str(s)
    }
}

/// Reporting state of a block created by a prepare handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewBlockState {
    /// Not yet reported to the router.
    Notify,
    /// Reported once.
    Notified,
}

/// A follow-on block enqueued as a side effect of prepare.
#[derive(Clone, Debug)]
pub struct NewBlock {
    pub id: BlockId,
    pub queries: Vec<QuerySpec>,
    pub state: NewBlockState,
}

/// An in-flight transaction.
#[derive(Debug)]
pub struct Transaction {
    pub id: TransactionId,
    pub blocks: Vec<Block>,
    pub member_state: MemberState,
    pub new_blocks: Vec<NewBlock>,
    /// Route the router expects results on.
    pub route: MemberAddress,
    /// Request currently being answered.
    pub request_id: RequestId,
    pub debug: DebugOptions,
    /// Code recorded by the latest precommit/commit/abort.
    pub last_code: ResponseCode,
    pub responses_sent: u32,
    /// The internal END event has been raised.
    pub ended: bool,
    /// Scheduled work and unsent responses holding the transaction.
    holds: u32,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        block: Block,
        route: MemberAddress,
        request_id: RequestId,
        debug: DebugOptions,
    ) -> Self {
        Self {
            id,
            blocks: vec![block],
            member_state: MemberState::Init,
            new_blocks: Vec::new(),
            route,
            request_id,
            debug,
            last_code: ResponseCode::None,
            responses_sent: 0,
            ended: false,
            holds: 0,
        }
    }

    /// Transition to a new state.
    pub fn transition_to(&mut self, next: MemberState) -> Result<(), MemberError> {
        if !self.member_state.can_transition_to(next) {
            return Err(MemberError::InvalidTransition {
                xact_id: self.id,
                from: self.member_state.to_string(),
                to: next.to_string(),
            });
        }
        self.member_state = next;
        Ok(())
    }

    pub fn queries(&self) -> impl Iterator<Item = &Query> {
        self.blocks.iter().flat_map(|b| b.queries.iter())
    }

    pub fn queries_mut(&mut self) -> impl Iterator<Item = &mut Query> {
        self.blocks.iter_mut().flat_map(|b| b.queries.iter_mut())
    }

    pub fn query_mut(&mut self, index: usize) -> Option<&mut Query> {
        self.queries_mut().find(|q| q.index == index)
    }

    /// First block id not used by the transaction, `None` once the id
    /// space is exhausted.
    pub fn next_block_id(&self) -> Option<BlockId> {
        let max = self
            .blocks
            .iter()
            .map(|b| b.id.0)
            .chain(self.new_blocks.iter().map(|b| b.id.0))
            .max()
            .unwrap_or(0);
        max.checked_add(1).map(BlockId)
    }

    pub fn hold(&mut self) {
        self.holds += 1;
    }

    pub fn release(&mut self) {
        debug_assert!(self.holds > 0, "release without hold on {}", self.id);
        self.holds = self.holds.saturating_sub(1);
    }

    /// Holds plus queries waiting on an asynchronous completion.
    pub fn ref_count(&self) -> u32 {
        let pending = self.queries().filter(|q| q.pending_response).count() as u32;
        self.holds + pending
    }

    pub fn all_responded(&self) -> bool {
        self.queries().all(|q| q.responded)
    }

    /// Every query finishes at prepare (reads, `NO_TRANSACTION`).
    pub fn completes_at_prepare(&self) -> bool {
        self.queries().all(Query::completes_at_prepare)
    }

    /// No local registration took part.
    pub fn not_applicable(&self) -> bool {
        self.queries()
            .all(|q| q.response_code == ResponseCode::NotApplicable)
    }

    /// Terminal (or never involved), fully answered and unreferenced.
    pub fn is_removable(&self) -> bool {
        let finished = self.member_state.is_terminal()
            || (self.member_state == MemberState::Prepare && self.not_applicable());
        finished && self.all_responded() && self.ref_count() == 0
    }
}
