//! # Queries and Blocks
//!
//! A transaction carries blocks, a block carries queries. The engine
//! processes exactly one block holding exactly one query.

use crate::domain::match_info::{MatchId, MatchInfo};
use crate::domain::registration::{Category, Role};
use crate::domain::response::ResponseCode;
use crate::domain::transaction::{RequestId, TransactionId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Query action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Create,
    Update,
    Delete,
    Read,
    Rpc,
}

impl Action {
    /// Create, update or delete.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }

    /// Actions whose key must not carry wildcards.
    pub fn requires_concrete_key(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Rpc)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Read => "READ",
            Self::Rpc => "RPC",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Per-query routing flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct QueryFlags: u32 {
        /// Write delivered to publishers instead of subscribers.
        const ADVISE = 1 << 0;
        /// Read answered by caching subscribers.
        const SUBSCRIBER_READ = 1 << 1;
        /// Last query of the transaction.
        const END = 1 << 2;
        /// Query completes at prepare; no commit phase follows.
        const NO_TRANSACTION = 1 << 3;
        /// Only the first matching registration is used.
        const ANYCAST = 1 << 4;
        /// Read results are returned per match instead of merged.
        const STREAM = 1 << 5;
    }
}

/// Which registration role an action with these flags is delivered to.
pub fn target_role(action: Action, flags: QueryFlags) -> Role {
    match action {
        Action::Read if flags.contains(QueryFlags::SUBSCRIBER_READ) => Role::Subscriber,
        Action::Read | Action::Rpc => Role::Publisher,
        _ if flags.contains(QueryFlags::ADVISE) => Role::Publisher,
        _ => Role::Subscriber,
    }
}

/// Block identifier within a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// A query as carried on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub action: Action,
    /// Key in text form; parsed during matching.
    pub key: String,
    pub payload: Option<Value>,
    pub flags: QueryFlags,
    /// Falls back to the member's default category.
    pub category: Option<Category>,
    pub correlation_id: u64,
}

impl QuerySpec {
    pub fn new(action: Action, key: impl Into<String>) -> Self {
        Self {
            action,
            key: key.into(),
            payload: None,
            flags: QueryFlags::empty(),
            category: None,
            correlation_id: 0,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_flags(mut self, flags: QueryFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_correlation(mut self, correlation_id: u64) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// A query being processed by the engine.
#[derive(Debug)]
pub struct Query {
    pub index: usize,
    pub action: Action,
    pub key: String,
    pub payload: Option<Value>,
    pub flags: QueryFlags,
    pub category: Category,
    pub correlation_id: u64,
    pub response_code: ResponseCode,
    /// A final result has been sent to the router.
    pub responded: bool,
    /// At least one match is waiting on an asynchronous completion.
    pub pending_response: bool,
    /// Owning transaction (lookup by id, never ownership).
    pub xact_id: TransactionId,
    /// Router request this query is answered on.
    pub request_id: RequestId,
    pub matches: Vec<MatchInfo>,
    /// Diagnostics for error reports.
    pub errors: Vec<String>,
    next_match_id: u32,
}

impl Query {
    pub fn from_spec(
        index: usize,
        spec: QuerySpec,
        default_category: Category,
        xact_id: TransactionId,
        request_id: RequestId,
    ) -> Self {
        Self {
            index,
            action: spec.action,
            key: spec.key,
            payload: spec.payload,
            flags: spec.flags,
            category: spec.category.unwrap_or(default_category),
            correlation_id: spec.correlation_id,
            response_code: ResponseCode::None,
            responded: false,
            pending_response: false,
            xact_id,
            request_id,
            matches: Vec::new(),
            errors: Vec::new(),
            next_match_id: 0,
        }
    }

    /// Allocate the next match id.
    pub fn next_match_id(&mut self) -> MatchId {
        let id = MatchId(self.next_match_id);
        self.next_match_id += 1;
        id
    }

    pub fn match_mut(&mut self, id: MatchId) -> Option<&mut MatchInfo> {
        self.matches.iter_mut().find(|m| m.id == id)
    }

    /// Fold the codes of all matches into the query's code.
    pub fn recompute_response(&mut self) -> ResponseCode {
        let code = self
            .matches
            .iter()
            .fold(ResponseCode::None, |acc, m| acc.fold(m.response));
        self.response_code = if code == ResponseCode::None {
            ResponseCode::NotApplicable
        } else {
            code
        };
        self.pending_response = self.response_code == ResponseCode::Async;
        self.response_code
    }

    /// Reads and `NO_TRANSACTION` queries finish at prepare.
    pub fn completes_at_prepare(&self) -> bool {
        self.action == Action::Read || self.flags.contains(QueryFlags::NO_TRANSACTION)
    }

    /// Matches that accepted the prepare and take part in later phases.
    pub fn participants(&self) -> impl Iterator<Item = &MatchInfo> {
        self.matches
            .iter()
            .filter(|m| matches!(m.response, ResponseCode::Ack | ResponseCode::Internal))
    }
}

/// A block of queries.
#[derive(Debug)]
pub struct Block {
    pub id: BlockId,
    pub queries: Vec<Query>,
}
