//! Router Request Messages
//!
//! Messages the router sends to a member. Every message carries a
//! `RequestHeader` naming the route the result goes back on.

use crate::domain::query::{BlockId, QuerySpec};
use crate::domain::transaction::{DebugOptions, MemberAddress, RequestId, TransactionId};
use serde::{Deserialize, Serialize};

/// Per-request envelope supplied by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub request_id: RequestId,
    /// Route the result is sent back on
    pub route: MemberAddress,
    pub debug: DebugOptions,
}

impl RequestHeader {
    pub fn new(request_id: RequestId, route: MemberAddress) -> Self {
        Self {
            request_id,
            route,
            debug: DebugOptions::default(),
        }
    }

    pub fn with_debug(mut self, debug: DebugOptions) -> Self {
        self.debug = debug;
        self
    }
}

/// One block of a prepared transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockMsg {
    pub id: BlockId,
    pub queries: Vec<QuerySpec>,
}

/// Transaction body carried by `Prepare`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionMsg {
    pub xact_id: TransactionId,
    pub blocks: Vec<BlockMsg>,
}

impl TransactionMsg {
    /// A transaction of one block holding one query.
    pub fn single(xact_id: TransactionId, query: QuerySpec) -> Self {
        Self {
            xact_id,
            blocks: vec![BlockMsg {
                id: BlockId(1),
                queries: vec![query],
            }],
        }
    }
}

/// Router-facing RPC surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RouterRequest {
    Prepare {
        header: RequestHeader,
        transaction: TransactionMsg,
    },
    Precommit {
        header: RequestHeader,
        xact_id: TransactionId,
    },
    Commit {
        header: RequestHeader,
        xact_id: TransactionId,
    },
    Abort {
        header: RequestHeader,
        xact_id: TransactionId,
    },
}

impl RouterRequest {
    pub fn header(&self) -> &RequestHeader {
        match self {
            Self::Prepare { header, .. }
            | Self::Precommit { header, .. }
            | Self::Commit { header, .. }
            | Self::Abort { header, .. } => header,
        }
    }

    pub fn xact_id(&self) -> TransactionId {
        match self {
            Self::Prepare { transaction, .. } => transaction.xact_id,
            Self::Precommit { xact_id, .. }
            | Self::Commit { xact_id, .. }
            | Self::Abort { xact_id, .. } => *xact_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "prepare",
            Self::Precommit { .. } => "precommit",
            Self::Commit { .. } => "commit",
            Self::Abort { .. } => "abort",
        }
    }
}
