//! Router Result Messages
//!
//! One `ResultMessage` answers one router request for one transaction.

use crate::domain::query::BlockId;
use crate::domain::response::ResponseCode;
use crate::domain::transaction::{RequestId, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of one query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Query index within its block
    pub index: usize,
    pub correlation_id: u64,
    pub code: ResponseCode,
    /// Key the payload is rooted at, in text form
    pub key: Option<String>,
    pub payload: Option<Value>,
}

/// Per-query results of one block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockResult {
    pub block_id: BlockId,
    pub results: Vec<QueryResult>,
}

/// Diagnostics attached when the request asked for them
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugReport {
    pub traceroute: Vec<String>,
    pub errors: Vec<String>,
}

/// Reply to a router request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub xact_id: TransactionId,
    pub request_id: RequestId,
    /// Aggregate code
    pub code: ResponseCode,
    /// Blocks created by prepare handlers, reported once
    pub new_blocks: Vec<BlockId>,
    pub block_result: Option<BlockResult>,
    pub debug: Option<DebugReport>,
}

impl ResultMessage {
    /// Bare result carrying only a code.
    pub fn bare(xact_id: TransactionId, request_id: RequestId, code: ResponseCode) -> Self {
        Self {
            xact_id,
            request_id,
            code,
            new_blocks: Vec::new(),
            block_result: None,
            debug: None,
        }
    }

    /// Immediate NACK for a request that cannot be processed.
    pub fn nack(xact_id: TransactionId, request_id: RequestId) -> Self {
        Self::bare(xact_id, request_id, ResponseCode::Nack)
    }

    /// Results of every query, in block order.
    pub fn results(&self) -> &[QueryResult] {
        self.block_result
            .as_ref()
            .map(|b| b.results.as_slice())
            .unwrap_or(&[])
    }
}
