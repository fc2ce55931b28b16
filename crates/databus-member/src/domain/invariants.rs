//! # Domain Invariants
//!
//! Rules that must always hold for the member engine.

use crate::domain::query::Action;
use crate::domain::registration::Registration;
use crate::domain::response::ResponseCode;
use crate::domain::transaction::Transaction;
use crate::error::MemberError;

/// Blocks per transaction the engine processes.
pub const MAX_BLOCKS_PER_TRANSACTION: usize = 1;

/// Queries per block the engine processes.
pub const MAX_QUERIES_PER_BLOCK: usize = 1;

/// Invariant: the aggregate code is the maximum of the per-match codes, and
/// any outstanding match defers the whole query.
pub fn invariant_aggregate_is_max(codes: &[ResponseCode], aggregate: ResponseCode) -> bool {
    if codes.contains(&ResponseCode::Async) && aggregate != ResponseCode::Async {
        return false;
    }
    let max_rank = codes.iter().map(|c| c.rank()).max().unwrap_or(0);
    aggregate.rank() == max_rank
}

/// Invariant: a transaction is never removable while a query awaits an
/// asynchronous completion.
pub fn invariant_not_removable_while_pending(xact: &Transaction) -> Result<(), MemberError> {
    let pending = xact.queries().any(|q| q.pending_response);
    if pending && (xact.ref_count() == 0 || xact.is_removable()) {
        return Err(MemberError::InvalidTransition {
            xact_id: xact.id,
            from: xact.member_state.to_string(),
            to: "removed with pending response".to_string(),
        });
    }
    Ok(())
}

/// Invariant: exactly one block holding exactly one query.
pub fn invariant_single_query(blocks: usize, queries_in_first: usize) -> Result<(), MemberError> {
    if blocks != MAX_BLOCKS_PER_TRANSACTION {
        return Err(MemberError::Unsupported(format!(
            "{} blocks in transaction (exactly {} supported)",
            blocks, MAX_BLOCKS_PER_TRANSACTION
        )));
    }
    if queries_in_first != MAX_QUERIES_PER_BLOCK {
        return Err(MemberError::Unsupported(format!(
            "{} queries in block (exactly {} supported)",
            queries_in_first, MAX_QUERIES_PER_BLOCK
        )));
    }
    Ok(())
}

/// Invariant: registrations pending deletion are only matched by reads.
pub fn invariant_pending_matched_by_reads_only(reg: &Registration, action: Action) -> bool {
    reg.is_active() || action == Action::Read
}
