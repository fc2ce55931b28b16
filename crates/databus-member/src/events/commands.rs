//! Member Commands
//!
//! Everything a member does runs as one `MemberCommand` taken off its FIFO
//! queue: router requests, application calls, asynchronous completions and
//! work the member schedules for itself.

use crate::domain::match_info::MatchId;
use crate::domain::registration::{RegistrationHandle, RegistrationId, RegistrationRequest};
use crate::domain::response::ResponseCode;
use crate::domain::transaction::TransactionId;
use crate::error::RegistrationError;
use crate::events::requests::{RequestHeader, RouterRequest, TransactionMsg};
use crate::metrics::MemberStats;
use crate::ports::outbound::RegistrationHandler;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Protocol events driving a transaction through `xact_run`.
#[derive(Clone, Debug)]
pub enum XactEvent {
    Prepare {
        header: RequestHeader,
        transaction: TransactionMsg,
    },
    Precommit {
        header: RequestHeader,
    },
    Commit {
        header: RequestHeader,
    },
    Abort {
        header: RequestHeader,
    },
    /// Asynchronous completion of one match.
    QueryRsp {
        query_index: usize,
        match_id: MatchId,
        code: ResponseCode,
        data: Option<Value>,
    },
    /// Every query of the transaction has been answered.
    End,
}

impl XactEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prepare { .. } => "PREPARE",
            Self::Precommit { .. } => "PRECOMMIT",
            Self::Commit { .. } => "COMMIT",
            Self::Abort { .. } => "ABORT",
            Self::QueryRsp { .. } => "QUERY_RSP",
            Self::End => "END",
        }
    }
}

/// Work item on a member's queue.
pub enum MemberCommand {
    /// Request from the router.
    Router(RouterRequest),
    /// Completion posted through a `CompletionHandle`.
    QueryResponse {
        xact_id: TransactionId,
        query_index: usize,
        match_id: MatchId,
        code: ResponseCode,
        data: Option<Value>,
    },
    /// Scheduled result; the transaction is held until it runs.
    SendResponse {
        xact_id: TransactionId,
        header: RequestHeader,
        code: ResponseCode,
    },
    /// Scheduled phase work; the transaction is held until it runs.
    RunPhase {
        xact_id: TransactionId,
        event: XactEvent,
    },
    /// Notify a registration that it is installed.
    RegReady(RegistrationId),
    Register {
        request: RegistrationRequest,
        handler: Arc<dyn RegistrationHandler>,
        reply: oneshot::Sender<Result<RegistrationHandle, RegistrationError>>,
    },
    Deregister {
        id: RegistrationId,
        reply: oneshot::Sender<bool>,
    },
    BeginAudit {
        id: RegistrationId,
        reply: oneshot::Sender<Result<(), RegistrationError>>,
    },
    FinishAudit {
        id: RegistrationId,
        reply: oneshot::Sender<Result<bool, RegistrationError>>,
    },
    Stats {
        reply: oneshot::Sender<MemberStats>,
    },
    Shutdown,
}

impl MemberCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Router(r) => r.kind(),
            Self::QueryResponse { .. } => "query_response",
            Self::SendResponse { .. } => "send_response",
            Self::RunPhase { .. } => "run_phase",
            Self::RegReady(_) => "reg_ready",
            Self::Register { .. } => "register",
            Self::Deregister { .. } => "deregister",
            Self::BeginAudit { .. } => "begin_audit",
            Self::FinishAudit { .. } => "finish_audit",
            Self::Stats { .. } => "stats",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for MemberCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Router(r) => f.debug_tuple("Router").field(r).finish(),
            Self::QueryResponse {
                xact_id,
                query_index,
                match_id,
                code,
                ..
            } => f
                .debug_struct("QueryResponse")
                .field("xact_id", xact_id)
                .field("query_index", query_index)
                .field("match_id", match_id)
                .field("code", code)
                .finish(),
            Self::SendResponse { xact_id, code, .. } => f
                .debug_struct("SendResponse")
                .field("xact_id", xact_id)
                .field("code", code)
                .finish(),
            Self::RunPhase { xact_id, event } => f
                .debug_struct("RunPhase")
                .field("xact_id", xact_id)
                .field("event", &event.kind())
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}
