//! Events Layer - Router Messages and Member Commands

pub mod commands;
pub mod requests;
pub mod responses;

pub use commands::{MemberCommand, XactEvent};
pub use requests::{BlockMsg, RequestHeader, RouterRequest, TransactionMsg};
pub use responses::{BlockResult, DebugReport, QueryResult, ResultMessage};
