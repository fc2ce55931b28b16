//! # Databus Member
//!
//! Member side of a transactional configuration bus.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Applications register interest in subtrees of a hierarchical key space,
//! as subscribers (they apply changes) or publishers (they own and serve
//! data). A router drives transactions against every member with prepare,
//! optional precommit, then commit or abort. For each transaction the
//! member:
//! - matches the query against local registrations (shard index or scan)
//! - reconciles key depth and reroots payloads per registration
//! - runs the registration handlers for each phase, synchronously or with
//!   a deferred completion
//! - folds the per-match outcomes into one response code
//! - answers the router, including merged read results and diagnostics
//!
//! ## Response Aggregation
//!
//! | Rank | Code |
//! |------|------|
//! | highest | `ASYNC` |
//! | | `NACK` |
//! | | `ACK`, `INTERNAL` |
//! | | `NOT_APPLICABLE` |
//! | lowest | `NONE` |
//!
//! ## Module Structure
//!
//! ```text
//! databus-member/
//! ├── domain/          # Keys, registrations, queries, transactions
//! ├── algorithms/      # Rerooting, shard index, matching, aggregation
//! ├── events/          # Router messages and member commands
//! ├── ports/           # RouterApi, MemberApi, RegistrationHandler, RouterSink
//! ├── service/         # Member engine, state machine, responder, stores
//! └── adapters/        # Tokio runtime, channel router sink
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{ChannelRouterSink, MemberHandle, MemberRuntime};
pub use algorithms::{
    aggregate_codes, collect_read_results, deep_merge, find_matches, reroot_down, reroot_up,
    CandidateSource, Lookup, ReadResults, Shard,
};
pub use config::{MemberConfig, MemberConfigBuilder, MAX_QUEUE_CAPACITY};
pub use domain::{
    Action, Block, BlockId, Category, DebugOptions, Key, MatchId, MatchInfo, MemberAddress,
    MemberState, PathElement, Query, QueryFlags, QuerySpec, RegFlags, Registration,
    RegistrationHandle, RegistrationId, RegistrationRequest, RequestId, ResponseCode,
    SchemaDescriptor, SchemaStep, Transaction, TransactionId,
};
pub use error::{
    ConfigError, KeyError, MatchError, MemberError, RegistrationError, RerootError,
    TransportError,
};
pub use events::{
    BlockMsg, BlockResult, DebugReport, MemberCommand, QueryResult, RequestHeader,
    ResultMessage, RouterRequest, TransactionMsg, XactEvent,
};
pub use metrics::{MemberStats, Metrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics};
pub use ports::{
    AckHandler, CallbackContext, CompletionHandle, MemberApi, MockHandler, Phase,
    PrepareContext, RegistrationHandler, RouterApi, RouterSink,
};
pub use service::{hop_label, Member, RegistrationStore, TransactionStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
