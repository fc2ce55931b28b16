//! # Algorithms
//!
//! - `reroot` - moving payloads between depths of the namespace
//! - `shard` - path-element index over registrations
//! - `matching` - query to registration matching with depth reconciliation
//! - `aggregate` - response folding and read result assembly

pub mod aggregate;
pub mod matching;
pub mod reroot;
pub mod shard;

pub use aggregate::{aggregate_codes, collect_read_results, ReadResults};
pub use matching::{find_matches, CandidateSource, Lookup};
pub use reroot::{deep_merge, reroot_down, reroot_up};
pub use shard::Shard;
