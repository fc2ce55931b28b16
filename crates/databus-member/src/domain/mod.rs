//! # Domain Module
//!
//! Core types of the member engine: keys, registrations, queries,
//! transactions, matches and response codes.

pub mod invariants;
pub mod key;
pub mod match_info;
pub mod query;
pub mod registration;
pub mod response;
pub mod schema;
pub mod transaction;

pub use invariants::*;
pub use key::*;
pub use match_info::*;
pub use query::*;
pub use registration::*;
pub use response::*;
pub use schema::*;
pub use transaction::*;
