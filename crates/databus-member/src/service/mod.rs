//! # Service Layer
//!
//! The member engine and the stores it owns.
//!
//! - `member` - command dispatch and registration management
//! - `state_machine` - per-transaction protocol handling
//! - `responder` - result assembly and delivery to the router
//! - `registry` - registrations plus shard index
//! - `xact_store` - in-flight transactions

pub mod member;
pub mod registry;
pub mod responder;
pub mod state_machine;
pub mod xact_store;

pub use member::Member;
pub use registry::RegistrationStore;
pub use responder::hop_label;
pub use xact_store::TransactionStore;
