//! Error types for the member transaction engine.
//!
//! Errors never cross the router boundary raw: matching and parsing failures
//! are folded into a `ResponseCode` on the triggering query, and only
//! `MemberError::Unsupported` is treated as fatal by the runtime.

use crate::domain::{RegistrationId, TransactionId};
use thiserror::Error;

/// Key parse and usage errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Empty key")]
    Empty,

    #[error("Key must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("Empty path element at position {position}")]
    EmptyElement { position: usize },

    #[error("Invalid character {found:?} in element name at position {position}")]
    InvalidName { position: usize, found: char },

    #[error("Unterminated predicate in element {element}")]
    UnterminatedPredicate { element: String },

    #[error("Malformed predicate [{predicate}] in element {element}")]
    MalformedPredicate { element: String, predicate: String },

    #[error("Duplicate predicate {name} in element {element}")]
    DuplicatePredicate { element: String, name: String },

    #[error("Wildcards are not allowed on write queries: {0}")]
    WildcardOnWrite(String),

    #[error("Key {key} does not conform to schema {type_name}: {reason}")]
    SchemaMismatch {
        key: String,
        type_name: String,
        reason: String,
    },
}

/// Errors moving payloads between key depths.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RerootError {
    /// Rerooting upward must synthesize list entries, so every predicate must be concrete.
    #[error("Cannot reroot across wildcard element {0}")]
    WildcardInPath(String),

    #[error("Payload for list element {0} is not an object")]
    NotAnObject(String),

    #[error("Target depth {target} is deeper than key depth {depth}")]
    DepthOutOfRange { target: usize, depth: usize },
}

/// Failure of the matching pass for one query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Reroot(#[from] RerootError),
}

/// Registration API errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Invalid registration key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Conflicting schema under {key}: registered as {existing}, requested {requested}")]
    ConflictingSchema {
        key: String,
        existing: String,
        requested: String,
    },

    #[error("Key {0} already has an exclusive publisher")]
    AlreadyPublished(String),

    #[error("Invalid registration flags: {0}")]
    InvalidFlags(String),

    #[error("Registration not found: {0:?}")]
    NotFound(RegistrationId),
}

/// Router sink failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Router channel closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Configuration validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Member name cannot be empty")]
    EmptyName,

    #[error("Queue capacity out of range: {capacity} (must be between 1 and {max})")]
    QueueCapacity { capacity: usize, max: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Top-level member error.
#[derive(Debug, Error)]
pub enum MemberError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TransactionId),

    /// Input outside the engine's supported scope (one block, one query).
    /// Fatal: the runtime stops when it sees this.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Invalid state transition for {xact_id}: {from} -> {to}")]
    InvalidTransition {
        xact_id: TransactionId,
        from: String,
        to: String,
    },

    #[error("Member runtime stopped")]
    RuntimeStopped,
}

impl MemberError {
    /// Whether the runtime must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}
