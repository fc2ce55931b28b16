//! Transient pairing of one query with one registration.

use crate::domain::key::Key;
use crate::domain::registration::{Registration, RegistrationId};
use crate::domain::response::ResponseCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Match identifier, monotonic within one query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(pub u32);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match-{}", self.0)
    }
}

/// Result of matching one query against one registration.
///
/// Holds a strong reference to its registration until the owning
/// transaction is dropped.
#[derive(Clone)]
pub struct MatchInfo {
    pub id: MatchId,
    pub registration: Arc<Registration>,
    /// Key reconciled to the registration's depth.
    pub key: Key,
    /// The query key as received (may carry wildcards).
    pub original_key: Key,
    /// Concrete type of the registration, if known.
    pub type_name: Option<String>,
    /// Payload decoded/rerooted for the registration.
    pub payload: Option<Value>,
    /// Code last reported to the router for this match.
    pub sent_response: ResponseCode,
    /// Code recorded from the handler.
    pub response: ResponseCode,
    /// Read data returned by the handler, rooted at `key`.
    pub result: Option<Value>,
}

impl MatchInfo {
    pub fn new(
        id: MatchId,
        registration: Arc<Registration>,
        key: Key,
        original_key: Key,
        payload: Option<Value>,
    ) -> Self {
        let type_name = registration.type_name().map(str::to_string);
        Self {
            id,
            registration,
            key,
            original_key,
            type_name,
            payload,
            sent_response: ResponseCode::None,
            response: ResponseCode::None,
            result: None,
        }
    }

    pub fn registration_id(&self) -> RegistrationId {
        self.registration.id()
    }

    /// The handler has not answered yet.
    pub fn is_pending(&self) -> bool {
        self.response == ResponseCode::Async
    }
}

impl fmt::Debug for MatchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchInfo")
            .field("id", &self.id)
            .field("registration", &self.registration.id())
            .field("key", &self.key.to_string())
            .field("original_key", &self.original_key.to_string())
            .field("response", &self.response)
            .finish()
    }
}
