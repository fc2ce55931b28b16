//! # Response Codes
//!
//! Outcome classification shared by per-match results and the aggregate
//! answer returned to the router.
//!
//! Aggregation order: `ASYNC > NACK > ACK ≈ INTERNAL > NOT_APPLICABLE > NONE`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of a prepare/precommit step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResponseCode {
    /// Nothing recorded yet.
    #[default]
    None,
    /// Outcome pending; the handler will complete it later.
    Async,
    /// No local registration is affected.
    NotApplicable,
    /// Accepted.
    Ack,
    /// Rejected.
    Nack,
    /// Internal (member-originated) acknowledgement.
    Internal,
}

impl ResponseCode {
    /// Position in the aggregation order.
    pub fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::NotApplicable => 1,
            Self::Ack | Self::Internal => 2,
            Self::Nack => 3,
            Self::Async => 4,
        }
    }

    /// The higher-ranked of two codes. Ties keep `self`.
    #[must_use]
    pub fn fold(self, other: ResponseCode) -> ResponseCode {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Whether the code is a final decision.
    pub fn is_final(self) -> bool {
        !matches!(self, Self::None | Self::Async)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Async => "ASYNC",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Per-registration counters of the codes folded in.
#[derive(Debug, Default)]
pub struct ResponseStats {
    acks: AtomicU64,
    nacks: AtomicU64,
    asyncs: AtomicU64,
    not_applicable: AtomicU64,
    internal: AtomicU64,
}

impl ResponseStats {
    /// Count one code.
    pub fn record(&self, code: ResponseCode) {
        let counter = match code {
            ResponseCode::Ack => &self.acks,
            ResponseCode::Nack => &self.nacks,
            ResponseCode::Async => &self.asyncs,
            ResponseCode::NotApplicable => &self.not_applicable,
            ResponseCode::Internal => &self.internal,
            ResponseCode::None => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values.
    pub fn snapshot(&self) -> ResponseStatsSnapshot {
        ResponseStatsSnapshot {
            acks: self.acks.load(Ordering::Relaxed),
            nacks: self.nacks.load(Ordering::Relaxed),
            asyncs: self.asyncs.load(Ordering::Relaxed),
            not_applicable: self.not_applicable.load(Ordering::Relaxed),
            internal: self.internal.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `ResponseStats`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatsSnapshot {
    pub acks: u64,
    pub nacks: u64,
    pub asyncs: u64,
    pub not_applicable: u64,
    pub internal: u64,
}
