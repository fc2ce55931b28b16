//! # Matching Engine
//!
//! Finds the registrations an incoming query affects and reconciles the
//! query key and payload to each registration's depth.
//!
//! ## Reconciliation
//!
//! With `q` the query depth and `d` the registration depth:
//!
//! | Action        | `d <= q`                                  | `d > q`                                    |
//! |---------------|-------------------------------------------|--------------------------------------------|
//! | READ          | query truncated to `d`, payload rerooted up | registration key, payload rerooted down   |
//! | DELETE        | query key (payload only when `d == q`)    | registration key, no payload               |
//! | CREATE/UPDATE | query truncated to `d`, payload rerooted up | one match per rerooted sub-payload        |
//! | RPC           | `d == q` only                             | never                                      |

use crate::algorithms::reroot::{reroot_down, reroot_up};
use crate::domain::invariants::invariant_pending_matched_by_reads_only;
use crate::domain::key::Key;
use crate::domain::match_info::MatchInfo;
use crate::domain::query::{target_role, Action, Query, QueryFlags};
use crate::domain::registration::{RegFlags, Registration, Role};
use crate::error::{KeyError, MatchError};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where candidate registrations come from.
pub trait CandidateSource {
    /// No registrations at all.
    fn is_empty(&self) -> bool;

    /// Candidates of `role` found through the shard index, in store order.
    fn shard_candidates(&self, key: &Key, role: Role) -> Vec<Arc<Registration>>;

    /// Every registration the store holds, in store order.
    fn scan(&self) -> Vec<Arc<Registration>>;
}

/// Candidate lookup strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Walk the shard index.
    Shard,
    /// Scan the whole store.
    Scan,
    /// Walk the shard index and cross-check it against a scan.
    Verify,
}

/// Match `query` against the registrations of `source`, appending one
/// `MatchInfo` per accepted pairing to `query.matches`.
///
/// Returns the number of matches added. An empty store yields zero; the
/// caller reports that as `NOT_APPLICABLE`.
pub fn find_matches<S: CandidateSource + ?Sized>(
    source: &S,
    query: &mut Query,
    lookup: Lookup,
) -> Result<usize, MatchError> {
    if source.is_empty() {
        return Ok(0);
    }

    let key: Key = query.key.parse()?;
    if query.action.requires_concrete_key() && key.has_wildcards() {
        return Err(KeyError::WildcardOnWrite(query.key.clone()).into());
    }

    let role = target_role(query.action, query.flags);
    let candidates = candidates(source, &key, role, lookup);

    // Nothing is attached to the query unless every candidate reconciles.
    let mut accepted: Vec<(Arc<Registration>, Vec<(Key, Option<Value>)>)> = Vec::new();
    for reg in candidates {
        if !accepts(&reg, query, &key, role) {
            continue;
        }

        let reconciled = reconcile(&reg, query, &key)?;
        if reconciled.is_empty() {
            continue;
        }
        accepted.push((reg, reconciled));

        if query.flags.contains(QueryFlags::ANYCAST) {
            break;
        }
    }

    let mut added = 0;
    for (reg, reconciled) in accepted {
        if query.action.is_write() && reg.invalidate_audit() {
            debug!(reg_id = %reg.id(), key = %key, "write invalidated audit");
        }
        for (match_key, payload) in reconciled {
            let id = query.next_match_id();
            query.matches.push(MatchInfo::new(
                id,
                Arc::clone(&reg),
                match_key,
                key.clone(),
                payload,
            ));
            added += 1;
        }
    }

    debug!(
        xact_id = %query.xact_id,
        key = %key,
        action = %query.action,
        matches = added,
        "matching done"
    );
    Ok(added)
}

fn candidates<S: CandidateSource + ?Sized>(
    source: &S,
    key: &Key,
    role: Role,
    lookup: Lookup,
) -> Vec<Arc<Registration>> {
    match lookup {
        Lookup::Shard => source.shard_candidates(key, role),
        Lookup::Scan => scan_candidates(source, key, role),
        Lookup::Verify => {
            let indexed = source.shard_candidates(key, role);
            let scanned = scan_candidates(source, key, role);
            let a: BTreeSet<_> = indexed.iter().map(|r| r.id()).collect();
            let b: BTreeSet<_> = scanned.iter().map(|r| r.id()).collect();
            if a != b {
                warn!(
                    key = %key,
                    shard = ?a,
                    scan = ?b,
                    "shard index disagrees with store scan"
                );
            }
            scanned
        }
    }
}

/// Scan results restricted to what the shard index would have returned:
/// registrations of the role whose keys intersect.
fn scan_candidates<S: CandidateSource + ?Sized>(
    source: &S,
    key: &Key,
    role: Role,
) -> Vec<Arc<Registration>> {
    source
        .scan()
        .into_iter()
        .filter(|r| r.role() == role && r.key().intersects(key))
        .collect()
}

/// Category, role and lifecycle filters.
fn accepts(reg: &Registration, query: &Query, key: &Key, role: Role) -> bool {
    if !reg.category().compatible(query.category) {
        return false;
    }
    if reg.role() != role {
        return false;
    }
    if query.flags.contains(QueryFlags::SUBSCRIBER_READ)
        && query.action == Action::Read
        && !reg.flags().contains(RegFlags::CACHE)
    {
        return false;
    }
    if !invariant_pending_matched_by_reads_only(reg, query.action) {
        return false;
    }
    reg.key().intersects(key)
}

/// Per-action key and payload reconciliation. An empty result means the
/// registration is not affected.
fn reconcile(
    reg: &Registration,
    query: &Query,
    key: &Key,
) -> Result<Vec<(Key, Option<Value>)>, MatchError> {
    let q = key.depth();
    let d = reg.depth();
    let payload = query.payload.as_ref();

    let pairs = match query.action {
        Action::Read => {
            if !depth_accepts(reg.flags(), q, d) {
                return Ok(Vec::new());
            }
            if d <= q {
                let Some(k) = key.truncate(d).merge(reg.key()) else {
                    return Ok(Vec::new());
                };
                let p = match payload {
                    Some(p) => Some(reroot_up(p, key, d)?),
                    None => None,
                };
                vec![(k, p)]
            } else {
                let Some(k) = reg.key().merge(key) else {
                    return Ok(Vec::new());
                };
                let p = payload.and_then(|p| {
                    reroot_down(p, key, &k).into_iter().next().map(|(_, v)| v)
                });
                vec![(k, p)]
            }
        }
        Action::Delete => {
            let Some(k) = key.merge(reg.key()) else {
                return Ok(Vec::new());
            };
            let p = if d == q { payload.cloned() } else { None };
            vec![(k, p)]
        }
        Action::Create | Action::Update => {
            if d == q {
                if let Some(schema) = reg.schema() {
                    if let Err(e) = key.narrow(schema) {
                        debug!(reg_id = %reg.id(), error = %e, "schema mismatch, skipped");
                        return Ok(Vec::new());
                    }
                }
                vec![(key.clone(), payload.cloned())]
            } else if d > q {
                let Some(p) = payload else {
                    return Ok(Vec::new());
                };
                reroot_down(p, key, reg.key())
                    .into_iter()
                    .map(|(k, v)| (k, Some(v)))
                    .collect()
            } else {
                let p = match payload {
                    Some(p) => Some(reroot_up(p, key, d)?),
                    None => None,
                };
                vec![(key.truncate(d), p)]
            }
        }
        Action::Rpc => {
            if d != q {
                return Ok(Vec::new());
            }
            vec![(key.clone(), payload.cloned())]
        }
    };
    Ok(pairs)
}

/// `DEPTH_ONE` and `DEPTH_LISTS` restrictions for reads.
fn depth_accepts(flags: RegFlags, q: usize, d: usize) -> bool {
    if flags.contains(RegFlags::DEPTH_ONE) {
        q == d
    } else if flags.contains(RegFlags::DEPTH_LISTS) {
        q == d || q == d + 1
    } else {
        true
    }
}
