//! # Response Aggregation
//!
//! Folds per-match outcomes into one code and assembles read results.

use crate::algorithms::reroot::{deep_merge, reroot_down, reroot_up};
use crate::domain::key::Key;
use crate::domain::match_info::MatchInfo;
use crate::domain::response::ResponseCode;
use serde_json::Value;

/// Maximum of `codes` under the aggregation order. No codes at all is
/// `NOT_APPLICABLE`.
pub fn aggregate_codes<I>(codes: I) -> ResponseCode
where
    I: IntoIterator<Item = ResponseCode>,
{
    match codes.into_iter().fold(ResponseCode::None, ResponseCode::fold) {
        ResponseCode::None => ResponseCode::NotApplicable,
        code => code,
    }
}

/// Read data gathered from the matches of one query.
#[derive(Debug, Default)]
pub struct ReadResults {
    /// One `(key, payload)` per emitted result.
    pub entries: Vec<(Key, Value)>,
    /// Results that could not be rerooted.
    pub errors: Vec<String>,
}

/// Collect the data the handlers returned for a read.
///
/// Streaming reads emit one entry per match at the match's own key.
/// Otherwise every result is rerooted to the depth of the query key and
/// results landing on the same key are deep-merged.
pub fn collect_read_results(query_key: &Key, matches: &[MatchInfo], stream: bool) -> ReadResults {
    let mut out = ReadResults::default();

    for m in matches {
        let Some(data) = &m.result else { continue };

        if stream {
            out.entries.push((m.key.clone(), data.clone()));
            continue;
        }

        let q = query_key.depth();
        if m.key.depth() > q {
            match reroot_up(data, &m.key, q) {
                Ok(v) => push_merged(&mut out.entries, m.key.truncate(q), v),
                Err(e) => out.errors.push(format!("{}: {}", m.id, e)),
            }
        } else {
            for (k, v) in reroot_down(data, &m.key, query_key) {
                push_merged(&mut out.entries, k, v);
            }
        }
    }
    out
}

fn push_merged(entries: &mut Vec<(Key, Value)>, key: Key, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some((_, existing)) => deep_merge(existing, value),
        None => entries.push((key, value)),
    }
}
