//! # Router Responder
//!
//! Builds `ResultMessage`s from transaction state and hands them to the
//! router sink. Responses to prepare may be deferred onto the member's
//! queue so that they leave after the work already scheduled.

use crate::algorithms::aggregate::collect_read_results;
use crate::domain::key::Key;
use crate::domain::query::{Action, BlockId, QueryFlags};
use crate::domain::response::ResponseCode;
use crate::domain::transaction::{
    MemberState, NewBlockState, RequestId, Transaction, TransactionId,
};
use crate::error::{MemberError, TransportError};
use crate::events::commands::{MemberCommand, XactEvent};
use crate::events::requests::RequestHeader;
use crate::events::responses::{BlockResult, DebugReport, QueryResult, ResultMessage};
use crate::service::member::Member;
use tracing::debug;
use uuid::Uuid;

impl Member {
    /// Answer `header` with `code`, now or from the queue.
    pub(crate) fn respond_router(
        &mut self,
        xact_id: TransactionId,
        code: ResponseCode,
        header: RequestHeader,
        immediate: bool,
    ) -> Result<(), MemberError> {
        if immediate {
            return self.send_result(xact_id, &header, code);
        }
        let xact = self.xacts.require(xact_id)?;
        xact.hold();
        if self
            .queue
            .send(MemberCommand::SendResponse {
                xact_id,
                header,
                code,
            })
            .is_err()
        {
            xact.release();
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }

    /// Build and deliver the result for one router request.
    pub(crate) fn send_result(
        &mut self,
        xact_id: TransactionId,
        header: &RequestHeader,
        code: ResponseCode,
    ) -> Result<(), MemberError> {
        let hop = hop_label(&self.config.name, self.instance);
        let xact = self.xacts.require(xact_id)?;
        let mut result = ResultMessage::bare(xact_id, header.request_id, code);
        let mut errors = Vec::new();

        if xact.member_state.past_prepare() {
            for q in xact.queries_mut() {
                q.responded = true;
            }
        } else {
            for block in xact
                .new_blocks
                .iter_mut()
                .filter(|b| b.state == NewBlockState::Notify)
            {
                result.new_blocks.push(block.id);
                block.state = NewBlockState::Notified;
            }
            result.block_result = Some(build_block_result(xact, header.request_id, code, &mut errors));
        }

        if header.debug.any() {
            let traceroute = if header.debug.traceroute {
                traceroute(&hop, xact, code)
            } else {
                Vec::new()
            };
            let errors = if header.debug.error_report {
                errors
            } else {
                Vec::new()
            };
            result.debug = Some(DebugReport { traceroute, errors });
        }

        xact.responses_sent += 1;
        let end = !xact.ended
            && xact.member_state == MemberState::Prepare
            && xact.all_responded()
            && xact.queries().all(|q| {
                !matches!(
                    q.response_code,
                    ResponseCode::NotApplicable | ResponseCode::Async
                )
            });

        debug!(
            xact_id = %xact_id,
            "[member:{}] Result for {} request {}: {}",
            self.config.name, xact_id, header.request_id.0, code
        );
        self.deliver(&header.route, result)?;

        if end {
            self.xact_run(xact_id, XactEvent::End)?;
        }
        Ok(())
    }
}

/// Per-query results for the queries answered on `request_id`.
fn build_block_result(
    xact: &mut Transaction,
    request_id: RequestId,
    aggregate: ResponseCode,
    errors: &mut Vec<String>,
) -> BlockResult {
    let block_id = xact.blocks.first().map_or(BlockId(1), |b| b.id);
    let mut results = Vec::new();

    for q in xact.queries_mut().filter(|q| q.request_id == request_id) {
        let code = if q.response_code == ResponseCode::None {
            aggregate
        } else {
            q.response_code
        };
        errors.extend(q.errors.iter().cloned());

        let mut entries = Vec::new();
        if code.is_final() {
            match q.key.parse::<Key>() {
                Ok(query_key) => {
                    let stream = q.action != Action::Read || q.flags.contains(QueryFlags::STREAM);
                    let collected = collect_read_results(&query_key, &q.matches, stream);
                    errors.extend(collected.errors);
                    entries = collected.entries;
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        if entries.is_empty() {
            results.push(QueryResult {
                index: q.index,
                correlation_id: q.correlation_id,
                code,
                key: None,
                payload: None,
            });
        }
        for (key, payload) in entries {
            results.push(QueryResult {
                index: q.index,
                correlation_id: q.correlation_id,
                code,
                key: Some(key.to_string()),
                payload: Some(payload),
            });
        }

        for m in q.matches.iter_mut() {
            m.sent_response = m.response;
        }
        if code.is_final() {
            q.responded = true;
        }
    }

    BlockResult { block_id, results }
}

/// This member's hop followed by one line per match.
fn traceroute(hop: &str, xact: &Transaction, code: ResponseCode) -> Vec<String> {
    let mut hops = vec![format!("{} {} {}", hop, xact.member_state, code)];
    for q in xact.queries() {
        for m in &q.matches {
            hops.push(format!(
                "{} {} {} {}",
                hop,
                m.registration_id(),
                m.key,
                m.response
            ));
        }
    }
    hops
}

/// Hop label for a member instance.
pub fn hop_label(name: &str, instance: Uuid) -> String {
    format!("{}@{}", name, instance)
}
