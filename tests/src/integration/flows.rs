//! # Transaction Flows
//!
//! Router-driven transaction lifecycles against a running member:
//!
//! 1. **Prepare → Commit**: write matched by a caching subscriber
//! 2. **Deferred prepare**: handler completes from another task
//! 3. **Read**: publisher results merged at the query key
//! 4. **Prepare → Precommit → Abort**: a participant votes NACK
//! 5. **Not applicable**: nothing local matches, nothing is kept

#[cfg(test)]
mod tests {
    use crate::integration::support::{header, TestBus};
    use databus_member::{
        Action, MemberApi, MockHandler, Phase, PrepareContext, QuerySpec, RegFlags,
        RegistrationHandler, RegistrationRequest, ResponseCode, RouterApi, TransactionId,
        TransactionMsg,
    };
    use rand::Rng;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// Defers every prepare and answers from a spawned task.
    struct DeferringHandler {
        delay: Duration,
    }

    impl RegistrationHandler for DeferringHandler {
        fn prepare(&self, ctx: &mut PrepareContext<'_>) -> ResponseCode {
            let handle = ctx.defer();
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = handle.complete_with_data(ResponseCode::Ack, json!({ "applied": true }));
            });
            ResponseCode::Async
        }
    }

    // =========================================================================
    // PREPARE → COMMIT
    // =========================================================================

    #[tokio::test]
    async fn test_create_under_cached_subscription_commits() {
        let mut bus = TestBus::start("flow-commit");
        let handler = Arc::new(MockHandler::new(ResponseCode::Ack));
        bus.handle
            .register(
                RegistrationRequest::new("/colony[name=c1]", RegFlags::SUBSCRIBER | RegFlags::CACHE),
                handler.clone(),
            )
            .await
            .unwrap();

        let xact_id = TransactionId(100);
        let query = QuerySpec::new(Action::Create, "/colony[name=c1]/bundle-ether[name=be1]")
            .with_payload(json!({ "mtu": 9000 }));
        bus.handle
            .prepare(header(1), TransactionMsg::single(xact_id, query))
            .await
            .unwrap();

        let result = bus.next_result().await;
        assert_eq!(result.xact_id, xact_id);
        assert_eq!(result.code, ResponseCode::Ack);

        let prepares: Vec<_> = handler
            .calls()
            .into_iter()
            .filter(|c| c.phase == Phase::Prepare)
            .collect();
        assert_eq!(prepares.len(), 1);
        assert_eq!(prepares[0].action, Some(Action::Create));
        assert_eq!(
            prepares[0].payload,
            Some(json!({ "bundle-ether": [{ "name": "be1", "mtu": 9000 }] }))
        );

        bus.handle.commit(header(2), xact_id).await.unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);

        let unused = TransactionId(rand::thread_rng().gen_range(1_000_000..u64::MAX));
        bus.handle.commit(header(3), unused).await.unwrap();
        let result = bus.next_result().await;
        assert_eq!(result.xact_id, unused);
        assert_eq!(result.code, ResponseCode::Nack);

        let stats = bus.handle.stats().await.unwrap();
        assert_eq!(stats.transactions, 0);
        assert_eq!(stats.metrics.unknown_xact_nacks, 1);
        assert_eq!(stats.metrics.matches, 1);
    }

    // =========================================================================
    // DEFERRED PREPARE
    // =========================================================================

    #[tokio::test]
    async fn test_deferred_prepare_answers_once_completed() {
        let mut bus = TestBus::start("flow-async");
        bus.handle
            .register(
                RegistrationRequest::new("/a", RegFlags::SUBSCRIBER),
                Arc::new(DeferringHandler {
                    delay: Duration::from_millis(20),
                }),
            )
            .await
            .unwrap();

        let xact_id = TransactionId(200);
        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(xact_id, QuerySpec::new(Action::Update, "/a")),
            )
            .await
            .unwrap();

        let result = bus.next_result().await;
        assert_eq!(result.code, ResponseCode::Ack);
        assert_eq!(result.results()[0].payload, Some(json!({ "applied": true })));

        bus.handle.commit(header(2), xact_id).await.unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);
        assert_eq!(bus.handle.metrics().snapshot().async_deferrals, 1);
    }

    #[tokio::test]
    async fn test_abort_while_deferred_drops_late_completion() {
        let mut bus = TestBus::start("flow-async-abort");
        bus.handle
            .register(
                RegistrationRequest::new("/a", RegFlags::SUBSCRIBER),
                Arc::new(DeferringHandler {
                    delay: Duration::from_millis(100),
                }),
            )
            .await
            .unwrap();

        let xact_id = TransactionId(201);
        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(xact_id, QuerySpec::new(Action::Update, "/a")),
            )
            .await
            .unwrap();
        bus.handle.abort(header(2), xact_id).await.unwrap();

        let result = bus.next_result().await;
        assert_eq!(result.request_id.0, 2);
        assert_eq!(result.code, ResponseCode::Ack);

        tokio::time::sleep(Duration::from_millis(150)).await;
        bus.assert_silent().await;
        assert_eq!(bus.handle.stats().await.unwrap().transactions, 0);
    }

    // =========================================================================
    // READ
    // =========================================================================

    #[tokio::test]
    async fn test_read_merges_publisher_results() {
        let mut bus = TestBus::start("flow-read");
        for (name, mtu) in [("be1", 1500), ("be2", 9000)] {
            bus.handle
                .register(
                    RegistrationRequest::new(
                        format!("/colony[name=c1]/bundle-ether[name={}]", name),
                        RegFlags::PUBLISHER,
                    ),
                    Arc::new(MockHandler::new(ResponseCode::Ack).with_result(json!({ "mtu": mtu }))),
                )
                .await
                .unwrap();
        }

        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(
                    TransactionId(300),
                    QuerySpec::new(Action::Read, "/colony[name=c1]"),
                ),
            )
            .await
            .unwrap();

        let result = bus.next_result().await;
        assert_eq!(result.code, ResponseCode::Ack);
        let results = result.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.as_deref(), Some("/colony[name=c1]"));
        assert_eq!(
            results[0].payload,
            Some(json!({
                "bundle-ether": [
                    { "name": "be1", "mtu": 1500 },
                    { "name": "be2", "mtu": 9000 }
                ]
            }))
        );

        // Reads finish at prepare.
        assert_eq!(bus.handle.stats().await.unwrap().transactions, 0);
    }

    // =========================================================================
    // PREPARE → PRECOMMIT → ABORT
    // =========================================================================

    #[tokio::test]
    async fn test_precommit_veto_then_abort() {
        let mut bus = TestBus::start("flow-3pc");
        let agrees = Arc::new(MockHandler::new(ResponseCode::Ack));
        let vetoes =
            Arc::new(MockHandler::new(ResponseCode::Ack).with_precommit(ResponseCode::Nack));
        for handler in [agrees.clone(), vetoes.clone()] {
            bus.handle
                .register(RegistrationRequest::new("/a", RegFlags::SUBSCRIBER), handler)
                .await
                .unwrap();
        }

        let xact_id = TransactionId(400);
        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(
                    xact_id,
                    QuerySpec::new(Action::Update, "/a").with_payload(json!({ "x": 1 })),
                ),
            )
            .await
            .unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);

        bus.handle.precommit(header(2), xact_id).await.unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Nack);

        bus.handle.abort(header(3), xact_id).await.unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);

        // Repeated abort on a finished transaction: it is gone.
        bus.handle.abort(header(4), xact_id).await.unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Nack);

        for handler in [&agrees, &vetoes] {
            assert_eq!(
                handler.phases(),
                vec![Phase::RegReady, Phase::Prepare, Phase::Precommit, Phase::Abort]
            );
        }
    }

    // =========================================================================
    // NOT APPLICABLE
    // =========================================================================

    #[tokio::test]
    async fn test_unmatched_prepare_leaves_nothing_behind() {
        let mut bus = TestBus::start("flow-na");
        bus.handle
            .register(
                RegistrationRequest::new("/a", RegFlags::SUBSCRIBER),
                Arc::new(MockHandler::new(ResponseCode::Ack)),
            )
            .await
            .unwrap();

        let xact_id = TransactionId(500);
        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(xact_id, QuerySpec::new(Action::Delete, "/b")),
            )
            .await
            .unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::NotApplicable);

        bus.handle.commit(header(2), xact_id).await.unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Nack);
    }
}
