//! # Structured Logging
//!
//! Engine log events carry `xact_id` and `reg_id` fields that log pipelines
//! can filter on.

#[cfg(test)]
mod tests {
    use crate::integration::support::{header, TestBus};
    use databus_member::{
        Action, MemberApi, MockHandler, QuerySpec, RegFlags, RegistrationRequest, ResponseCode,
        RouterApi, TransactionId, TransactionMsg,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Field names of every event seen on this thread.
    #[derive(Clone, Default)]
    struct FieldRecorder {
        events: Arc<Mutex<Vec<Vec<&'static str>>>>,
    }

    impl FieldRecorder {
        fn saw(&self, field: &str) -> bool {
            self.events.lock().iter().any(|names| names.contains(&field))
        }
    }

    impl<S: Subscriber> Layer<S> for FieldRecorder {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let names = event.fields().map(|f| f.name()).collect();
            self.events.lock().push(names);
        }
    }

    #[tokio::test]
    async fn test_engine_logs_carry_ids() {
        let recorder = FieldRecorder::default();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(recorder.clone()),
        );

        let mut bus = TestBus::start("log-fields");
        bus.handle
            .register(
                RegistrationRequest::new("/a", RegFlags::SUBSCRIBER),
                Arc::new(MockHandler::new(ResponseCode::Ack)),
            )
            .await
            .unwrap();
        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(TransactionId(600), QuerySpec::new(Action::Update, "/a")),
            )
            .await
            .unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);
        bus.handle.commit(header(2), TransactionId(600)).await.unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);

        assert!(recorder.saw("xact_id"));
        assert!(recorder.saw("reg_id"));
    }
}
