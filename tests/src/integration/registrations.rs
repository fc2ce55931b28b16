//! # Registration Flows
//!
//! Registration lifecycle as seen through `MemberApi` while transactions
//! are running.

#[cfg(test)]
mod tests {
    use crate::integration::support::{header, TestBus};
    use databus_member::{
        Action, MemberApi, MemberError, MockHandler, QuerySpec, RegFlags, RegistrationError,
        RegistrationRequest, ResponseCode, RouterApi, SchemaDescriptor, SchemaStep,
        TransactionId, TransactionMsg,
    };
    use rand::seq::SliceRandom;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deregister_is_idempotent_and_stops_matching() {
        let mut bus = TestBus::start("reg-deregister");
        let reg = bus
            .handle
            .register(
                RegistrationRequest::new("/a", RegFlags::SUBSCRIBER),
                Arc::new(MockHandler::new(ResponseCode::Ack)),
            )
            .await
            .unwrap();

        assert!(bus.handle.deregister(&reg).await.unwrap());
        assert!(!bus.handle.deregister(&reg).await.unwrap());

        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(TransactionId(1), QuerySpec::new(Action::Update, "/a")),
            )
            .await
            .unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::NotApplicable);
        assert_eq!(bus.handle.stats().await.unwrap().registrations, 0);
    }

    #[tokio::test]
    async fn test_registration_outlives_deregister_while_matched() {
        let mut bus = TestBus::start("reg-pinned");
        let reg = bus
            .handle
            .register(
                RegistrationRequest::new("/a", RegFlags::SUBSCRIBER),
                Arc::new(MockHandler::new(ResponseCode::Ack)),
            )
            .await
            .unwrap();

        let xact_id = TransactionId(2);
        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(xact_id, QuerySpec::new(Action::Update, "/a")),
            )
            .await
            .unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);

        // Still referenced by the open transaction.
        assert!(bus.handle.deregister(&reg).await.unwrap());
        assert_eq!(bus.handle.stats().await.unwrap().registrations, 1);

        bus.handle.commit(header(2), xact_id).await.unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);
        assert_eq!(bus.handle.stats().await.unwrap().registrations, 0);
    }

    #[tokio::test]
    async fn test_audit_invalidated_by_live_write() {
        let mut bus = TestBus::start("reg-audit");
        let reg = bus
            .handle
            .register(
                RegistrationRequest::new("/colony[name=c1]", RegFlags::SUBSCRIBER | RegFlags::CACHE),
                Arc::new(MockHandler::new(ResponseCode::Ack)),
            )
            .await
            .unwrap();

        bus.handle.begin_audit(reg.id).await.unwrap();
        assert!(bus.handle.finish_audit(reg.id).await.unwrap());

        bus.handle.begin_audit(reg.id).await.unwrap();
        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(
                    TransactionId(3),
                    QuerySpec::new(Action::Update, "/colony[name=c1]"),
                ),
            )
            .await
            .unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Ack);
        assert!(!bus.handle.finish_audit(reg.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_conflicting_schema_rejected_across_handles() {
        let bus = TestBus::start("reg-schema");
        let schema = |type_name: &str| {
            SchemaDescriptor::new(type_name, vec![SchemaStep::list("colony", ["name"])])
        };
        bus.handle
            .register(
                RegistrationRequest::new("/colony[name=c1]", RegFlags::PUBLISHER)
                    .with_schema(schema("Colony")),
                Arc::new(MockHandler::new(ResponseCode::Ack)),
            )
            .await
            .unwrap();

        let other = bus.handle.clone();
        let err = other
            .register(
                RegistrationRequest::new("/colony[name=c1]", RegFlags::SUBSCRIBER)
                    .with_schema(schema("Tenant")),
                Arc::new(MockHandler::new(ResponseCode::Ack)),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MemberError::Registration(RegistrationError::ConflictingSchema { .. })
        ));
    }

    #[tokio::test]
    async fn test_response_stats_per_registration() {
        let mut bus = TestBus::start("reg-stats");
        let mut codes = vec![ResponseCode::Ack, ResponseCode::Nack];
        codes.shuffle(&mut rand::thread_rng());

        let mut ids = Vec::new();
        for code in &codes {
            let reg = bus
                .handle
                .register(
                    RegistrationRequest::new("/a", RegFlags::SUBSCRIBER),
                    Arc::new(MockHandler::new(*code)),
                )
                .await
                .unwrap();
            ids.push(reg.id);
        }

        bus.handle
            .prepare(
                header(1),
                TransactionMsg::single(TransactionId(4), QuerySpec::new(Action::Update, "/a")),
            )
            .await
            .unwrap();
        assert_eq!(bus.next_result().await.code, ResponseCode::Nack);

        let stats = bus.handle.stats().await.unwrap();
        for (id, code) in ids.iter().zip(&codes) {
            let (_, snapshot) = stats
                .registration_stats
                .iter()
                .find(|(reg_id, _)| reg_id == id)
                .unwrap();
            match code {
                ResponseCode::Ack => assert_eq!(snapshot.acks, 1),
                _ => assert_eq!(snapshot.nacks, 1),
            }
        }
    }
}
