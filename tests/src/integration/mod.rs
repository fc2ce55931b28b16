//! # Integration Flows
//!
//! Each flow spawns a member on the tokio runtime, plays the router side
//! through `RouterApi`, and reads results from a `ChannelRouterSink`.
//!
//! - `flows` - transaction lifecycles end to end
//! - `registrations` - deregistration, audits and stats seen from outside
//! - `logging` - structured fields on engine log events

pub mod flows;
pub mod logging;
pub mod registrations;

#[cfg(test)]
pub(crate) mod support {
    use databus_member::{
        ChannelRouterSink, MemberAddress, MemberConfigBuilder, MemberHandle, MemberRuntime,
        RequestHeader, RequestId, ResultMessage,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    pub const ROUTER: &str = "router-1";

    pub struct TestBus {
        pub handle: MemberHandle,
        pub results: UnboundedReceiver<(MemberAddress, ResultMessage)>,
    }

    impl TestBus {
        pub fn start(name: &str) -> Self {
            databus_telemetry::init_test_logging();
            let (sink, results) = ChannelRouterSink::new();
            let config = MemberConfigBuilder::new(name)
                .queue_capacity(32)
                .verify_with_scan(true)
                .build()
                .unwrap();
            let (handle, _task) = MemberRuntime::spawn(config, Arc::new(sink)).unwrap();
            Self { handle, results }
        }

        /// Next result, failing the test after one second.
        pub async fn next_result(&mut self) -> ResultMessage {
            let (route, result) = timeout(Duration::from_secs(1), self.results.recv())
                .await
                .expect("timed out waiting for a result")
                .expect("sink closed");
            assert_eq!(route, MemberAddress(ROUTER.to_string()));
            result
        }

        /// Assert nothing arrives within a short window.
        pub async fn assert_silent(&mut self) {
            let got = timeout(Duration::from_millis(50), self.results.recv()).await;
            assert!(got.is_err(), "unexpected result: {:?}", got);
        }
    }

    pub fn header(request: u64) -> RequestHeader {
        RequestHeader::new(RequestId(request), MemberAddress(ROUTER.to_string()))
    }
}
