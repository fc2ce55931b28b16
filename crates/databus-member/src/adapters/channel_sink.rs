//! In-process router sink backed by a tokio channel.

use crate::domain::transaction::MemberAddress;
use crate::error::TransportError;
use crate::events::responses::ResultMessage;
use crate::ports::outbound::RouterSink;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Forwards every result, with its route, to a receiver.
#[derive(Clone, Debug)]
pub struct ChannelRouterSink {
    tx: UnboundedSender<(MemberAddress, ResultMessage)>,
}

impl ChannelRouterSink {
    pub fn new() -> (Self, UnboundedReceiver<(MemberAddress, ResultMessage)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RouterSink for ChannelRouterSink {
    fn send_result(
        &self,
        route: &MemberAddress,
        result: ResultMessage,
    ) -> Result<(), TransportError> {
        self.tx
            .send((route.clone(), result))
            .map_err(|_| TransportError::Closed)
    }
}
