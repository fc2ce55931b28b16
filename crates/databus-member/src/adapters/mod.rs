//! # Adapters
//!
//! - `runtime` - runs a member on its own tokio task behind a cloneable handle
//! - `channel_sink` - router sink that forwards results over a channel

pub mod channel_sink;
pub mod runtime;

pub use channel_sink::ChannelRouterSink;
pub use runtime::{MemberHandle, MemberRuntime};
