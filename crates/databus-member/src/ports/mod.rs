//! Ports Layer
//!
//! - Driving Ports (inbound) - router and application APIs
//! - Driven Ports (outbound) - registration handlers and the router sink

pub mod inbound;
pub mod outbound;

pub use inbound::{MemberApi, RouterApi};
pub use outbound::{
    AckHandler, CallbackContext, CompletionHandle, HandlerCall, MockHandler, Phase,
    PrepareContext, PrepareEffects, RegistrationHandler, RouterSink,
};
