//! The `client` module is the browser side of the relay, in Rust.
//!
//! [`TopicResolver`] matches UI needs to live topics and decides what to
//! subscribe; [`RelayClient`] carries those requests over a WebSocket session
//! and decodes what comes back.

pub mod resolver;
pub mod session;

pub use resolver::{Selection, SubscriptionSink, TopicResolver};
pub use session::{InboundFrame, RelayClient, decode_inbound};

#[cfg(test)]
mod tests;
