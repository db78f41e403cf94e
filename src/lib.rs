//! # vizrelay
//!
//! `vizrelay` bridges a robotics middleware to browser visualization clients
//! over WebSockets. Clients discover topics, subscribe and unsubscribe as
//! panels open and close, and receive each topic re-encoded into a binary or
//! JSON frame, routed only to the connections that asked for it.
//!
//! ## Core Modules
//!
//! - `catalog`: message type name to wire framing and schema codec; need kinds.
//! - `directory`: the table of known topics, refreshed from meta-info queries.
//! - `middleware`: the adapter contract and an in-process implementation.
//! - `relay`: reference-counted subscriptions, the connection registry and the
//!   dispatch loop that fans deliveries out.
//! - `transport`: frame formats, the control protocol and the WebSocket server.
//! - `client`: the topic resolver and a WebSocket client session.
//! - `config`: layered settings loading.
//! - `utils`: error types and logging setup.

pub mod catalog;
pub mod client;
pub mod config;
pub mod directory;
pub mod middleware;
pub mod relay;
pub mod transport;
pub mod utils;
