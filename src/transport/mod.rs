//! The `transport` module carries everything that crosses the WebSocket.
//!
//! It defines the control protocol clients speak to the relay, the data frame
//! formats the relay fans out, and the WebSocket server itself. The server
//! only produces [`TransportEvent`](crate::relay::TransportEvent)s; all
//! subscription state lives in the relay.

pub mod frame;
pub mod message;
pub mod websocket;
