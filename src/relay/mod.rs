pub mod dispatch;
pub mod engine;
pub mod registry;
pub mod subscription;

pub use dispatch::DispatchReport;
pub use engine::{Relay, TransportEvent};
pub use registry::{ConnectionId, ConnectionRegistry, SendOutcome, SubscribeOutcome};
pub use subscription::{AckOutcome, SubscriptionManager, SubscriptionState};
