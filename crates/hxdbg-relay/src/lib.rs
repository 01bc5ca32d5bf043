//! hxdbg-relay: the relay coordinator.
//! Accepts records from any number of capture sources, queues and
//! rate-limits them, and dispatches each to the panel subscribed for its
//! source. Keeps every subscription alive with a periodic liveness signal
//! and purges subscriptions whose channel has gone away.
//!
//! Everything here is synchronous and single-owner; the runtime crate
//! hosts one [`Coordinator`] inside one task.

pub mod channel;
pub mod coordinator;
pub mod dispatch;
pub mod liveness;
pub mod queue;
pub mod registry;
pub mod reply;
pub mod stats;

pub use channel::{MemoryChannel, PanelChannel};
pub use coordinator::{Coordinator, TickReport};
pub use reply::ReplyHandle;
pub use stats::RelayStats;

pub use hxdbg_core::types;
