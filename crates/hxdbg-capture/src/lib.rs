//! hxdbg-capture: page-side capture of htmx lifecycle events.
//!
//! The host (a page adapter or the `hxdbg emit` command) feeds DOM
//! snapshots into a [`CaptureAgent`]; the agent decides what to send to the
//! relay and when to probe the connection. Nothing here performs IO or
//! reads a clock: every call takes `now_ms`.

pub mod agent;
pub mod connection;
pub mod descriptor;
pub mod dom;
pub mod error;
pub mod instrument;
pub mod kinds;
pub mod valves;

pub use agent::{CaptureAction, CaptureAgent, CaptureDecision, CaptureStats, ProcessEntry};
pub use connection::{ConnectionMachine, LinkState};
pub use dom::{DomAttribute, DomElement, RawDetail, RawEvent, XhrSnapshot};
pub use error::CaptureError;
pub use valves::{CircuitBreaker, VolumeCap};
