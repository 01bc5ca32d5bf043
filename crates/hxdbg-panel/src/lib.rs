//! hxdbg-panel: the inspector side of the relay.
//!
//! A [`PanelSession`] tracks one tab's subscription and liveness and folds
//! relayed lifecycle events into a [`GroupedLog`] that can be filtered,
//! searched, and rendered as text.

pub mod filter;
pub mod log;
pub mod render;
pub mod session;

pub use filter::{EventFilter, VisibleGroup};
pub use log::{FoldOutcome, GroupedLog, GroupedLogEntry, LogGroup};
pub use render::{RenderOptions, render_groups};
pub use session::{ConnectionStatus, Note, NoteLevel, PanelSession, SessionUpdate};
