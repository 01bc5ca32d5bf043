//! hxdbg-core: shared wire types, error taxonomy, tunables, and clock.
//! Pure library consumed by the relay, capture, panel, and runtime crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CaptureConfig, PanelConfig, RelayConfig, Settings};
pub use error::{ConfigError, RelayError, TransportError};
pub use types::{
    Ack, AckStatus, ChannelId, EventRecord, MessageClass, PanelMessage, PanelRequest, SourceId,
    Submission,
};
