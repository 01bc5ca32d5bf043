//! Routing decision for one queued record.
//!
//! Pure function of the record's class and whether it carries a source id.
//! Resolving the target channel happens later, against the registry as it
//! stands when the entry is processed.

use hxdbg_core::error::RelayError;
use hxdbg_core::types::{EventRecord, MessageClass, PanelMessage, SourceId, is_relay_only_kind};

/// Where a record goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Deliver to the subscription registered for this source only.
    ToSource(SourceId, Shape),
    /// Deliver to every live subscription.
    Broadcast(Shape),
    /// Acknowledge and stop here.
    Consume(ConsumeReason),
}

/// How the record is presented to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Unwrapped and re-tagged as `HTMX_EVENT_FOR_PANEL`.
    Lifecycle,
    AsIs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeReason {
    /// Capture source proving reachability.
    SelfTest,
    /// Probe addressed to the relay itself.
    LivenessProbe,
}

pub fn route(class: MessageClass, source_id: Option<SourceId>) -> Route {
    match (class, source_id) {
        (MessageClass::SelfTest, _) => Route::Consume(ConsumeReason::SelfTest),
        (MessageClass::LivenessProbe, _) => Route::Consume(ConsumeReason::LivenessProbe),
        (MessageClass::Lifecycle, Some(id)) => Route::ToSource(id, Shape::Lifecycle),
        (MessageClass::Lifecycle, None) => Route::Broadcast(Shape::Lifecycle),
        (MessageClass::Test | MessageClass::Other, Some(id)) => Route::ToSource(id, Shape::AsIs),
        (MessageClass::Test | MessageClass::Other, None) => Route::Broadcast(Shape::AsIs),
    }
}

/// Build the panel message for a routed record. `source_id` is the id
/// resolved at dispatch time.
pub fn shape(
    record: EventRecord,
    shape: Shape,
    source_id: Option<SourceId>,
) -> Result<PanelMessage, RelayError> {
    if record.kind.trim().is_empty() {
        return Err(RelayError::EmptyKind);
    }
    match shape {
        Shape::Lifecycle => {
            if record.payload.is_null() {
                return Err(RelayError::MalformedRecord {
                    kind: record.kind,
                    reason: "lifecycle record carries no data".to_owned(),
                });
            }
            Ok(PanelMessage::HtmxEvent {
                source_id,
                data: record.payload,
            })
        }
        Shape::AsIs if is_relay_only_kind(&record.kind) => Err(RelayError::MalformedRecord {
            kind: record.kind,
            reason: "kind is reserved for relay messages".to_owned(),
        }),
        Shape::AsIs => Ok(PanelMessage::passthrough(record)),
    }
}
