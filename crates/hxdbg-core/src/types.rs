use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Message kinds ────────────────────────────────────────────────

/// Envelope kind wrapping a captured lifecycle event.
pub const KIND_HTMX_EVENT: &str = "HTMX_EVENT";
/// Prefix shared by every raw htmx lifecycle event name.
pub const HTMX_PREFIX: &str = "htmx:";
/// Reachability check sent by capture sources; never shown in the log.
pub const KIND_CONNECTION_TEST: &str = "CONNECTION_TEST";
/// Liveness probe addressed to the relay itself.
pub const KIND_LIVENESS_PROBE: &str = "heartbeat";
pub const KIND_TEST: &str = "TEST";
pub const KIND_TEST_CONFIRMATION: &str = "TEST_CONFIRMATION";
pub const KIND_ERROR: &str = "ERROR";
pub const KIND_HEARTBEAT: &str = "HEARTBEAT";
pub const KIND_HTMX_EVENT_FOR_PANEL: &str = "HTMX_EVENT_FOR_PANEL";

/// Tags only the relay itself may put on a panel channel. A forwarded
/// record carrying one would decode as the relay's own message.
pub fn is_relay_only_kind(kind: &str) -> bool {
    matches!(
        kind,
        KIND_HEARTBEAT | KIND_HTMX_EVENT_FOR_PANEL | KIND_CONNECTION_TEST
    )
}

// ─── Identity ─────────────────────────────────────────────────────

/// Identifier of the inspected page (tab) an event or subscription belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Identity of one panel channel. Two handles are the same channel iff
/// their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

// ─── Event record ─────────────────────────────────────────────────

/// Canonical record produced by a capture source.
///
/// The wire form mirrors the extension messaging shape:
/// `{"type": "...", "timestamp": "...", "sourceTag": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "sourceTag")]
    pub source_tag: String,
    #[serde(default, rename = "data")]
    pub payload: serde_json::Value,
}

impl EventRecord {
    pub fn new(
        kind: impl Into<String>,
        source_tag: impl Into<String>,
        payload: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            timestamp: format_timestamp(at),
            source_tag: source_tag.into(),
            payload,
        }
    }

    pub fn class(&self) -> MessageClass {
        MessageClass::of(&self.kind)
    }
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Epoch milliseconds as a UTC instant. Out-of-range values map to the epoch.
pub fn instant_from_ms(epoch_ms: u64) -> DateTime<Utc> {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}

/// Routing class of an [`EventRecord`] kind, used by the relay's dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// `HTMX_EVENT` or a raw `htmx:*` kind; re-tagged for the panel.
    Lifecycle,
    /// Reachability check from a capture source; consumed silently.
    SelfTest,
    /// Probe addressed to the relay; acknowledged, never relayed.
    LivenessProbe,
    /// Panel/test traffic broadcast as-is.
    Test,
    Other,
}

impl MessageClass {
    pub fn of(kind: &str) -> Self {
        if kind == KIND_HTMX_EVENT || kind.starts_with(HTMX_PREFIX) {
            Self::Lifecycle
        } else {
            match kind {
                KIND_CONNECTION_TEST => Self::SelfTest,
                KIND_LIVENESS_PROBE => Self::LivenessProbe,
                KIND_TEST => Self::Test,
                _ => Self::Other,
            }
        }
    }
}

// ─── Relay → panel ────────────────────────────────────────────────

/// Message delivered over a panel channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PanelMessage {
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
    #[serde(rename = "HTMX_EVENT_FOR_PANEL")]
    HtmxEvent {
        #[serde(
            rename = "sourceId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        source_id: Option<SourceId>,
        data: serde_json::Value,
    },
    #[serde(rename = "TEST")]
    Test {
        #[serde(default)]
        data: serde_json::Value,
    },
    #[serde(rename = "TEST_CONFIRMATION")]
    TestConfirmation {
        #[serde(default)]
        data: serde_json::Value,
    },
    #[serde(rename = "ERROR")]
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    #[serde(rename = "CONNECTION_TEST")]
    ConnectionTest,
    /// Any other record, forwarded unchanged.
    #[serde(untagged)]
    Relayed(EventRecord),
}

impl PanelMessage {
    /// Panel form of a record that is forwarded without re-tagging.
    pub fn passthrough(record: EventRecord) -> Self {
        match record.kind.as_str() {
            KIND_TEST => Self::Test {
                data: record.payload,
            },
            KIND_TEST_CONFIRMATION => Self::TestConfirmation {
                data: record.payload,
            },
            KIND_ERROR => Self::Error {
                error: record.payload["error"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_owned(),
                stack: record.payload["stack"].as_str().map(str::to_owned),
            },
            _ => Self::Relayed(record),
        }
    }
}

// ─── Panel → relay ────────────────────────────────────────────────

/// Request sent by a panel over its own channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum PanelRequest {
    Init {
        #[serde(rename = "tabId")]
        tab_id: SourceId,
    },
    Test {
        #[serde(rename = "tabId")]
        tab_id: SourceId,
        #[serde(default)]
        data: serde_json::Value,
    },
}

// ─── Capture → relay ──────────────────────────────────────────────

/// One-way submission from a capture source. `tab_id` is absent for
/// senders that are not attached to an inspected page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "tabId", default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<SourceId>,
    pub message: EventRecord,
}

/// Acknowledgement returned to every submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
}

impl Ack {
    pub const PROCESSED: Self = Self {
        status: AckStatus::Processed,
    };
    pub const ALIVE: Self = Self {
        status: AckStatus::Alive,
    };
    pub const DROPPED: Self = Self {
        status: AckStatus::Dropped,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckStatus {
    #[serde(rename = "Message processed")]
    Processed,
    #[serde(rename = "alive")]
    Alive,
    #[serde(rename = "Message dropped")]
    Dropped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
            .single()
            .expect("valid datetime")
    }

    #[test]
    fn classify_kinds() {
        assert_eq!(MessageClass::of("HTMX_EVENT"), MessageClass::Lifecycle);
        assert_eq!(MessageClass::of("htmx:afterSwap"), MessageClass::Lifecycle);
        assert_eq!(MessageClass::of("htmx:xhr:loadend"), MessageClass::Lifecycle);
        assert_eq!(MessageClass::of("CONNECTION_TEST"), MessageClass::SelfTest);
        assert_eq!(MessageClass::of("heartbeat"), MessageClass::LivenessProbe);
        assert_eq!(MessageClass::of("TEST"), MessageClass::Test);
        assert_eq!(MessageClass::of("TEST_CONFIRMATION"), MessageClass::Other);
        assert_eq!(MessageClass::of("HTMX"), MessageClass::Other);
    }

    #[test]
    fn event_record_wire_shape() {
        let record = EventRecord::new(
            KIND_HTMX_EVENT,
            "content:tab-3",
            serde_json::json!({"type": "htmx:load"}),
            at(),
        );
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["type"], "HTMX_EVENT");
        assert_eq!(json["timestamp"], "2026-03-01T09:30:00.000Z");
        assert_eq!(json["sourceTag"], "content:tab-3");
        assert_eq!(json["data"]["type"], "htmx:load");
    }

    #[test]
    fn instant_from_epoch_ms() {
        assert_eq!(
            format_timestamp(instant_from_ms(1_500)),
            "1970-01-01T00:00:01.500Z"
        );
        assert_eq!(instant_from_ms(u64::MAX), DateTime::<Utc>::default());
    }

    #[test]
    fn event_record_accepts_minimal_message() {
        let record: EventRecord =
            serde_json::from_str(r#"{"type":"CONNECTION_TEST"}"#).expect("deserialize");
        assert_eq!(record.class(), MessageClass::SelfTest);
        assert!(record.payload.is_null());
        assert!(record.source_tag.is_empty());
    }

    #[test]
    fn panel_message_tags() {
        let hb = serde_json::to_value(PanelMessage::Heartbeat).expect("serialize");
        assert_eq!(hb, serde_json::json!({"type": "HEARTBEAT"}));

        let ev = PanelMessage::HtmxEvent {
            source_id: Some(SourceId(7)),
            data: serde_json::json!({"type": "htmx:afterSwap"}),
        };
        let json = serde_json::to_value(&ev).expect("serialize");
        assert_eq!(json["type"], "HTMX_EVENT_FOR_PANEL");
        assert_eq!(json["sourceId"], 7);

        let back: PanelMessage = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, ev);
    }

    #[test]
    fn relayed_record_keeps_its_own_kind() {
        let record = EventRecord::new("CUSTOM_NOTE", "probe", serde_json::json!(1), at());
        let msg = PanelMessage::passthrough(record.clone());
        assert_eq!(msg, PanelMessage::Relayed(record));

        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["type"], "CUSTOM_NOTE");
    }

    #[test]
    fn passthrough_maps_error_records() {
        let record = EventRecord::new(
            KIND_ERROR,
            "content:tab-1",
            serde_json::json!({"error": "boom", "stack": "at x"}),
            at(),
        );
        assert_eq!(
            PanelMessage::passthrough(record),
            PanelMessage::Error {
                error: "boom".to_owned(),
                stack: Some("at x".to_owned()),
            }
        );
    }

    #[test]
    fn panel_request_wire_shape() {
        let init: PanelRequest =
            serde_json::from_str(r#"{"name":"init","tabId":42}"#).expect("deserialize");
        assert_eq!(init, PanelRequest::Init { tab_id: SourceId(42) });

        let test = serde_json::to_value(PanelRequest::Test {
            tab_id: SourceId(1),
            data: serde_json::json!("Test message from panel"),
        })
        .expect("serialize");
        assert_eq!(test["name"], "test");
        assert_eq!(test["tabId"], 1);
    }

    #[test]
    fn ack_status_strings() {
        let json = serde_json::to_string(&Ack::PROCESSED).expect("serialize");
        assert_eq!(json, r#"{"status":"Message processed"}"#);
        let alive: Ack = serde_json::from_str(r#"{"status":"alive"}"#).expect("deserialize");
        assert_eq!(alive, Ack::ALIVE);
    }

    #[test]
    fn submission_without_tab() {
        let sub: Submission =
            serde_json::from_str(r#"{"message":{"type":"TEST","data":"hi"}}"#).expect("parse");
        assert_eq!(sub.tab_id, None);
        assert_eq!(sub.message.class(), MessageClass::Test);
    }
}
